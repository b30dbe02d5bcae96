use anyhow::{Context, Result, bail};
use clap::Parser;
use livesync::{CrmProjection, SyncConfig, replay_lines};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "livesync-replay")]
#[command(about = "Replays newline-delimited realtime change payloads into a CRM projection")]
struct Cli {
    /// Payload file; stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,
    /// JSON projection config
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the final projection as JSON
    #[arg(long)]
    dump: bool,
    /// Fail when any line was malformed
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => load_config(path)?,
        None => SyncConfig::default(),
    };
    let mut projection = CrmProjection::new(&config);

    let report = match cli.input.as_deref() {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input '{}'", path.display()))?;
            replay_lines(BufReader::new(file), &mut projection)?
        }
        None => replay_lines(io::stdin().lock(), &mut projection)?,
    };

    println!("{report}");
    if cli.dump {
        println!("{}", serde_json::to_string_pretty(&projection.to_json())?);
    }

    if cli.strict && report.malformed > 0 {
        bail!("{} malformed line(s)", report.malformed);
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<SyncConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config '{}'", path.display()))?;
    SyncConfig::from_json_str(&text)
        .with_context(|| format!("Invalid config '{}'", path.display()))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("livesync=warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}
