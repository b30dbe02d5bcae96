use crate::change::RawChange;
use crate::core::Result;
use crate::store::CrmProjection;
use serde::Serialize;
use std::fmt;
use std::io::BufRead;
use tracing::{Level, event};

/// Tally of a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Non-blank, non-comment lines read
    pub lines: usize,
    pub applied: usize,
    pub ignored: usize,
    pub malformed: usize,
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lines={} applied={} ignored={} malformed={}",
            self.lines, self.applied, self.ignored, self.malformed
        )
    }
}

/// Applies newline-delimited change payloads to `projection` in order.
///
/// Blank lines and lines starting with `#` are skipped. A line that is not
/// a valid payload is counted as malformed and the replay continues; only
/// read failures abort it.
pub fn replay_lines<R: BufRead>(reader: R, projection: &mut CrmProjection) -> Result<ReplayReport> {
    let mut report = ReplayReport::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        report.lines += 1;

        let raw = match RawChange::from_json_str(line) {
            Ok(raw) => raw,
            Err(err) => {
                event!(Level::WARN, line = index + 1, error = %err, "unparseable change line");
                report.malformed += 1;
                continue;
            }
        };

        match projection.apply_raw(&raw) {
            Ok(summary) if summary.effect.is_applied() => report.applied += 1,
            Ok(_) => report.ignored += 1,
            Err(_) => report.malformed += 1,
        }
    }

    event!(
        Level::INFO,
        lines = report.lines,
        applied = report.applied,
        ignored = report.ignored,
        malformed = report.malformed,
        "replay finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use std::io::Cursor;

    #[test]
    fn test_replay_counts() {
        let input = r#"
# seed
{"eventType":"INSERT","schema":"public","table":"customers","new":{"id":"c1","company_name":"Acme"},"old":{}}
{"eventType":"INSERT","schema":"public","table":"customers","new":{"id":"c1","company_name":"Acme"},"old":{}}
{"eventType":"INSERT","schema":"public","table":"invoices","new":{"id":"i1"},"old":{}}
not json at all
{"eventType":"DELETE","schema":"public","table":"customers","new":{},"old":{"id":"c1"}}
"#;
        let mut projection = CrmProjection::new(&SyncConfig::default());
        let report = replay_lines(Cursor::new(input), &mut projection).unwrap();

        assert_eq!(
            report,
            ReplayReport {
                lines: 5,
                applied: 2,
                ignored: 1,
                malformed: 2
            }
        );
        assert!(projection.customers().is_empty());
        assert_eq!(report.to_string(), "lines=5 applied=2 ignored=1 malformed=2");
    }
}
