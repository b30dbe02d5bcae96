use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Malformed change event: {0}")]
    MalformedEvent(String),

    #[error("Table '{0}' is not tracked")]
    UnknownTable(String),

    #[error("Invalid channel filter: {0}")]
    InvalidFilter(String),

    #[error("Subscription to '{topic}' failed: {reason}")]
    SubscriptionFailed { topic: String, reason: String },

    #[error("Row '{id}' not found in table '{table}'")]
    RowNotFound { table: String, id: String },

    #[error("Row '{id}' already exists in table '{table}'")]
    DuplicateRow { table: String, id: String },

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Change source has been disposed")]
    Disposed,

    #[error("View is not mounted")]
    NotMounted,
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl<T> From<std::sync::PoisonError<T>> for SyncError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
