use thiserror;

/// The Result type for engine48.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error")]
    StdIOError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("log error")]
    LogError(#[from] log::SetLoggerError),

    #[error("{source:?}")]
    AnyhowError {
        #[from]
        source: anyhow::Error,
    },

    #[error("grid must have {expected} rows and columns, found {found}")]
    InvalidGridShape { expected: usize, found: usize },

    #[error("invalid tile value {0}, tiles must be powers of two from 2 to 2^30")]
    InvalidTileValue(u32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("persistence worker is no longer running")]
    PersisterGone,

    #[error("event bus closed")]
    EventBusClosed,

    #[error("state sink closed")]
    StateSinkClosed,
}
