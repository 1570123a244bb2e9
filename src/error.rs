use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport Error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Decode Error, response is not a valid feature collection: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Decode Error, response has no `features` array.")]
    MissingFeatures,
    #[error("Server rejected the query. Code: {code}, Message: {message}")]
    Server { code: i64, message: String },
    #[error("Feature is missing a numeric identifier field: {0}")]
    MissingIdentifier(String),
    #[error("Object ID {0} leaves no room for another window.")]
    IdOverflow(u64),

    #[error("Output format `{0}` not yet supported")]
    UnsupportedFormat(String),

    #[error("Malformed partial file {path:?}: {reason}")]
    MalformedPartialFile { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::MalformedPartialFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
