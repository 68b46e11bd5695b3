use thiserror::Error;

/// Why a page could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed structured data: {0}")]
    MalformedDocument(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// Retryable per-item failure. The entry stays queued for the next run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("bad status {0}")]
    BadStatus(u16),
    #[error("timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed structured data: {0}")]
    Malformed(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

impl From<ParseError> for FailureReason {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MalformedDocument(msg) => FailureReason::Malformed(msg),
            ParseError::MissingField(name) => FailureReason::MissingField(name),
        }
    }
}

/// Errors that stop a run. Per-item and per-phase failures never become one of these.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("failed to open HTTP session: {0}")]
    SessionOpen(#[from] reqwest::Error),
    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
    #[error("invalid selection scope: {0}")]
    InvalidScope(String),
}
