//! Tracker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed XML payload: {0}")]
    Xml(String),

    #[error("invalid field '{field}' (value '{value}'): {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl ParseError {
    pub(crate) fn invalid(field: &'static str, value: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("payload rejected: {0}")]
    Parse(#[from] ParseError),

    #[error("no fetcher registered for tracker type '{0}'")]
    UnsupportedTracker(String),
}
