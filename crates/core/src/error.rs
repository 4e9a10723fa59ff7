use thiserror::Error;

#[derive(Error, Debug)]
pub enum LivetrackError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("Unknown tracker type: {0}")]
    UnknownTracker(String),

    #[error("{0}")]
    Other(String),
}
