//! Chat channel trait definition and shared error types.

/// Provider-assigned identifier of a sent message.
pub type MessageId = i64;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// Outbound chat service.
#[async_trait::async_trait]
pub trait ChatChannel: Send + Sync {
    /// Post `text` and return the identifier needed to delete it later.
    async fn send_message(&self, text: &str) -> Result<MessageId, NotifyError>;

    /// Delete a previously sent message. Already-deleted messages are not an error.
    async fn delete_message(&self, id: MessageId) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "telegram").
    fn channel_name(&self) -> &str;
}
