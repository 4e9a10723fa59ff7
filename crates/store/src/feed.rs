//! Store change notifications (`LISTEN/NOTIFY`).

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;

/// An open subscription to one notification channel.
#[async_trait]
pub trait ChangeFeed: Send {
    /// Next payload, verbatim. An error means the subscription is unusable.
    async fn recv(&mut self) -> Result<String, StoreError>;
}

/// Opens [`ChangeFeed`]s; called again after every transport failure.
#[async_trait]
pub trait ChangeFeedConnector: Send + Sync {
    async fn connect(&self, channel: &str) -> Result<Box<dyn ChangeFeed>, StoreError>;
}

pub struct PgChangeFeedConnector {
    pool: PgPool,
}

impl PgChangeFeedConnector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeFeedConnector for PgChangeFeedConnector {
    async fn connect(&self, channel: &str) -> Result<Box<dyn ChangeFeed>, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(channel).await?;
        info!(channel, "listening for store notifications");
        Ok(Box::new(PgChangeFeed { listener }))
    }
}

struct PgChangeFeed {
    listener: PgListener,
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn recv(&mut self) -> Result<String, StoreError> {
        // A lost connection shows up as `Ok(None)`.
        match self.listener.try_recv().await? {
            Some(notification) => Ok(notification.payload().to_string()),
            None => Err(StoreError::FeedClosed),
        }
    }
}
