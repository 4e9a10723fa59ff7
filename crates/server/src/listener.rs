//! Bridges the store's change notifications into the broadcast hub.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use livetrack_store::ChangeFeedConnector;

use crate::broadcast::HubHandle;

/// Exponential reconnect delay, doubling from `min` up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    /// Delay to wait now; the following one is doubled.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Subscribe to `channel` and broadcast every payload verbatim. Connection
/// failures are retried with `backoff`; only cancellation or a closed hub
/// ends the loop.
pub async fn run_listener(
    connector: Arc<dyn ChangeFeedConnector>,
    channel: String,
    hub: HubHandle,
    mut backoff: Backoff,
    cancel: CancellationToken,
) {
    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connector.connect(&channel) => result,
        };

        match connected {
            Ok(mut feed) => {
                backoff.reset();
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => return,
                        next = feed.recv() => next,
                    };
                    match next {
                        Ok(payload) => {
                            debug!(channel = %channel, bytes = payload.len(), "change notification");
                            if hub.broadcast(payload).await.is_err() {
                                info!("broadcast hub closed, stopping listener");
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(channel = %channel, error = %e, "change feed lost");
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!(channel = %channel, error = %e, "change feed connection failed"),
        }

        let delay = backoff.next_delay();
        info!(channel = %channel, delay_secs = delay.as_secs(), "reconnecting to change feed");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    info!(channel = %channel, "listener stopped");
}
