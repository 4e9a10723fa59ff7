use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use livetrack_store::TrackStore;

use crate::broadcast::HubHandle;

pub struct AppState {
    pub store: Arc<dyn TrackStore>,
    pub hub: HubHandle,
    /// Keepalive period for SSE connections.
    pub heartbeat: Duration,
    pub dates_limit: u32,
    /// Process-wide shutdown; ends every SSE serving loop.
    pub cancel: CancellationToken,
}
