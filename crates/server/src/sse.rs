//! Per-connection SSE serving loop.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::Event;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::broadcast::Subscription;

/// Frames written to a dashboard connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `data: <payload>`
    Data(String),
    /// `: heartbeat`
    Heartbeat,
}

impl Frame {
    pub fn into_event(self) -> Result<Event, Infallible> {
        Ok(match self {
            Frame::Data(payload) => Event::default().data(payload),
            Frame::Heartbeat => Event::default().comment("heartbeat"),
        })
    }
}

/// Forward mailbox payloads to `out` until the client goes away, the hub
/// closes the mailbox, or the server shuts down. Idle connections get a
/// heartbeat every `heartbeat`.
///
/// `subscription` is dropped on return, which deregisters it.
pub async fn serve_subscriber(
    mut subscription: Subscription,
    out: mpsc::Sender<Frame>,
    heartbeat: Duration,
    cancel: CancellationToken,
) {
    let id = subscription.id;
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break "shutdown",
            _ = out.closed() => break "client disconnected",
            payload = subscription.recv() => match payload {
                Some(payload) => {
                    if let Some(reason) = deliver(&out, Frame::Data(payload), &cancel).await {
                        break reason;
                    }
                }
                None => break "mailbox closed",
            },
            _ = ticker.tick() => {
                if let Some(reason) = deliver(&out, Frame::Heartbeat, &cancel).await {
                    break reason;
                }
            }
        }
    };
    debug!(subscriber = %id, reason, "subscriber loop finished");
}

/// Send one frame, giving up on shutdown. Returns why the loop must stop.
async fn deliver(out: &mpsc::Sender<Frame>, frame: Frame, cancel: &CancellationToken) -> Option<&'static str> {
    tokio::select! {
        _ = cancel.cancelled() => Some("shutdown"),
        sent = out.send(frame) => sent.err().map(|_| "client disconnected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast;

    #[tokio::test(start_paused = true)]
    async fn forwards_payloads_and_heartbeats() {
        let cancel = CancellationToken::new();
        let (hub, _hub_task) = broadcast::spawn(4, cancel.clone());
        let sub = hub.subscribe().await.unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let loop_task = tokio::spawn(serve_subscriber(sub, tx, Duration::from_secs(10), cancel.clone()));

        hub.broadcast(r#"{"pilot":"a"}"#.into()).await.unwrap();
        assert_eq!(rx.recv().await, Some(Frame::Data(r#"{"pilot":"a"}"#.into())));

        // Nothing else is pending, so the paused clock jumps to the next tick.
        let before = Instant::now();
        assert_eq!(rx.recv().await, Some(Frame::Heartbeat));
        assert!(Instant::now() - before >= Duration::from_secs(9));

        cancel.cancel();
        loop_task.await.unwrap();
    }

    #[tokio::test]
    async fn client_disconnect_deregisters() {
        let cancel = CancellationToken::new();
        let (hub, _hub_task) = broadcast::spawn(4, cancel.clone());
        let sub = hub.subscribe().await.unwrap();
        let (tx, rx) = mpsc::channel(4);
        let loop_task = tokio::spawn(serve_subscriber(sub, tx, Duration::from_secs(10), cancel.clone()));
        assert_eq!(hub.subscriber_count(), 1);

        drop(rx);
        loop_task.await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.subscriber_count() != 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();
    }

    #[tokio::test]
    async fn eviction_ends_the_loop() {
        let cancel = CancellationToken::new();
        let (hub, _hub_task) = broadcast::spawn(1, cancel.clone());
        let sub = hub.subscribe().await.unwrap();
        // Output channel never drained: the loop blocks on its first send.
        let (tx, mut rx) = mpsc::channel(1);
        let loop_task = tokio::spawn(serve_subscriber(sub, tx, Duration::from_secs(3600), cancel.clone()));

        for i in 0..4 {
            hub.broadcast(format!("m{i}")).await.unwrap();
        }
        assert_eq!(rx.recv().await, Some(Frame::Data("m0".into())));
        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.subscriber_count() != 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // Drain what was buffered before eviction; the loop then exits.
        while rx.recv().await.is_some() {}
        loop_task.await.unwrap();
        cancel.cancel();
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_blocked_send() {
        let cancel = CancellationToken::new();
        let (hub, _hub_task) = broadcast::spawn(4, cancel.clone());
        let sub = hub.subscribe().await.unwrap();
        // Held but never drained: the second frame cannot be delivered.
        let (tx, mut rx) = mpsc::channel(1);
        let loop_task = tokio::spawn(serve_subscriber(sub, tx, Duration::from_secs(3600), cancel.clone()));

        hub.broadcast("m0".into()).await.unwrap();
        hub.broadcast("m1".into()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while rx.len() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), loop_task)
            .await
            .expect("loop should stop on shutdown")
            .unwrap();
        assert_eq!(rx.recv().await, Some(Frame::Data("m0".into())));
    }
}
