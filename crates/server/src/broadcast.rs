//! Broadcast hub: fans store change events out to dashboard subscribers.
//!
//! One task owns the subscriber set. Everything else talks to it through
//! three queues:
//!
//! - **register**: bounded, acknowledged once the subscriber is in the set
//! - **deregister**: unbounded, fed by the [`Subscription`] drop guard
//! - **broadcast**: bounded, payloads are delivered in arrival order
//!
//! Delivery never blocks the hub: a subscriber whose mailbox is full is
//! evicted on the spot and its mailbox closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const REGISTER_QUEUE: usize = 64;
const BROADCAST_QUEUE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("broadcast hub has shut down")]
    HubClosed,
}

struct Registration {
    id: Uuid,
    mailbox: mpsc::Sender<String>,
    ack: oneshot::Sender<()>,
}

/// A registered subscriber. Dropping it deregisters exactly once.
pub struct Subscription {
    pub id: Uuid,
    mailbox: mpsc::Receiver<String>,
    _guard: DeregisterGuard,
}

impl Subscription {
    /// Next payload; `None` once the hub closed the mailbox.
    pub async fn recv(&mut self) -> Option<String> {
        self.mailbox.recv().await
    }
}

struct DeregisterGuard {
    id: Uuid,
    queue: mpsc::UnboundedSender<Uuid>,
}

impl Drop for DeregisterGuard {
    fn drop(&mut self) {
        // Fails only when the hub is already gone.
        let _ = self.queue.send(self.id);
    }
}

/// Cloneable entry point to the hub.
#[derive(Clone)]
pub struct HubHandle {
    register: mpsc::Sender<Registration>,
    deregister: mpsc::UnboundedSender<Uuid>,
    broadcast: mpsc::Sender<String>,
    mailbox_capacity: usize,
    subscribers: Arc<AtomicUsize>,
}

impl HubHandle {
    /// Register a new subscriber; returns after the hub has added it.
    pub async fn subscribe(&self) -> Result<Subscription, BroadcastError> {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        let (ack_tx, ack_rx) = oneshot::channel();
        self.register
            .send(Registration {
                id,
                mailbox: tx,
                ack: ack_tx,
            })
            .await
            .map_err(|_| BroadcastError::HubClosed)?;
        ack_rx.await.map_err(|_| BroadcastError::HubClosed)?;

        Ok(Subscription {
            id,
            mailbox: rx,
            _guard: DeregisterGuard {
                id,
                queue: self.deregister.clone(),
            },
        })
    }

    /// Queue `payload` for every current subscriber.
    pub async fn broadcast(&self, payload: String) -> Result<(), BroadcastError> {
        self.broadcast
            .send(payload)
            .await
            .map_err(|_| BroadcastError::HubClosed)
    }

    /// Subscribers currently in the set.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }
}

pub struct Hub {
    subscribers: HashMap<Uuid, mpsc::Sender<String>>,
    register_rx: mpsc::Receiver<Registration>,
    deregister_rx: mpsc::UnboundedReceiver<Uuid>,
    broadcast_rx: mpsc::Receiver<String>,
    gauge: Arc<AtomicUsize>,
}

impl Hub {
    pub fn new(mailbox_capacity: usize) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(REGISTER_QUEUE);
        let (deregister_tx, deregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE);
        let gauge = Arc::new(AtomicUsize::new(0));

        let hub = Self {
            subscribers: HashMap::new(),
            register_rx,
            deregister_rx,
            broadcast_rx,
            gauge: gauge.clone(),
        };
        let handle = HubHandle {
            register: register_tx,
            deregister: deregister_tx,
            broadcast: broadcast_tx,
            mailbox_capacity: mailbox_capacity.max(1),
            subscribers: gauge,
        };
        (hub, handle)
    }

    /// Process queue events one at a time until cancelled. Dropping the
    /// set on exit closes every mailbox.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("broadcast hub started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(id) = self.deregister_rx.recv() => self.remove(id, "disconnected"),
                Some(reg) = self.register_rx.recv() => self.add(reg),
                Some(payload) = self.broadcast_rx.recv() => self.fan_out(payload),
                else => break,
            }
        }
        let remaining = self.subscribers.len();
        self.subscribers.clear();
        self.publish_count();
        info!(remaining, "broadcast hub stopped");
    }

    fn add(&mut self, reg: Registration) {
        self.subscribers.insert(reg.id, reg.mailbox);
        self.publish_count();
        debug!(subscriber = %reg.id, total = self.subscribers.len(), "subscriber registered");
        // The subscriber may have given up waiting; its guard will deregister it.
        let _ = reg.ack.send(());
    }

    fn remove(&mut self, id: Uuid, reason: &str) {
        if self.subscribers.remove(&id).is_some() {
            self.publish_count();
            debug!(subscriber = %id, reason, total = self.subscribers.len(), "subscriber removed");
        }
    }

    fn fan_out(&mut self, payload: String) {
        let mut evicted = Vec::new();
        for (id, mailbox) in &self.subscribers {
            match mailbox.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = %id, "mailbox full, evicting slow subscriber");
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => evicted.push(*id),
            }
        }
        for id in evicted {
            self.remove(id, "evicted");
        }
    }

    fn publish_count(&self) {
        self.gauge.store(self.subscribers.len(), Ordering::Relaxed);
    }
}

/// Start a hub task; it stops when `cancel` fires.
pub fn spawn(mailbox_capacity: usize, cancel: CancellationToken) -> (HubHandle, tokio::task::JoinHandle<()>) {
    let (hub, handle) = Hub::new(mailbox_capacity);
    let task = tokio::spawn(hub.run(cancel));
    (handle, task)
}
