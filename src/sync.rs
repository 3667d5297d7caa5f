use crate::coordinator::ReservationCoordinator;
use crate::core::errors::{RegistryError, Result};
use crate::model::{ChangeEvent, ChangeOp, Reservation};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Publisher half of the registry change channel.
///
/// Owned by a store; every successful mutation broadcasts one event.
#[derive(Clone)]
pub struct ChangePublisher {
    sender: async_broadcast::Sender<ChangeEvent>,
    // Keeps the channel open while no view is subscribed.
    _keepalive: async_broadcast::InactiveReceiver<ChangeEvent>,
    sequence: Arc<AtomicU64>,
}

impl ChangePublisher {
    pub fn new(capacity: usize) -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(capacity);
        sender.set_overflow(true); // drop oldest events when full
        Self {
            sender,
            _keepalive: receiver.deactivate(),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Broadcast a mutation signal to every open feed.
    pub fn publish(&self, op: ChangeOp) {
        let event = ChangeEvent {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            op,
        };
        // Never blocks: overflow mode evicts the oldest buffered event, and
        // a channel with no active feeds simply has no one to notify.
        if let Err(err) = self.sender.try_broadcast(event) {
            debug!(?op, error = %err, "change event not delivered");
        }
    }

    /// Open a new subscription on this channel.
    pub fn subscribe(&self) -> ChangeFeed {
        ChangeFeed {
            receiver: self.sender.new_receiver(),
        }
    }
}

/// Subscription handle for registry change signals.
///
/// One handle per active view session; dropping it unsubscribes.
pub struct ChangeFeed {
    receiver: async_broadcast::Receiver<ChangeEvent>,
}

impl ChangeFeed {
    /// Await the next change signal.
    ///
    /// Overflowed events are skipped: the newest buffered event still
    /// arrives, and one signal is all a full-refresh consumer needs.
    pub async fn recv(&mut self) -> Result<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(async_broadcast::RecvError::Overflowed(missed)) => {
                    debug!(missed, "change feed overflowed");
                }
                Err(async_broadcast::RecvError::Closed) => {
                    return Err(RegistryError::internal("change channel closed"));
                }
            }
        }
    }

    /// Drain one pending event without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(async_broadcast::TryRecvError::Overflowed(missed)) => {
                    debug!(missed, "change feed overflowed");
                }
                Err(_) => return None,
            }
        }
    }

    /// Explicitly end the subscription.
    pub fn close(self) {}
}

/// Full-refresh client synchronizer.
///
/// Holds exactly one subscription for the lifetime of a view session. Every
/// change signal triggers a fresh `list_all` whose result replaces the local
/// view wholesale; duplicate or reordered events are harmless because the
/// refresh is idempotent.
pub struct Synchronizer {
    view: Arc<RwLock<Vec<Reservation>>>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Synchronizer {
    /// Fetch the initial snapshot and start the refresh loop.
    ///
    /// The subscription is opened before the initial fetch so a mutation
    /// racing the fetch still produces a refresh.
    pub async fn start(coordinator: Arc<ReservationCoordinator>) -> Result<Self> {
        let mut feed = coordinator.subscribe();
        let initial = coordinator.list_all().await?;
        let view = Arc::new(RwLock::new(initial));

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task_view = Arc::clone(&view);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("synchronizer shutting down");
                        break;
                    }
                    event = feed.recv() => {
                        let event = match event {
                            Ok(event) => event,
                            // Store dropped; nothing left to watch.
                            Err(_) => break,
                        };
                        match coordinator.list_all().await {
                            Ok(snapshot) => {
                                *task_view.write().await = snapshot;
                                debug!(sequence = event.sequence, "local view refreshed");
                            }
                            Err(err) => {
                                // Keep the stale view; the next event retries.
                                warn!(error = %err, "snapshot refresh failed");
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            view,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Current local view, ordered by number ascending.
    pub async fn snapshot(&self) -> Vec<Reservation> {
        self.view.read().await.clone()
    }

    /// Cancel the subscription and wait for the refresh loop to exit.
    ///
    /// The view stays readable afterwards but no longer refreshes.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        // Dropping the shutdown sender wakes the select loop; abort covers
        // a refresh that is mid-flight.
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
