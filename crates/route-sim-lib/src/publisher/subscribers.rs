//! Subscriber registry for the broadcast server
//!
//! Each subscriber owns a bounded outbound queue. How a full queue is handled depends on the
//! [`OverflowPolicy`]. The registry mutex is only taken to register, unregister or snapshot;
//! deliveries happen on the snapshot with the lock released.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// What to do when a subscriber's queue is full
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Wait for room; a slow subscriber stalls publishing
    #[default]
    Block,
    /// Discard the oldest queued message of that subscriber
    DropOldest,
    /// Disconnect the subscriber
    Disconnect,
}

pub(crate) type Message = Arc<str>;

#[derive(Clone)]
enum QueueTx {
    Bounded(mpsc::Sender<Message>),
    Ring(broadcast::Sender<Message>),
}

/// Receiving end of a subscriber queue
pub(crate) enum QueueRx {
    Bounded(mpsc::Receiver<Message>),
    Ring(broadcast::Receiver<Message>),
}

impl QueueRx {
    /// Next queued message; `None` once the subscriber has been unregistered
    pub(crate) async fn recv(&mut self) -> Option<Message> {
        match self {
            QueueRx::Bounded(rx) => rx.recv().await,
            QueueRx::Ring(rx) => loop {
                match rx.recv().await {
                    Ok(message) => return Some(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Slow subscriber, dropped oldest positions");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }
}

#[derive(Clone)]
struct Subscriber {
    queue: QueueTx,
    cancel: CancellationToken,
}

/// Live subscribers, keyed by a process-unique id
pub(crate) struct Registry {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
    policy: OverflowPolicy,
}

impl Registry {
    /// `capacity` is clamped to at least one message
    pub(crate) fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a subscriber whose token is a child of `parent`
    pub(crate) fn register(&self, parent: &CancellationToken) -> (u64, QueueRx, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = parent.child_token();

        let (queue, rx) = match self.policy {
            OverflowPolicy::DropOldest => {
                let (tx, rx) = broadcast::channel(self.capacity);
                (QueueTx::Ring(tx), QueueRx::Ring(rx))
            }
            OverflowPolicy::Block | OverflowPolicy::Disconnect => {
                let (tx, rx) = mpsc::channel(self.capacity);
                (QueueTx::Bounded(tx), QueueRx::Bounded(rx))
            }
        };

        self.lock().insert(
            id,
            Subscriber {
                queue,
                cancel: cancel.clone(),
            },
        );
        (id, rx, cancel)
    }

    /// Remove a subscriber and cancel its token; false if it was already gone
    pub(crate) fn unregister(&self, id: u64) -> bool {
        let removed = self.lock().remove(&id);
        match removed {
            Some(subscriber) => {
                subscriber.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn snapshot(&self) -> Vec<(u64, Subscriber)> {
        self.lock()
            .iter()
            .map(|(id, subscriber)| (*id, subscriber.clone()))
            .collect()
    }

    /// Deliver `message` to every subscriber registered right now
    ///
    /// Returns how many subscribers accepted it.
    pub(crate) async fn broadcast(&self, message: Message) -> usize {
        let mut delivered = 0;

        for (id, subscriber) in self.snapshot() {
            let accepted = match (&subscriber.queue, self.policy) {
                (QueueTx::Bounded(tx), OverflowPolicy::Block) => {
                    tokio::select! {
                        sent = tx.send(message.clone()) => sent.is_ok(),
                        // Disconnected while we were waiting for room
                        _ = subscriber.cancel.cancelled() => false,
                    }
                }
                (QueueTx::Bounded(tx), _) => match tx.try_send(message.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(subscriber = id, "Subscriber queue full, disconnecting");
                        false
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                },
                (QueueTx::Ring(tx), _) => tx.send(message.clone()).is_ok(),
            };

            if accepted {
                delivered += 1;
            } else if self.unregister(id) {
                tracing::debug!(subscriber = id, "Removed subscriber during broadcast");
            }
        }

        delivered
    }

    /// Disconnect everyone
    pub(crate) fn clear(&self) {
        let drained: Vec<Subscriber> = self.lock().drain().map(|(_, s)| s).collect();
        for subscriber in drained {
            subscriber.cancel.cancel();
        }
    }
}
