//! Process-local broadcast bus over std channels.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

/// The subscriber list lock was poisoned by a panicking publisher.
#[derive(Debug, Error)]
#[error("event bus subscriber list is poisoned")]
pub struct BusPoisoned;

/// Broadcast bus backed by one unbounded channel per subscriber.
///
/// `publish` clones the message once per live subscriber and detaches any
/// channel whose receiver is gone, so a dead projection worker never wedges
/// the publishing side. Ordering holds per publisher only; consumers keep
/// their own cursors.
#[derive(Debug, Default)]
pub struct InMemoryEventBus<M> {
    senders: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Registered subscribers. Dead channels linger until the next publish.
    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = BusPoisoned;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut senders = self.senders.lock().map_err(|_| BusPoisoned)?;

        let before = senders.len();
        senders.retain(|tx| tx.send(message.clone()).is_ok());
        if senders.len() < before {
            tracing::debug!(detached = before - senders.len(), "dropped dead bus subscribers");
        }

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // A poisoned lock still yields a subscription; it just never
        // receives anything, matching what publish can deliver.
        if let Ok(mut senders) = self.senders.lock() {
            senders.push(tx);
        }

        Subscription::new(rx)
    }
}
