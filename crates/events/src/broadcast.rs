//! In-memory status broadcaster.

use core::convert::Infallible;

use tokio::sync::broadcast;
use tracing::trace;

use crate::bus::{EventBus, Subscription};
use crate::status::StatusEnvelope;

/// Default per-subscriber buffer size.
pub const DEFAULT_CAPACITY: usize = 256;

/// Bounded fan-out bus.
///
/// - No IO
/// - Publishing never waits: each subscriber has `capacity` slots and the
///   oldest unread message is overwritten when a subscriber falls behind
/// - A subscriber that never reads only ever costs `capacity` messages
#[derive(Debug)]
pub struct Broadcaster<M> {
    sender: broadcast::Sender<M>,
    capacity: usize,
}

/// The broadcaster carrying dashboard status events.
pub type StatusBroadcaster = Broadcaster<StatusEnvelope>;

impl<M> Broadcaster<M>
where
    M: Clone + Send + 'static,
{
    /// Create a broadcaster with a per-subscriber buffer of `capacity`
    /// messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<M> Default for Broadcaster<M>
where
    M: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<M> EventBus<M> for Broadcaster<M>
where
    M: Clone + Send + Sync + 'static,
{
    type Error = Infallible;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        // No subscribers is not a failure: delivery is best-effort.
        if let Ok(receivers) = self.sender.send(message) {
            trace!(receivers, "status event published");
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        Subscription::new(self.sender.subscribe())
    }
}
