//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is a **distribution** mechanism for status events:
//!
//! - **Best-effort, at-least-once per subscriber**: a subscriber sees every
//!   event published after it subscribed, unless it falls behind.
//! - **Bounded**: each subscriber has a fixed-size buffer. When it overflows the
//!   oldest events are dropped and the subscriber is told how many it missed.
//! - **Non-blocking publishers**: a slow or dead subscriber never stalls
//!   `publish`.
//! - **Per-stream ordering**: messages arrive in publish order, so anything
//!   published under a per-order lock stays ordered per order.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

/// Why a subscription could not yield the next message.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The subscriber fell behind and `skipped` oldest messages were dropped.
    /// The subscription stays usable; the next receive yields the oldest
    /// message still buffered.
    #[error("subscriber overrun: {skipped} events dropped")]
    Overrun { skipped: u64 },

    /// The bus was dropped; no further messages will arrive.
    #[error("event bus closed")]
    Closed,
}

/// A subscription to an event stream.
///
/// Each subscription gets its own copy of every message (broadcast semantics).
/// Subscriptions are meant for a single consumer task.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: broadcast::Receiver<M>,
}

impl<M> Subscription<M>
where
    M: Clone + Send + 'static,
{
    pub fn new(receiver: broadcast::Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> Result<M, SubscriptionError> {
        match self.receiver.recv().await {
            Ok(m) => Ok(m),
            Err(broadcast::error::RecvError::Lagged(skipped)) => Err(overrun(skipped)),
            Err(broadcast::error::RecvError::Closed) => Err(SubscriptionError::Closed),
        }
    }

    /// Take the next buffered message without waiting.
    ///
    /// Returns `Ok(None)` when nothing is buffered.
    pub fn try_recv(&mut self) -> Result<Option<M>, SubscriptionError> {
        match self.receiver.try_recv() {
            Ok(m) => Ok(Some(m)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => Err(overrun(skipped)),
            Err(broadcast::error::TryRecvError::Closed) => Err(SubscriptionError::Closed),
        }
    }

    /// Convert into a stream. Overruns are yielded in-band as errors. When
    /// the bus closes the stream yields one final `Closed` and ends.
    pub fn into_stream(self) -> impl Stream<Item = Result<M, SubscriptionError>> + Send {
        BroadcastStream::new(self.receiver)
            .map(|item| item.map_err(|BroadcastStreamRecvError::Lagged(skipped)| overrun(skipped)))
            .chain(tokio_stream::once(Err(SubscriptionError::Closed)))
    }
}

fn overrun(skipped: u64) -> SubscriptionError {
    warn!(skipped, "status subscriber overrun; oldest events dropped");
    SubscriptionError::Overrun { skipped }
}

/// Publish/subscribe abstraction.
///
/// `publish()` must never block on subscribers. Errors are reserved for
/// transport failures of the implementation, not for slow consumers.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
