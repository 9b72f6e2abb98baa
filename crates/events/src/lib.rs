//! Status events and their fan-out to observers.
//!
//! - `Event`: trait implemented by domain events (order transitions)
//! - `EventEnvelope`: stream + sequence metadata around a payload
//! - `EventBus` / `Subscription`: publish/subscribe mechanics
//! - `Broadcaster`: bounded, drop-oldest in-memory bus (the status broadcaster)
//! - `EventLog`: recent-events ring buffer for dashboards

pub mod broadcast;
pub mod bus;
pub mod envelope;
pub mod event;
pub mod log;
pub mod status;

pub use broadcast::{Broadcaster, StatusBroadcaster};
pub use bus::{EventBus, Subscription, SubscriptionError};
pub use envelope::{EventEnvelope, StreamRef};
pub use event::Event;
pub use log::EventLog;
pub use status::{StatusCategory, StatusEnvelope, StatusEvent};
