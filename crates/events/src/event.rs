use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate (an order transition, for instance).
///
/// Status observers only ever see the rendered form; the trait exists so the
/// publisher can name and time an event without knowing its concrete type.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name used on the status feed, e.g. `order.delivered`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn version(&self) -> u32;

    /// Business time of the fact. Never earlier than the previous event of
    /// the same stream.
    fn occurred_at(&self) -> DateTime<Utc>;
}
