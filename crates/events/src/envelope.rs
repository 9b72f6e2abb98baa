use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopkeep_core::{OrderId, UserId};

/// The stream an event originated from.
///
/// Ordering guarantees are per stream: events of one order arrive in the order
/// of their `sequence_number`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StreamRef {
    Order(OrderId),
    User(UserId),
    System,
}

/// Envelope for an event, containing stream metadata.
///
/// Notes:
/// - `sequence_number` is monotonically increasing per order stream (it equals
///   the order's version after the transition). User and system streams are
///   unsequenced and carry `0`.
/// - `occurred_at` never decreases within an order stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    stream: StreamRef,

    /// Monotonically increasing position in the originating stream.
    sequence_number: u64,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        stream: StreamRef,
        sequence_number: u64,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            stream,
            sequence_number,
            occurred_at,
            payload,
        }
    }

    /// Envelope for an order transition.
    pub fn for_order(
        order_id: OrderId,
        sequence_number: u64,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self::new(
            Uuid::now_v7(),
            StreamRef::Order(order_id),
            sequence_number,
            occurred_at,
            payload,
        )
    }

    /// Envelope for a user-scoped event (registration, blocking, ...).
    pub fn for_user(user_id: UserId, occurred_at: DateTime<Utc>, payload: E) -> Self {
        Self::new(Uuid::now_v7(), StreamRef::User(user_id), 0, occurred_at, payload)
    }

    /// Envelope for an operational event (bot started, stock adjusted, ...).
    pub fn system(occurred_at: DateTime<Utc>, payload: E) -> Self {
        Self::new(Uuid::now_v7(), StreamRef::System, 0, occurred_at, payload)
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn stream(&self) -> StreamRef {
        self.stream
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self.stream {
            StreamRef::Order(id) => Some(id),
            _ => None,
        }
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
