//! Status events pushed to dashboard observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopkeep_core::UserId;

use crate::envelope::{EventEnvelope, StreamRef};

/// Coarse grouping used by dashboards to colour/filter the feed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Order,
    User,
    System,
}

impl From<StreamRef> for StatusCategory {
    fn from(stream: StreamRef) -> Self {
        match stream {
            StreamRef::Order(_) => StatusCategory::Order,
            StreamRef::User(_) => StatusCategory::User,
            StreamRef::System => StatusCategory::System,
        }
    }
}

/// Payload of a status event. Observers render it; nothing replays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Stable identifier such as `order.processing` or `bot.started`.
    pub event_type: String,
    /// Human readable, operator-facing (not localized).
    pub message: String,
    /// User the event concerns (order owner for order events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Order status after the transition, for order events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Cancellation reason or admin note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StatusEvent {
    pub fn new(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            message: message.into(),
            user_id: None,
            status: None,
            note: None,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

pub type StatusEnvelope = EventEnvelope<StatusEvent>;

impl EventEnvelope<StatusEvent> {
    pub fn category(&self) -> StatusCategory {
        self.stream().into()
    }

    /// Operational event not tied to an order or user.
    pub fn operational(
        event_type: impl Into<String>,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::system(at, StatusEvent::new(event_type, message))
    }
}
