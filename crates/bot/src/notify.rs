//! Outbound messages to users.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use shopkeep_core::UserId;
use shopkeep_events::{StatusCategory, StatusEnvelope, Subscription, SubscriptionError};
use shopkeep_orders::OrderStatus;

use crate::i18n::Msg;
use crate::users::UserDirectory;
use crate::worker::WorkerHandle;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("chat {0} is unreachable")]
    Unreachable(UserId),

    #[error("chat transport failed: {0}")]
    Transport(String),
}

/// Where messages to users go. Implementations own the transport.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, user: UserId, text: String) -> Result<(), SinkError>;
}

#[async_trait]
impl<S> ChatSink for Arc<S>
where
    S: ChatSink + ?Sized,
{
    async fn send(&self, user: UserId, text: String) -> Result<(), SinkError> {
        (**self).send(user, text).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub user_id: UserId,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// A [`ChatSink`] that keeps the last `capacity` messages in memory.
#[derive(Debug)]
pub struct InMemoryOutbox {
    messages: Mutex<VecDeque<OutboundMessage>>,
    capacity: usize,
}

impl InMemoryOutbox {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<OutboundMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, message: OutboundMessage) {
        let mut messages = self.lock();
        if messages.len() == self.capacity {
            messages.pop_front();
        }
        messages.push_back(message);
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<OutboundMessage> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn for_user(&self, user: UserId) -> Vec<OutboundMessage> {
        self.lock()
            .iter()
            .filter(|m| m.user_id == user)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl ChatSink for InMemoryOutbox {
    async fn send(&self, user: UserId, text: String) -> Result<(), SinkError> {
        self.push(OutboundMessage {
            user_id: user,
            text,
            sent_at: Utc::now(),
        });
        Ok(())
    }
}

/// The localized text to push to an order's owner, if the event warrants one.
///
/// Placement is answered inline by the gateway, so only later transitions
/// produce a notification.
pub fn status_notification(event: &StatusEnvelope, users: &UserDirectory) -> Option<(UserId, String)> {
    if event.category() != StatusCategory::Order {
        return None;
    }
    let order_id = event.order_id()?;
    let payload = event.payload();
    let user = payload.user_id?;
    let status: OrderStatus = payload.status.as_deref()?.parse().ok()?;
    if status == OrderStatus::Pending {
        return None;
    }

    let msg = Msg::StatusChanged {
        order_id,
        status,
        note: payload.note.clone(),
    };
    Some((user, msg.render(users.language(user))))
}

/// Spawn the worker that turns order status events into user notifications.
pub fn spawn_notifier<S>(
    mut subscription: Subscription<StatusEnvelope>,
    users: Arc<UserDirectory>,
    sink: S,
) -> WorkerHandle
where
    S: ChatSink + 'static,
{
    WorkerHandle::spawn("notifier", move |mut shutdown| async move {
        loop {
            let received = tokio::select! {
                _ = shutdown.requested() => break,
                received = subscription.recv() => received,
            };
            match received {
                Ok(event) => {
                    let Some((user, text)) = status_notification(&event, &users) else {
                        continue;
                    };
                    if let Err(err) = sink.send(user, text).await {
                        warn!(worker = "notifier", user_id = %user, error = ?err, "notification not delivered");
                    }
                }
                Err(SubscriptionError::Overrun { skipped }) => {
                    warn!(worker = "notifier", skipped, "notifier missed status events");
                }
                Err(SubscriptionError::Closed) => {
                    debug!(worker = "notifier", "status bus closed; notifier exiting");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopkeep_core::OrderId;
    use shopkeep_events::{Broadcaster, EventBus, StatusEvent};
    use std::time::Duration;

    use crate::i18n::Language;

    fn order_event(order: u64, user: i64, status: OrderStatus) -> StatusEnvelope {
        let payload = StatusEvent::new(format!("order.{}", status.as_str()), "test")
            .with_user(UserId::new(user))
            .with_status(status.as_str());
        StatusEnvelope::for_order(OrderId::new(order), 1, Utc::now(), payload)
    }

    #[test]
    fn outbox_is_bounded() {
        let outbox = InMemoryOutbox::new(2);
        for i in 0..3 {
            outbox.push(OutboundMessage {
                user_id: UserId::new(i),
                text: i.to_string(),
                sent_at: Utc::now(),
            });
        }
        let recent = outbox.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "2");
        assert_eq!(recent[1].text, "1");
    }

    #[test]
    fn only_later_order_transitions_notify_the_owner() {
        let users = UserDirectory::new();
        users.touch(UserId::new(9), None, Some("ru"), Utc::now());

        assert!(status_notification(&order_event(1, 9, OrderStatus::Pending), &users).is_none());
        assert!(
            status_notification(&StatusEnvelope::operational("bot.started", "up", Utc::now()), &users)
                .is_none()
        );

        let (user, text) =
            status_notification(&order_event(1, 9, OrderStatus::Delivered), &users).unwrap();
        assert_eq!(user, UserId::new(9));
        assert_eq!(
            text,
            Msg::StatusChanged {
                order_id: OrderId::new(1),
                status: OrderStatus::Delivered,
                note: None,
            }
            .render(Language::Ru)
        );
    }

    #[tokio::test]
    async fn notifier_delivers_to_the_sink() {
        let bus: Broadcaster<StatusEnvelope> = Broadcaster::new(16);
        let users = Arc::new(UserDirectory::new());
        let outbox = Arc::new(InMemoryOutbox::new(16));
        let worker = spawn_notifier(bus.subscribe(), Arc::clone(&users), Arc::clone(&outbox));

        bus.publish(order_event(4, 3, OrderStatus::Processing)).unwrap();

        let mut delivered = false;
        for _ in 0..50 {
            if !outbox.is_empty() {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        worker.shutdown().await;

        assert!(delivered);
        let sent = outbox.for_user(UserId::new(3));
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains('4'));
    }
}
