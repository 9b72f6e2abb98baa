//! Recent status events kept in memory for dashboards.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::{Subscription, SubscriptionError};
use crate::status::StatusEnvelope;

/// Fixed-capacity ring buffer of the most recent status events.
///
/// Process-scoped: nothing survives a restart.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    entries: Mutex<VecDeque<StatusEnvelope>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event, evicting the oldest when full.
    pub fn record(&self, event: StatusEnvelope) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    /// Up to `limit` most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<StatusEnvelope> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<StatusEnvelope>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Spawn a task that records everything arriving on `subscription`.
    ///
    /// Overruns are tolerated (the gap is logged); the task ends when the bus closes.
    pub fn spawn_recorder(
        self: &Arc<Self>,
        mut subscription: Subscription<StatusEnvelope>,
    ) -> JoinHandle<()> {
        let log = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match subscription.recv().await {
                    Ok(event) => log.record(event),
                    Err(SubscriptionError::Overrun { skipped }) => {
                        warn!(worker = "event_log", skipped, "recent-event log missed events");
                    }
                    Err(SubscriptionError::Closed) => {
                        debug!(worker = "event_log", "status bus closed; recorder exiting");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::bus::EventBus;
    use chrono::Utc;

    fn op(name: &str) -> StatusEnvelope {
        StatusEnvelope::operational(name, name, Utc::now())
    }

    #[test]
    fn evicts_oldest_when_full() {
        let log = EventLog::new(2);
        log.record(op("a"));
        log.record(op("b"));
        log.record(op("c"));

        let names: Vec<_> = log
            .recent(10)
            .into_iter()
            .map(|e| e.payload().event_type.clone())
            .collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[test]
    fn recent_respects_limit_and_clear_empties() {
        let log = EventLog::new(5);
        for n in ["a", "b", "c"] {
            log.record(op(n));
        }
        assert_eq!(log.recent(1).len(), 1);
        log.clear();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn recorder_follows_the_bus_until_it_closes() {
        let bus = Broadcaster::<StatusEnvelope>::new(16);
        let log = Arc::new(EventLog::new(16));
        let handle = log.spawn_recorder(bus.subscribe());

        bus.publish(op("one")).unwrap();
        bus.publish(op("two")).unwrap();
        drop(bus);
        handle.await.unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.recent(1)[0].payload().event_type, "two");
    }
}
