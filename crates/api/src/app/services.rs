//! Component wiring: one instance of every service per process.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use shopkeep_bot::{
    BotGateway, BotStatus, GatewayConfig, InMemoryOutbox, Maintenance, SessionStore, UserDirectory,
    WorkerHandle, spawn_notifier,
};
use shopkeep_catalog::Catalog;
use shopkeep_events::{EventBus, EventLog, StatusBroadcaster, StatusEnvelope};
use shopkeep_inventory::InventoryLedger;
use shopkeep_orders::OrderStateMachine;

use crate::config::AppConfig;

/// Dashboard counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardSnapshot {
    pub total_users: usize,
    pub active_orders: usize,
    pub total_products: usize,
    pub total_locations: usize,
    pub bot_status: BotStatus,
}

#[derive(Debug)]
pub struct AppServices {
    pub config: AppConfig,
    pub catalog: Arc<Catalog>,
    pub ledger: Arc<InventoryLedger>,
    pub orders: Arc<OrderStateMachine>,
    pub sessions: Arc<SessionStore>,
    pub users: Arc<UserDirectory>,
    pub bus: Arc<StatusBroadcaster>,
    pub event_log: Arc<EventLog>,
    pub outbox: Arc<InMemoryOutbox>,
    pub gateway: Arc<BotGateway>,
    pub maintenance: Arc<Maintenance>,
}

impl AppServices {
    pub fn build(config: AppConfig) -> Self {
        let catalog = Arc::new(Catalog::new());
        let bus = Arc::new(StatusBroadcaster::new(config.subscriber_buffer));
        let ledger = Arc::new(InventoryLedger::new(config.checkout_hold));
        let orders = Arc::new(OrderStateMachine::new(
            Arc::clone(&ledger),
            Arc::clone(&bus),
            config.order_timeout,
        ));
        let sessions = Arc::new(SessionStore::new(config.session_timeout));
        let users = Arc::new(UserDirectory::new());
        let gateway = Arc::new(BotGateway::new(
            Arc::clone(&catalog),
            Arc::clone(&orders),
            Arc::clone(&sessions),
            Arc::clone(&users),
            Arc::clone(&bus),
            GatewayConfig {
                admins: config.admins.clone(),
            },
        ));
        let maintenance = Arc::new(Maintenance::new(
            Arc::clone(&orders),
            Arc::clone(&sessions),
            Arc::clone(&gateway),
        ));

        Self {
            event_log: Arc::new(EventLog::new(config.event_log_capacity)),
            outbox: Arc::new(InMemoryOutbox::new(config.outbox_capacity)),
            config,
            catalog,
            ledger,
            orders,
            sessions,
            users,
            bus,
            gateway,
            maintenance,
        }
    }

    /// Start the background tasks. Must run inside a tokio runtime.
    pub fn spawn_workers(&self) -> Workers {
        let recorder = self.event_log.spawn_recorder(self.bus.subscribe());
        let notifier = spawn_notifier(
            self.bus.subscribe(),
            Arc::clone(&self.users),
            Arc::clone(&self.outbox),
        );
        let maintenance = Arc::clone(&self.maintenance).spawn(self.config.maintenance_interval);
        info!(
            subscribers = self.bus.subscriber_count(),
            "background workers started"
        );
        Workers {
            recorder,
            notifier,
            maintenance,
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            total_users: self.users.count(),
            active_orders: self.orders.count_active(),
            total_products: self.catalog.product_count(),
            total_locations: self.catalog.location_count(),
            bot_status: self.gateway.status(),
        }
    }

    /// Publish an operator-initiated event to the dashboard feed.
    pub fn publish(&self, event: StatusEnvelope) {
        let Ok(()) = self.bus.publish(event);
    }
}

/// Background tasks owned by the process.
#[derive(Debug)]
pub struct Workers {
    recorder: JoinHandle<()>,
    notifier: WorkerHandle,
    maintenance: WorkerHandle,
}

impl Workers {
    /// Stop the workers. The recorder ends with the bus, so it is aborted.
    pub async fn shutdown(self) {
        self.maintenance.shutdown().await;
        self.notifier.shutdown().await;
        self.recorder.abort();
        if let Err(err) = self.recorder.await {
            if !err.is_cancelled() {
                warn!(worker = "event_log", error = ?err, "recorder task failed");
            }
        }
    }
}
