//! Periodic cleanup: idle sessions, stale orders, lapsed reservations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use shopkeep_inventory::InventoryLedger;
use shopkeep_orders::OrderStateMachine;

use crate::gateway::BotGateway;
use crate::session::SessionStore;
use crate::worker::WorkerHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sessions_expired: usize,
    pub orders_expired: usize,
    pub reservations_released: usize,
    pub lanes_pruned: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == SweepReport::default()
    }
}

#[derive(Debug)]
pub struct Maintenance {
    ledger: Arc<InventoryLedger>,
    orders: Arc<OrderStateMachine>,
    sessions: Arc<SessionStore>,
    gateway: Arc<BotGateway>,
}

impl Maintenance {
    pub fn new(orders: Arc<OrderStateMachine>, sessions: Arc<SessionStore>, gateway: Arc<BotGateway>) -> Self {
        Self {
            ledger: Arc::clone(orders.ledger()),
            orders,
            sessions,
            gateway,
        }
    }

    /// One cleanup pass at `now`.
    ///
    /// Idle sessions go first so their checkout holds are released directly;
    /// the ledger sweep then catches whatever else has lapsed.
    pub fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for session in self.sessions.sweep(now) {
            report.sessions_expired += 1;
            report.reservations_released += self.ledger.release_all(&session.held_reservations());
        }
        report.orders_expired = self.orders.expire_stale(now).len();
        report.reservations_released += self.ledger.sweep_expired(now).len();
        report.lanes_pruned = self.gateway.prune_lanes();

        if report.is_empty() {
            debug!("maintenance pass: nothing to do");
        } else {
            info!(
                sessions_expired = report.sessions_expired,
                orders_expired = report.orders_expired,
                reservations_released = report.reservations_released,
                "maintenance pass"
            );
        }
        report
    }

    /// Run a pass every `period` until shut down.
    pub fn spawn(self: Arc<Self>, period: Duration) -> WorkerHandle {
        WorkerHandle::spawn("maintenance", move |mut shutdown| async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.requested() => break,
                    _ = ticker.tick() => {
                        self.run_once(Utc::now());
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use shopkeep_catalog::Catalog;
    use shopkeep_core::{LocationId, Money, ProductId, UserId};
    use shopkeep_events::StatusBroadcaster;
    use shopkeep_inventory::StockRequest;
    use shopkeep_orders::{OrderLine, OrderStatus, PaymentMethod};

    use crate::gateway::GatewayConfig;
    use crate::session::{HeldLine, PendingCheckout};
    use crate::users::UserDirectory;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    const P: ProductId = ProductId::new(1);
    const L: LocationId = LocationId::new(1);

    fn setup() -> (Arc<InventoryLedger>, Arc<OrderStateMachine>, Arc<SessionStore>, Maintenance) {
        let ledger = Arc::new(InventoryLedger::new(TimeDelta::minutes(10)));
        ledger.set_on_hand(P, L, 20).unwrap();
        let bus = Arc::new(StatusBroadcaster::new(16));
        let orders = Arc::new(OrderStateMachine::new(
            Arc::clone(&ledger),
            Arc::clone(&bus),
            TimeDelta::hours(24),
        ));
        let sessions = Arc::new(SessionStore::new(TimeDelta::minutes(30)));
        let gateway = Arc::new(BotGateway::new(
            Arc::new(Catalog::new()),
            Arc::clone(&orders),
            Arc::clone(&sessions),
            Arc::new(UserDirectory::new()),
            bus,
            GatewayConfig::default(),
        ));
        let maintenance = Maintenance::new(Arc::clone(&orders), Arc::clone(&sessions), gateway);
        (ledger, orders, sessions, maintenance)
    }

    #[test]
    fn idle_session_holds_are_released() {
        let (ledger, _orders, sessions, maintenance) = setup();
        let t0 = test_time();
        let ids = ledger.reserve_all(&[StockRequest::new(P, L, 3)], t0).unwrap();
        sessions
            .update(UserId::new(5), t0, |s| {
                s.checkout = Some(PendingCheckout {
                    payment: PaymentMethod::Cash,
                    lines: vec![HeldLine {
                        product: P,
                        location: L,
                        quantity: 3,
                        unit_price: Money::from_cents(100),
                        reservation_id: ids[0],
                    }],
                    held_until: t0 + TimeDelta::minutes(10),
                });
            })
            .unwrap();

        let report = maintenance.run_once(t0 + TimeDelta::minutes(35));
        assert_eq!(report.sessions_expired, 1);
        assert_eq!(report.reservations_released, 1);
        assert_eq!(ledger.stock(P, L).reserved, 0);
        assert!(sessions.is_empty());
    }

    #[test]
    fn stale_orders_and_lapsed_reservations_are_cleaned() {
        let (ledger, orders, _sessions, maintenance) = setup();
        let t0 = test_time();

        let ids = ledger.reserve_all(&[StockRequest::new(P, L, 2)], t0).unwrap();
        let order = orders
            .place(
                UserId::new(5),
                vec![OrderLine {
                    product_id: P,
                    location_id: L,
                    quantity: 2,
                    unit_price: Money::from_cents(100),
                    reservation_id: ids[0],
                }],
                PaymentMethod::Card,
                t0,
            )
            .unwrap();
        ledger.reserve(P, L, 4, t0).unwrap();

        let early = maintenance.run_once(t0 + TimeDelta::minutes(11));
        assert_eq!(early.reservations_released, 1);
        assert_eq!(early.orders_expired, 0);
        assert_eq!(ledger.stock(P, L).reserved, 2);

        let late = maintenance.run_once(t0 + TimeDelta::hours(24));
        assert_eq!(late.orders_expired, 1);
        assert_eq!(
            orders.get(order.id_typed()).unwrap().status(),
            OrderStatus::Cancelled
        );
        assert_eq!(ledger.stock(P, L).reserved, 0);
    }

    #[tokio::test]
    async fn spawned_worker_stops_on_shutdown() {
        let (_ledger, _orders, _sessions, maintenance) = setup();
        let worker = Arc::new(maintenance).spawn(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.shutdown().await;
    }
}
