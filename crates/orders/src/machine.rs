use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use shopkeep_core::{Aggregate, AggregateRoot, OrderId, UserId};
use shopkeep_events::{Event, EventBus, StatusBroadcaster, StatusEnvelope, StatusEvent};
use shopkeep_inventory::{InventoryLedger, LedgerError};

use crate::book::{OrderBook, lock};
use crate::error::OrderError;
use crate::order::{
    CancelOrder, DeliverOrder, Order, OrderCommand, OrderEvent, OrderLine, OrderStatus,
    PaymentMethod, PlaceOrder, StartProcessing,
};

/// Reason recorded on orders cancelled by `expire_stale`.
pub const EXPIRED_REASON: &str = "reservation timeout";

/// Optional criteria for listing orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<UserId>,
}

impl OrderFilter {
    fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|s| order.status() == s)
            && self.user_id.is_none_or(|u| order.user_id() == u)
    }
}

/// Order lifecycle service.
///
/// Every transition runs under the order's own lock as decide (aggregate
/// `handle`) → stock side effect → evolve (`apply`) → publish. A failed side
/// effect returns before `apply`, so the order is left as it was. Publishing
/// under the lock keeps each order's events in sequence order on the bus.
#[derive(Debug)]
pub struct OrderStateMachine {
    book: OrderBook,
    ledger: Arc<InventoryLedger>,
    bus: Arc<StatusBroadcaster>,
    order_hold: TimeDelta,
}

impl OrderStateMachine {
    /// `order_hold` is how long a Pending order keeps its stock reserved.
    pub fn new(ledger: Arc<InventoryLedger>, bus: Arc<StatusBroadcaster>, order_hold: TimeDelta) -> Self {
        Self {
            book: OrderBook::new(),
            ledger,
            bus,
            order_hold,
        }
    }

    pub fn ledger(&self) -> &Arc<InventoryLedger> {
        &self.ledger
    }

    /// Create a Pending order from lines whose stock is already reserved.
    ///
    /// The reservations are extended to the order hold. If that fails (a hold
    /// already lapsed) no order is created; the caller still owns whatever
    /// reservations remain.
    pub fn place(
        &self,
        user_id: UserId,
        lines: Vec<OrderLine>,
        payment: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let reservations: Vec<_> = lines.iter().map(|l| l.reservation_id).collect();
        let order_id = self.book.allocate_id();
        let mut order = Order::empty(order_id);
        let command = OrderCommand::PlaceOrder(PlaceOrder {
            order_id,
            user_id,
            lines,
            payment,
            occurred_at: now,
        });
        let events = order.handle(&command)?;

        self.ledger.extend_all(&reservations, now + self.order_hold, now)?;

        for ev in &events {
            order.apply(ev);
        }

        let handle = Arc::new(Mutex::new(order));
        let order = lock(&handle);
        self.book.insert(order_id, Arc::clone(&handle));
        for ev in &events {
            self.publish(&order, ev);
        }
        info!(
            order_id = %order_id,
            user_id = %user_id,
            total = %order.total(),
            "order placed"
        );
        Ok(order.clone())
    }

    /// Pending → Processing. Commits every line's reservation (all or none).
    pub fn start_processing(&self, id: OrderId, now: DateTime<Utc>) -> Result<Order, OrderError> {
        self.transition(id, OrderStatus::Processing, |_| true, now, |order, at| {
            let cmd = OrderCommand::StartProcessing(StartProcessing {
                order_id: order.id_typed(),
                occurred_at: at,
            });
            (cmd, Effect::Commit)
        })
    }

    /// Processing → Delivered.
    pub fn deliver(&self, id: OrderId, now: DateTime<Utc>) -> Result<Order, OrderError> {
        self.transition(id, OrderStatus::Delivered, |_| true, now, |order, at| {
            let cmd = OrderCommand::DeliverOrder(DeliverOrder {
                order_id: order.id_typed(),
                occurred_at: at,
            });
            (cmd, Effect::None)
        })
    }

    /// Pending|Processing → Cancelled. Releases any still-reserved lines.
    pub fn cancel(
        &self,
        id: OrderId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        self.transition(id, OrderStatus::Cancelled, |_| true, now, move |order, at| {
            (cancel_command(order, reason, at), Effect::Release)
        })
    }

    /// Customer-initiated cancellation: only the owner, only while Pending.
    ///
    /// Someone else's order reports `NotFound`.
    pub fn cancel_own(
        &self,
        id: OrderId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let handle = self.book.handle(id).ok_or(OrderError::NotFound(id))?;
        {
            let order = lock(&handle);
            if order.user_id() != user_id {
                return Err(OrderError::NotFound(id));
            }
        }
        self.transition(
            id,
            OrderStatus::Cancelled,
            |order| order.status() == OrderStatus::Pending,
            now,
            |order, at| (cancel_command(order, Some("cancelled by customer".into()), at), Effect::Release),
        )
    }

    /// Cancel Pending orders older than the order hold, releasing their stock.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> Vec<Order> {
        let hold = self.order_hold;
        let is_stale =
            move |order: &Order| order.status() == OrderStatus::Pending && order.created_at() + hold <= now;

        let candidates: Vec<OrderId> = self
            .book
            .snapshot()
            .into_iter()
            .filter(|o| is_stale(o))
            .map(|o| o.id_typed())
            .collect();

        let mut expired = Vec::new();
        for id in candidates {
            let result = self.transition(id, OrderStatus::Cancelled, is_stale, now, |order, at| {
                (cancel_command(order, Some(EXPIRED_REASON.into()), at), Effect::Release)
            });
            match result {
                Ok(order) => expired.push(order),
                // Moved on (processed or cancelled) since the scan.
                Err(OrderError::InvalidTransition { .. }) => {}
                Err(err) => warn!(order_id = %id, error = ?err, "failed to expire stale order"),
            }
        }
        if !expired.is_empty() {
            info!(expired = expired.len(), "stale orders cancelled");
        }
        expired
    }

    fn transition(
        &self,
        id: OrderId,
        to: OrderStatus,
        precondition: impl FnOnce(&Order) -> bool,
        now: DateTime<Utc>,
        command: impl FnOnce(&Order, DateTime<Utc>) -> (OrderCommand, Effect),
    ) -> Result<Order, OrderError> {
        let handle = self.book.handle(id).ok_or(OrderError::NotFound(id))?;
        let mut order = lock(&handle);
        let from = order.status();
        if !precondition(&*order) {
            return Err(OrderError::InvalidTransition { order: id, from, to });
        }

        // Event time never runs backwards within one order.
        let at = now.max(order.updated_at());
        let (cmd, effect) = command(&*order, at);
        let events = order
            .handle(&cmd)
            .map_err(|err| OrderError::from_domain(id, from, to, err))?;

        self.run_effect(&order, effect, now)?;

        for ev in &events {
            order.apply(ev);
        }
        for ev in &events {
            self.publish(&order, ev);
        }
        info!(order_id = %id, %from, %to, "order transitioned");
        Ok(order.clone())
    }

    fn run_effect(&self, order: &Order, effect: Effect, now: DateTime<Utc>) -> Result<(), LedgerError> {
        match effect {
            Effect::None => Ok(()),
            Effect::Commit => self.ledger.commit_all(&order.reservation_ids(), now).map(|_| ()),
            Effect::Release => {
                let released = self.ledger.release_all(&order.reservation_ids());
                if released > 0 {
                    info!(order_id = %order.id_typed(), released, "order reservations released");
                }
                Ok(())
            }
        }
    }

    fn publish(&self, order: &Order, event: &OrderEvent) {
        let note = match event {
            OrderEvent::OrderCancelled(e) => e.reason.clone(),
            _ => None,
        };
        let payload = StatusEvent::new(event.event_type(), describe(order, event))
            .with_user(order.user_id())
            .with_status(order.status().as_str())
            .with_note(note);
        let envelope = StatusEnvelope::for_order(
            order.id_typed(),
            order.version(),
            event.occurred_at(),
            payload,
        );
        let Ok(()) = self.bus.publish(envelope);
    }

    pub fn get(&self, id: OrderId) -> Result<Order, OrderError> {
        self.book
            .handle(id)
            .map(|h| lock(&h).clone())
            .ok_or(OrderError::NotFound(id))
    }

    /// Orders matching `filter`, ascending by id.
    pub fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        self.book
            .snapshot()
            .into_iter()
            .filter(|o| filter.matches(o))
            .collect()
    }

    /// Pending + Processing.
    pub fn count_active(&self) -> usize {
        self.book
            .handles()
            .iter()
            .filter(|h| lock(h).status().is_active())
            .count()
    }

    pub fn count(&self) -> usize {
        self.book.len()
    }
}

/// Stock work a transition needs between decide and evolve.
#[derive(Debug, Clone, Copy)]
enum Effect {
    None,
    Commit,
    Release,
}

fn cancel_command(order: &Order, reason: Option<String>, at: DateTime<Utc>) -> OrderCommand {
    OrderCommand::CancelOrder(CancelOrder {
        order_id: order.id_typed(),
        reason,
        occurred_at: at,
    })
}

fn describe(order: &Order, event: &OrderEvent) -> String {
    let id = order.id_typed();
    match event {
        OrderEvent::OrderPlaced(e) => format!(
            "Order #{id} placed by user {}: {} item(s), total {}, payment {}",
            e.user_id,
            order.item_count(),
            order.total(),
            e.payment
        ),
        OrderEvent::ProcessingStarted(_) => format!("Order #{id} is being processed"),
        OrderEvent::OrderDelivered(_) => format!("Order #{id} delivered"),
        OrderEvent::OrderCancelled(e) => match &e.reason {
            Some(reason) => format!("Order #{id} cancelled: {reason}"),
            None => format!("Order #{id} cancelled"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shopkeep_core::{LocationId, Money, ProductId};
    use shopkeep_events::Subscription;
    use shopkeep_inventory::StockRequest;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    struct Fixture {
        ledger: Arc<InventoryLedger>,
        bus: Arc<StatusBroadcaster>,
        machine: OrderStateMachine,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InventoryLedger::new(TimeDelta::minutes(10)));
        let bus = Arc::new(StatusBroadcaster::new(64));
        ledger.set_on_hand(ProductId::new(1), LocationId::new(1), 10).unwrap();
        ledger.set_on_hand(ProductId::new(2), LocationId::new(1), 4).unwrap();
        let machine = OrderStateMachine::new(Arc::clone(&ledger), Arc::clone(&bus), TimeDelta::hours(24));
        Fixture { ledger, bus, machine }
    }

    fn reserved_lines(ledger: &InventoryLedger, items: &[(u32, u32)]) -> Vec<OrderLine> {
        let requests: Vec<_> = items
            .iter()
            .map(|(p, q)| StockRequest::new(ProductId::new(*p), LocationId::new(1), *q))
            .collect();
        let ids = ledger.reserve_all(&requests, test_time()).unwrap();
        requests
            .iter()
            .zip(ids)
            .map(|(r, id)| OrderLine {
                product_id: r.product,
                location_id: r.location,
                quantity: r.quantity,
                unit_price: Money::from_cents(100),
                reservation_id: id,
            })
            .collect()
    }

    fn place(f: &Fixture, items: &[(u32, u32)]) -> Order {
        let lines = reserved_lines(&f.ledger, items);
        f.machine
            .place(UserId::new(7), lines, PaymentMethod::Cash, test_time())
            .unwrap()
    }

    fn drain(sub: &mut Subscription<StatusEnvelope>) -> Vec<StatusEnvelope> {
        let mut out = Vec::new();
        while let Ok(Some(ev)) = sub.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn placing_extends_reservations_to_the_order_hold() {
        let f = fixture();
        let order = place(&f, &[(1, 3)]);

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.id_typed(), OrderId::new(1));
        let reservation = f.ledger.reservation(order.lines()[0].reservation_id).unwrap();
        assert_eq!(reservation.expires_at, test_time() + TimeDelta::hours(24));
    }

    #[test]
    fn processing_commits_stock_and_delivery_completes() {
        let f = fixture();
        let order = place(&f, &[(1, 3), (2, 4)]);
        let id = order.id_typed();

        f.machine.start_processing(id, test_time()).unwrap();
        let level = f.ledger.stock(ProductId::new(1), LocationId::new(1));
        assert_eq!((level.on_hand, level.reserved), (7, 0));
        assert_eq!(f.ledger.stock(ProductId::new(2), LocationId::new(1)).on_hand, 0);

        let delivered = f.machine.deliver(id, test_time()).unwrap();
        assert_eq!(delivered.status(), OrderStatus::Delivered);
        assert_eq!(f.machine.count_active(), 0);
    }

    #[test]
    fn cancelling_pending_order_releases_stock() {
        let f = fixture();
        let order = place(&f, &[(1, 3)]);

        let cancelled = f
            .machine
            .cancel(order.id_typed(), Some("customer changed mind".into()), test_time())
            .unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(cancelled.note(), Some("customer changed mind"));
        assert_eq!(f.ledger.stock(ProductId::new(1), LocationId::new(1)).available, 10);
        assert_eq!(f.ledger.reservation_count(), 0);
    }

    #[test]
    fn illegal_transition_leaves_order_and_stock_unchanged() {
        let f = fixture();
        let order = place(&f, &[(1, 3)]);
        let id = order.id_typed();

        match f.machine.deliver(id, test_time()) {
            Err(OrderError::InvalidTransition { from, to, .. }) => {
                assert_eq!((from, to), (OrderStatus::Pending, OrderStatus::Delivered));
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(f.machine.get(id).unwrap(), order);
        assert_eq!(f.ledger.stock(ProductId::new(1), LocationId::new(1)).reserved, 3);
    }

    #[test]
    fn failed_commit_keeps_order_pending() {
        let f = fixture();
        let order = place(&f, &[(1, 3)]);
        let late = test_time() + TimeDelta::hours(25);

        match f.machine.start_processing(order.id_typed(), late) {
            Err(OrderError::Ledger(LedgerError::ReservationTimeout(_))) => {}
            other => panic!("expected ReservationTimeout, got {other:?}"),
        }
        assert_eq!(f.machine.get(order.id_typed()).unwrap().status(), OrderStatus::Pending);
    }

    #[test]
    fn each_transition_publishes_one_ordered_event() {
        let f = fixture();
        let mut sub = f.bus.subscribe();
        let order = place(&f, &[(1, 1)]);
        let id = order.id_typed();

        // An earlier clock must not produce an earlier event time.
        let earlier = test_time() - TimeDelta::minutes(5);
        f.machine.start_processing(id, earlier).unwrap();
        f.machine.deliver(id, test_time() + TimeDelta::minutes(1)).unwrap();

        let events = drain(&mut sub);
        let types: Vec<_> = events.iter().map(|e| e.payload().event_type.as_str()).collect();
        assert_eq!(types, vec!["order.placed", "order.processing", "order.delivered"]);

        let seqs: Vec<_> = events.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(events.windows(2).all(|w| w[0].occurred_at() <= w[1].occurred_at()));
        assert!(events.iter().all(|e| e.order_id() == Some(id)));
        assert_eq!(events[2].payload().status.as_deref(), Some("delivered"));
    }

    #[test]
    fn customers_can_only_cancel_their_own_pending_orders() {
        let f = fixture();
        let order = place(&f, &[(1, 1)]);
        let id = order.id_typed();

        assert_eq!(
            f.machine.cancel_own(id, UserId::new(99), test_time()),
            Err(OrderError::NotFound(id))
        );

        f.machine.start_processing(id, test_time()).unwrap();
        assert!(matches!(
            f.machine.cancel_own(id, UserId::new(7), test_time()),
            Err(OrderError::InvalidTransition { from: OrderStatus::Processing, .. })
        ));
    }

    #[test]
    fn stale_pending_orders_expire() {
        let f = fixture();
        let stale = place(&f, &[(1, 2)]);
        let processing = place(&f, &[(2, 1)]);
        f.machine.start_processing(processing.id_typed(), test_time()).unwrap();

        let expired = f.machine.expire_stale(test_time() + TimeDelta::hours(24));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id_typed(), stale.id_typed());
        assert_eq!(expired[0].note(), Some(EXPIRED_REASON));
        assert_eq!(f.ledger.stock(ProductId::new(1), LocationId::new(1)).available, 10);
        assert_eq!(
            f.machine.get(processing.id_typed()).unwrap().status(),
            OrderStatus::Processing
        );
    }

    #[test]
    fn list_filters_by_status_and_user() {
        let f = fixture();
        let a = place(&f, &[(1, 1)]);
        place(&f, &[(1, 1)]);
        f.machine.cancel(a.id_typed(), None, test_time()).unwrap();

        let pending = f.machine.list(&OrderFilter {
            status: Some(OrderStatus::Pending),
            user_id: None,
        });
        assert_eq!(pending.len(), 1);
        assert_eq!(f.machine.list(&OrderFilter::default()).len(), 2);
        assert!(f
            .machine
            .list(&OrderFilter { status: None, user_id: Some(UserId::new(1)) })
            .is_empty());
        assert_eq!(f.machine.count_active(), 1);
    }

    #[test]
    fn unknown_order_is_not_found() {
        let f = fixture();
        assert_eq!(
            f.machine.start_processing(OrderId::new(404), test_time()),
            Err(OrderError::NotFound(OrderId::new(404)))
        );
    }
}
