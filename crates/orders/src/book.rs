use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;

use shopkeep_core::OrderId;

use crate::order::Order;

pub(crate) type OrderHandle = Arc<Mutex<Order>>;

pub(crate) fn lock(order: &OrderHandle) -> MutexGuard<'_, Order> {
    order.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory order storage with one lock per order.
///
/// Ids are allocated monotonically starting at 1 and never reused.
#[derive(Debug, Default)]
pub struct OrderBook {
    last_id: AtomicU64,
    orders: DashMap<OrderId, OrderHandle>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate_id(&self) -> OrderId {
        OrderId::new(self.last_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn insert(&self, id: OrderId, order: OrderHandle) {
        self.orders.insert(id, order);
    }

    pub(crate) fn handle(&self, id: OrderId) -> Option<OrderHandle> {
        self.orders.get(&id).map(|o| Arc::clone(o.value()))
    }

    pub(crate) fn handles(&self) -> Vec<OrderHandle> {
        self.orders.iter().map(|o| Arc::clone(o.value())).collect()
    }

    /// Copies of every order, ascending by id.
    pub fn snapshot(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.handles().iter().map(|h| lock(h).clone()).collect();
        orders.sort_by_key(Order::id_typed);
        orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
