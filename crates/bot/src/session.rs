//! Per-user conversational state.
//!
//! A session is in-memory only and time-boxed: once `last_activity` is older
//! than the store's timeout it is unreachable, and the next access starts a
//! fresh one. Each session sits behind its own lock, so a mutator only ever
//! blocks callers for the same user. Mutators must stay synchronous and must
//! not call into other components.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use shopkeep_core::{LocationId, Money, ProductId, ReservationId, UserId};
use shopkeep_inventory::StockRequest;
use shopkeep_orders::{OrderLine, PaymentMethod};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session was idle too long and has been discarded. `held` lists the
    /// checkout reservations it still carried; the caller should release them.
    #[error("session for user {user} expired")]
    Expired {
        user: UserId,
        held: Vec<ReservationId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: ProductId,
    pub location: LocationId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn quantity_of(&self, product: ProductId, location: LocationId) -> u32 {
        self.position(product, location)
            .map_or(0, |i| self.lines[i].quantity)
    }

    /// Add `quantity` to the line for (product, location), creating it if
    /// needed. Returns the line's new quantity.
    pub fn add(&mut self, product: ProductId, location: LocationId, quantity: u32) -> u32 {
        match self.position(product, location) {
            Some(i) => {
                let line = &mut self.lines[i];
                line.quantity = line.quantity.saturating_add(quantity);
                line.quantity
            }
            None => {
                self.lines.push(CartLine { product, location, quantity });
                quantity
            }
        }
    }

    /// Returns whether a line was removed.
    pub fn remove(&mut self, product: ProductId, location: LocationId) -> bool {
        match self.position(product, location) {
            Some(i) => {
                self.lines.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn requests(&self) -> Vec<StockRequest> {
        self.lines
            .iter()
            .map(|l| StockRequest::new(l.product, l.location, l.quantity))
            .collect()
    }

    fn position(&self, product: ProductId, location: LocationId) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| l.product == product && l.location == location)
    }
}

/// Which screen the user last looked at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "menu", content = "location", rename_all = "snake_case")]
pub enum MenuContext {
    #[default]
    Main,
    Location(LocationId),
    Cart,
    Checkout,
}

/// A cart line whose stock is reserved, priced at checkout time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldLine {
    pub product: ProductId,
    pub location: LocationId,
    pub quantity: u32,
    pub unit_price: Money,
    pub reservation_id: ReservationId,
}

impl From<HeldLine> for OrderLine {
    fn from(line: HeldLine) -> Self {
        OrderLine {
            product_id: line.product,
            location_id: line.location,
            quantity: line.quantity,
            unit_price: line.unit_price,
            reservation_id: line.reservation_id,
        }
    }
}

/// Checkout awaiting `/confirm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCheckout {
    pub payment: PaymentMethod,
    pub lines: Vec<HeldLine>,
    pub held_until: DateTime<Utc>,
}

impl PendingCheckout {
    pub fn total(&self) -> Money {
        self.lines
            .iter()
            .map(|l| l.unit_price.times(l.quantity))
            .sum()
    }

    pub fn reservation_ids(&self) -> Vec<ReservationId> {
        self.lines.iter().map(|l| l.reservation_id).collect()
    }

    pub fn order_lines(&self) -> Vec<OrderLine> {
        self.lines.iter().copied().map(OrderLine::from).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub cart: Cart,
    pub menu: MenuContext,
    pub checkout: Option<PendingCheckout>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    fn fresh(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            cart: Cart::default(),
            menu: MenuContext::Main,
            checkout: None,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn is_idle(&self, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
        now - self.last_activity >= timeout
    }

    /// Reservations held by a pending checkout, if any.
    pub fn held_reservations(&self) -> Vec<ReservationId> {
        self.checkout
            .as_ref()
            .map(PendingCheckout::reservation_ids)
            .unwrap_or_default()
    }
}

/// `None` once the session has been discarded; a caller holding a stale slot
/// goes back to the map.
type Slot = Arc<Mutex<Option<Session>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<Session>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<UserId, Slot>,
    timeout: TimeDelta,
}

impl SessionStore {
    pub fn new(timeout: TimeDelta) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> TimeDelta {
        self.timeout
    }

    fn slot(&self, user: UserId, now: DateTime<Utc>) -> Slot {
        let entry = self
            .sessions
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(Some(Session::fresh(user, now)))));
        Arc::clone(entry.value())
    }

    /// Mark the session behind `slot` discarded and unlink it from the map.
    fn discard(&self, user: UserId, slot: &Slot, guard: &mut Option<Session>) -> Option<Session> {
        self.sessions.remove_if(&user, |_, s| Arc::ptr_eq(s, slot));
        guard.take()
    }

    /// The user's live session, touched at `now`. An absent or idle session is
    /// replaced by a fresh one.
    pub fn get(&self, user: UserId, now: DateTime<Utc>) -> Session {
        loop {
            let slot = self.slot(user, now);
            let mut guard = lock(&slot);
            let Some(session) = guard.as_mut() else { continue };
            if session.is_idle(now, self.timeout) {
                debug!(user_id = %user, "idle session replaced");
                *session = Session::fresh(user, now);
            }
            session.last_activity = session.last_activity.max(now);
            return session.clone();
        }
    }

    /// Run `mutator` on the user's session and touch it.
    ///
    /// A missing session is created first. An idle one is discarded and
    /// reported as `Expired` without running `mutator`.
    pub fn update<R>(
        &self,
        user: UserId,
        now: DateTime<Utc>,
        mutator: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, SessionError> {
        loop {
            let slot = self.slot(user, now);
            let mut guard = lock(&slot);
            let Some(session) = guard.as_mut() else { continue };
            if session.is_idle(now, self.timeout) {
                let held = session.held_reservations();
                self.discard(user, &slot, &mut guard);
                debug!(user_id = %user, held = held.len(), "session expired");
                return Err(SessionError::Expired { user, held });
            }
            let result = mutator(session);
            session.last_activity = session.last_activity.max(now);
            return Ok(result);
        }
    }

    /// Drop the user's session, returning it.
    pub fn expire(&self, user: UserId) -> Option<Session> {
        let (_, slot) = self.sessions.remove(&user)?;
        lock(&slot).take()
    }

    /// Remove every idle session and return them.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<Session> {
        let slots: Vec<(UserId, Slot)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut idle = Vec::new();
        for (user, slot) in slots {
            let mut guard = lock(&slot);
            if guard.as_ref().is_some_and(|s| s.is_idle(now, self.timeout)) {
                idle.extend(self.discard(user, &slot, &mut guard));
            }
        }
        idle
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
