use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use shopkeep_core::{LocationId, ProductId, ReservationId};

use crate::error::LedgerError;
use crate::reservation::{Reservation, StockRequest};
use crate::row::{StockKey, StockLevel, StockRow};

type RowHandle = Arc<Mutex<StockRow>>;
type LockedRows<'a> = BTreeMap<StockKey, MutexGuard<'a, StockRow>>;

fn lock(row: &RowHandle) -> MutexGuard<'_, StockRow> {
    row.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Authoritative stock per (product, location), with time-boxed reservations.
///
/// Locking:
/// - each row sits behind its own mutex inside a sharded map; there is no
///   ledger-wide lock
/// - multi-row operations lock rows in `StockKey` order
/// - a reservation entry is only inserted or removed while its row is locked,
///   so holding a row lock pins the set of reservations against it
/// - rows are never removed, so a cloned row handle stays valid
#[derive(Debug)]
pub struct InventoryLedger {
    rows: DashMap<StockKey, RowHandle>,
    reservations: DashMap<ReservationId, Reservation>,
    reservation_timeout: TimeDelta,
}

impl InventoryLedger {
    pub fn new(reservation_timeout: TimeDelta) -> Self {
        Self {
            rows: DashMap::new(),
            reservations: DashMap::new(),
            reservation_timeout,
        }
    }

    pub fn reservation_timeout(&self) -> TimeDelta {
        self.reservation_timeout
    }

    fn row(&self, key: StockKey) -> Option<RowHandle> {
        self.rows.get(&key).map(|r| Arc::clone(r.value()))
    }

    fn row_or_create(&self, key: StockKey) -> RowHandle {
        Arc::clone(self.rows.entry(key).or_default().value())
    }

    fn lookup(&self, id: ReservationId) -> Result<Reservation, LedgerError> {
        self.reservations
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(LedgerError::UnknownReservation(id))
    }

    fn handles(&self, keys: impl IntoIterator<Item = StockKey>) -> Vec<(StockKey, RowHandle)> {
        keys.into_iter()
            .filter_map(|key| self.row(key).map(|h| (key, h)))
            .collect()
    }

    fn lock_all(handles: &[(StockKey, RowHandle)]) -> LockedRows<'_> {
        // `handles` is built from an ordered set, so this locks in key order.
        handles.iter().map(|(key, h)| (*key, lock(h))).collect()
    }

    /// Hold `quantity` units of a row until `now + reservation_timeout`.
    pub fn reserve(
        &self,
        product: ProductId,
        location: LocationId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<ReservationId, LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }
        let key = StockKey::new(product, location);
        let Some(handle) = self.row(key) else {
            return Err(LedgerError::InsufficientStock {
                product,
                location,
                requested: quantity,
                available: 0,
            });
        };

        let mut row = lock(&handle);
        row.reserve(key, quantity)?;
        let reservation = Reservation {
            id: ReservationId::new(),
            product,
            location,
            quantity,
            expires_at: now + self.reservation_timeout,
        };
        let id = reservation.id;
        self.reservations.insert(id, reservation);
        debug!(reservation_id = %id, %product, %location, quantity, "stock reserved");
        Ok(id)
    }

    /// Reserve every line or none of them.
    ///
    /// Lines for the same row are summed before checking availability. On
    /// failure the error names the first row (in key order) that is short.
    pub fn reserve_all(
        &self,
        requests: &[StockRequest],
        now: DateTime<Utc>,
    ) -> Result<Vec<ReservationId>, LedgerError> {
        if requests.iter().any(|r| r.quantity == 0) {
            return Err(LedgerError::ZeroQuantity);
        }

        let mut wanted: BTreeMap<StockKey, u32> = BTreeMap::new();
        for request in requests {
            let total = wanted.entry(request.key()).or_default();
            *total = total.saturating_add(request.quantity);
        }

        let handles = self.handles(wanted.keys().copied());
        let mut rows = Self::lock_all(&handles);

        for (key, requested) in &wanted {
            let available = rows.get(key).map_or(0, |row| row.available());
            if *requested > available {
                return Err(LedgerError::InsufficientStock {
                    product: key.product,
                    location: key.location,
                    requested: *requested,
                    available,
                });
            }
        }

        let expires_at = now + self.reservation_timeout;
        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            let key = request.key();
            if let Some(row) = rows.get_mut(&key) {
                // Cannot fail: the totals were checked above under the same locks.
                row.reserve(key, request.quantity)?;
            }
            let reservation = Reservation {
                id: ReservationId::new(),
                product: request.product,
                location: request.location,
                quantity: request.quantity,
                expires_at,
            };
            ids.push(reservation.id);
            self.reservations.insert(reservation.id, reservation);
        }
        debug!(lines = requests.len(), "stock reserved (all lines)");
        Ok(ids)
    }

    /// Turn a reservation into a stock decrement.
    ///
    /// An expired reservation is released instead and `ReservationTimeout` returned.
    pub fn commit(&self, id: ReservationId, now: DateTime<Utc>) -> Result<Reservation, LedgerError> {
        let mut committed = self.settle(&[id], now, |rows, reservations| {
            for r in &reservations {
                if let Some(row) = rows.get_mut(&r.key()) {
                    row.commit(r.quantity);
                }
            }
            reservations
        })?;
        committed.pop().ok_or(LedgerError::UnknownReservation(id))
    }

    /// Commit every reservation or none of them.
    ///
    /// If any reservation has expired, all expired ones are released, the rest
    /// stay reserved and untouched, and `ReservationTimeout` names the first
    /// expired id.
    pub fn commit_all(
        &self,
        ids: &[ReservationId],
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, LedgerError> {
        let committed = self.settle(ids, now, |rows, reservations| {
            for r in &reservations {
                if let Some(row) = rows.get_mut(&r.key()) {
                    row.commit(r.quantity);
                }
            }
            reservations
        })?;
        info!(reservations = committed.len(), "reservations committed");
        Ok(committed)
    }

    /// Move the deadline of every reservation to `until`, or of none.
    ///
    /// Used when a short checkout hold becomes an order hold.
    pub fn extend_all(
        &self,
        ids: &[ReservationId],
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.settle(ids, now, |_rows, reservations| {
            for mut r in reservations {
                r.expires_at = until;
                self.reservations.insert(r.id, r);
            }
        })
    }

    /// Shared path of commit/extend: lock every involved row, verify every
    /// reservation is still live and unexpired, then hand the removed
    /// reservations to `f` with the rows still locked.
    fn settle<T>(
        &self,
        ids: &[ReservationId],
        now: DateTime<Utc>,
        f: impl FnOnce(&mut LockedRows<'_>, Vec<Reservation>) -> T,
    ) -> Result<T, LedgerError> {
        let mut unique = BTreeSet::new();
        let ids: Vec<ReservationId> = ids.iter().copied().filter(|id| unique.insert(*id)).collect();

        let keys: BTreeSet<StockKey> = ids
            .iter()
            .map(|id| self.lookup(*id).map(|r| r.key()))
            .collect::<Result<_, _>>()?;
        let handles = self.handles(keys);
        let mut rows = Self::lock_all(&handles);

        // Re-read under the row locks; a concurrent release may have won.
        let current: Vec<Reservation> = ids
            .iter()
            .map(|id| self.lookup(*id))
            .collect::<Result<_, _>>()?;

        let expired: Vec<&Reservation> = current.iter().filter(|r| r.is_expired(now)).collect();
        if let Some(first) = expired.first() {
            for r in &expired {
                self.reservations.remove(&r.id);
                if let Some(row) = rows.get_mut(&r.key()) {
                    row.release(r.quantity);
                }
            }
            warn!(
                reservation_id = %first.id,
                expired = expired.len(),
                "expired reservations released instead of settled"
            );
            return Err(LedgerError::ReservationTimeout(first.id));
        }

        for r in &current {
            self.reservations.remove(&r.id);
        }
        Ok(f(&mut rows, current))
    }

    /// Give the held units back to the row.
    pub fn release(&self, id: ReservationId) -> Result<Reservation, LedgerError> {
        let key = self.lookup(id)?.key();
        let handle = self.row(key).ok_or(LedgerError::UnknownReservation(id))?;
        let mut row = lock(&handle);
        let (_, reservation) = self
            .reservations
            .remove(&id)
            .ok_or(LedgerError::UnknownReservation(id))?;
        row.release(reservation.quantity);
        debug!(reservation_id = %id, quantity = reservation.quantity, "reservation released");
        Ok(reservation)
    }

    /// Release whatever is still live among `ids`; returns how many were released.
    pub fn release_all(&self, ids: &[ReservationId]) -> usize {
        ids.iter().filter(|id| self.release(**id).is_ok()).count()
    }

    /// Release every reservation whose deadline has passed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<Reservation> {
        let candidates: Vec<(ReservationId, StockKey)> = self
            .reservations
            .iter()
            .filter(|r| r.is_expired(now))
            .map(|r| (r.id, r.value().key()))
            .collect();

        let mut released = Vec::with_capacity(candidates.len());
        for (id, key) in candidates {
            let Some(handle) = self.row(key) else { continue };
            let mut row = lock(&handle);
            // It may have been settled or extended since the scan.
            if let Some((_, reservation)) = self.reservations.remove_if(&id, |_, r| r.is_expired(now)) {
                row.release(reservation.quantity);
                released.push(reservation);
            }
        }
        if !released.is_empty() {
            info!(released = released.len(), "expired reservations swept");
        }
        released
    }

    /// Add (or with a negative delta, remove) on-hand stock.
    ///
    /// Cannot take on-hand below what is currently reserved.
    pub fn adjust(
        &self,
        product: ProductId,
        location: LocationId,
        delta: i64,
    ) -> Result<StockLevel, LedgerError> {
        let key = StockKey::new(product, location);
        let handle = self.row_or_create(key);
        let mut row = lock(&handle);
        row.adjust(key, delta)?;
        info!(%product, %location, delta, on_hand = row.on_hand(), "stock adjusted");
        Ok(StockLevel::of(key, &row))
    }

    pub fn set_on_hand(
        &self,
        product: ProductId,
        location: LocationId,
        on_hand: u32,
    ) -> Result<StockLevel, LedgerError> {
        let key = StockKey::new(product, location);
        let handle = self.row_or_create(key);
        let mut row = lock(&handle);
        row.set_on_hand(key, on_hand)?;
        info!(%product, %location, on_hand, "stock set");
        Ok(StockLevel::of(key, &row))
    }

    pub fn stock(&self, product: ProductId, location: LocationId) -> StockLevel {
        let key = StockKey::new(product, location);
        match self.row(key) {
            Some(handle) => StockLevel::of(key, &lock(&handle)),
            None => StockLevel::empty(key),
        }
    }

    /// Every row, in key order.
    pub fn rows(&self) -> Vec<StockLevel> {
        let mut handles: Vec<(StockKey, RowHandle)> = self
            .rows
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();
        handles.sort_by_key(|(key, _)| *key);
        handles
            .iter()
            .map(|(key, h)| StockLevel::of(*key, &lock(h)))
            .collect()
    }

    /// Rows at `location` with something left to sell.
    pub fn available_at(&self, location: LocationId) -> Vec<StockLevel> {
        self.rows()
            .into_iter()
            .filter(|level| level.location == location && level.available > 0)
            .collect()
    }

    pub fn locations_with_stock(&self) -> Vec<LocationId> {
        self.rows()
            .into_iter()
            .filter(|level| level.available > 0)
            .map(|level| level.location)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.lookup(id).ok()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn p(n: u32) -> ProductId {
        ProductId::new(n)
    }

    fn l(n: u32) -> LocationId {
        LocationId::new(n)
    }

    fn ledger() -> InventoryLedger {
        InventoryLedger::new(TimeDelta::minutes(10))
    }

    #[test]
    fn reserve_then_commit_decrements_on_hand() {
        let ledger = ledger();
        ledger.set_on_hand(p(1), l(1), 10).unwrap();

        let id = ledger.reserve(p(1), l(1), 4, test_time()).unwrap();
        assert_eq!(ledger.stock(p(1), l(1)).available, 6);

        ledger.commit(id, test_time()).unwrap();
        let level = ledger.stock(p(1), l(1));
        assert_eq!((level.on_hand, level.reserved, level.available), (6, 0, 6));
        assert_eq!(ledger.reservation_count(), 0);
    }

    #[test]
    fn over_reserving_fails_and_leaves_stock_unchanged() {
        let ledger = ledger();
        ledger.set_on_hand(p(1), l(1), 3).unwrap();

        match ledger.reserve(p(1), l(1), 4, test_time()) {
            Err(LedgerError::InsufficientStock { requested, available, .. }) => {
                assert_eq!((requested, available), (4, 3));
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(ledger.stock(p(1), l(1)).available, 3);
        assert_eq!(ledger.reservation_count(), 0);
    }

    #[test]
    fn unknown_row_has_nothing_to_reserve() {
        let ledger = ledger();
        assert!(matches!(
            ledger.reserve(p(9), l(9), 1, test_time()),
            Err(LedgerError::InsufficientStock { available: 0, .. })
        ));
    }

    #[test]
    fn release_returns_units_and_is_single_use() {
        let ledger = ledger();
        ledger.set_on_hand(p(1), l(1), 5).unwrap();
        let id = ledger.reserve(p(1), l(1), 5, test_time()).unwrap();

        ledger.release(id).unwrap();
        assert_eq!(ledger.stock(p(1), l(1)).available, 5);
        assert_eq!(ledger.release(id), Err(LedgerError::UnknownReservation(id)));
        assert_eq!(ledger.commit(id, test_time()), Err(LedgerError::UnknownReservation(id)));
    }

    #[test]
    fn committing_after_deadline_times_out_and_releases() {
        let ledger = ledger();
        ledger.set_on_hand(p(1), l(1), 5).unwrap();
        let id = ledger.reserve(p(1), l(1), 2, test_time()).unwrap();

        let late = test_time() + TimeDelta::minutes(11);
        assert_eq!(ledger.commit(id, late), Err(LedgerError::ReservationTimeout(id)));

        let level = ledger.stock(p(1), l(1));
        assert_eq!((level.on_hand, level.reserved), (5, 0));
        assert!(ledger.reservation(id).is_none());
    }

    #[test]
    fn multi_line_reserve_rolls_back_as_a_whole() {
        // Stock 12 and 4; asking 10 and 5 fails on the second line.
        let ledger = ledger();
        ledger.set_on_hand(p(1), l(1), 12).unwrap();
        ledger.set_on_hand(p(2), l(1), 4).unwrap();

        let lines = [
            StockRequest::new(p(1), l(1), 10),
            StockRequest::new(p(2), l(1), 5),
        ];
        match ledger.reserve_all(&lines, test_time()) {
            Err(LedgerError::InsufficientStock { product, requested, available, .. }) => {
                assert_eq!((product, requested, available), (p(2), 5, 4));
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(ledger.stock(p(1), l(1)).available, 12);
        assert_eq!(ledger.stock(p(2), l(1)).available, 4);
        assert_eq!(ledger.reservation_count(), 0);
    }

    #[test]
    fn multi_line_reserve_sums_lines_for_the_same_row() {
        let ledger = ledger();
        ledger.set_on_hand(p(1), l(1), 5).unwrap();
        let lines = [StockRequest::new(p(1), l(1), 3), StockRequest::new(p(1), l(1), 3)];
        assert!(ledger.reserve_all(&lines, test_time()).is_err());

        let lines = [StockRequest::new(p(1), l(1), 3), StockRequest::new(p(1), l(1), 2)];
        let ids = ledger.reserve_all(&lines, test_time()).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ledger.stock(p(1), l(1)).available, 0);
    }

    #[test]
    fn commit_all_with_one_expired_line_commits_nothing() {
        let ledger = ledger();
        ledger.set_on_hand(p(1), l(1), 5).unwrap();
        ledger.set_on_hand(p(2), l(1), 5).unwrap();

        let fresh = ledger.reserve(p(1), l(1), 2, test_time() + TimeDelta::minutes(5)).unwrap();
        let stale = ledger.reserve(p(2), l(1), 2, test_time()).unwrap();

        let at = test_time() + TimeDelta::minutes(12);
        assert_eq!(
            ledger.commit_all(&[fresh, stale], at),
            Err(LedgerError::ReservationTimeout(stale))
        );

        // The stale hold is gone, the fresh one is still reserved and uncommitted.
        assert_eq!(ledger.stock(p(2), l(1)).reserved, 0);
        let level = ledger.stock(p(1), l(1));
        assert_eq!((level.on_hand, level.reserved), (5, 2));
        assert!(ledger.reservation(fresh).is_some());
    }

    #[test]
    fn extend_all_moves_deadlines() {
        let ledger = ledger();
        ledger.set_on_hand(p(1), l(1), 5).unwrap();
        let id = ledger.reserve(p(1), l(1), 1, test_time()).unwrap();

        let until = test_time() + TimeDelta::hours(24);
        ledger.extend_all(&[id], until, test_time()).unwrap();
        assert_eq!(ledger.reservation(id).map(|r| r.expires_at), Some(until));

        assert!(ledger.sweep_expired(test_time() + TimeDelta::hours(1)).is_empty());
        assert!(ledger.commit(id, test_time() + TimeDelta::hours(23)).is_ok());
    }

    #[test]
    fn sweep_releases_only_expired_reservations() {
        let ledger = ledger();
        ledger.set_on_hand(p(1), l(1), 10).unwrap();
        let old = ledger.reserve(p(1), l(1), 3, test_time()).unwrap();
        let new = ledger.reserve(p(1), l(1), 2, test_time() + TimeDelta::minutes(8)).unwrap();

        let swept = ledger.sweep_expired(test_time() + TimeDelta::minutes(10));
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, old);
        assert!(ledger.reservation(new).is_some());
        assert_eq!(ledger.stock(p(1), l(1)).reserved, 2);
    }

    #[test]
    fn adjust_rejects_going_below_reserved() {
        let ledger = ledger();
        ledger.adjust(p(1), l(1), 4).unwrap();
        ledger.reserve(p(1), l(1), 3, test_time()).unwrap();

        assert!(matches!(
            ledger.adjust(p(1), l(1), -2),
            Err(LedgerError::BelowReserved { reserved: 3, .. })
        ));
        assert_eq!(ledger.adjust(p(1), l(1), -1).unwrap().on_hand, 3);
    }

    #[test]
    fn locations_with_stock_skip_fully_reserved_rows() {
        let ledger = ledger();
        ledger.set_on_hand(p(1), l(1), 1).unwrap();
        ledger.set_on_hand(p(1), l(2), 1).unwrap();
        ledger.set_on_hand(p(2), l(3), 0).unwrap();
        ledger.reserve(p(1), l(2), 1, test_time()).unwrap();

        assert_eq!(ledger.locations_with_stock(), vec![l(1)]);
        assert_eq!(ledger.available_at(l(1)).len(), 1);
        assert_eq!(ledger.rows().len(), 3);
    }

    #[test]
    fn concurrent_reservations_never_oversell() {
        let ledger = ledger();
        ledger.set_on_hand(p(1), l(1), 5).unwrap();

        let successes: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| ledger.reserve(p(1), l(1), 1, test_time()).is_ok()))
                .collect();
            handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum()
        });

        assert_eq!(successes, 5);
        assert_eq!(ledger.stock(p(1), l(1)).available, 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(u32),
        Commit(usize),
        Release(usize),
        Adjust(i64),
        Sweep(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..8).prop_map(Op::Reserve),
            (0usize..8).prop_map(Op::Commit),
            (0usize..8).prop_map(Op::Release),
            (-6i64..6).prop_map(Op::Adjust),
            (0i64..15).prop_map(Op::Sweep),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, ..ProptestConfig::default() })]

        #[test]
        fn stock_never_goes_negative(initial in 0u32..20, ops in prop::collection::vec(op(), 1..40)) {
            let ledger = ledger();
            ledger.set_on_hand(p(1), l(1), initial).unwrap();
            let mut ids: Vec<ReservationId> = Vec::new();
            let mut now = test_time();

            for op in ops {
                match op {
                    Op::Reserve(q) => {
                        if let Ok(id) = ledger.reserve(p(1), l(1), q, now) {
                            ids.push(id);
                        }
                    }
                    Op::Commit(i) => {
                        if let Some(id) = ids.get(i) {
                            let _ = ledger.commit(*id, now);
                        }
                    }
                    Op::Release(i) => {
                        if let Some(id) = ids.get(i) {
                            let _ = ledger.release(*id);
                        }
                    }
                    Op::Adjust(d) => {
                        let _ = ledger.adjust(p(1), l(1), d);
                    }
                    Op::Sweep(minutes) => {
                        now += TimeDelta::minutes(minutes);
                        ledger.sweep_expired(now);
                    }
                }

                let level = ledger.stock(p(1), l(1));
                prop_assert!(level.reserved <= level.on_hand);
                prop_assert_eq!(level.available, level.on_hand - level.reserved);

                let held: u32 = ids
                    .iter()
                    .filter_map(|id| ledger.reservation(*id))
                    .map(|r| r.quantity)
                    .sum();
                prop_assert_eq!(held, level.reserved);
            }
        }
    }
}
