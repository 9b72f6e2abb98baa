use serde::{Deserialize, Serialize};

use shopkeep_core::{LocationId, ProductId};

use crate::error::LedgerError;

/// Address of a stock row. Ordered so multi-row operations lock in a fixed order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product: ProductId,
    pub location: LocationId,
}

impl StockKey {
    pub fn new(product: ProductId, location: LocationId) -> Self {
        Self { product, location }
    }
}

/// Counts for one (product, location).
///
/// Invariant: `reserved <= on_hand`. Every mutator checks before writing, so a
/// failed call leaves the row unchanged.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct StockRow {
    on_hand: u32,
    reserved: u32,
}

impl StockRow {
    pub fn new(on_hand: u32) -> Self {
        Self {
            on_hand,
            reserved: 0,
        }
    }

    pub fn on_hand(&self) -> u32 {
        self.on_hand
    }

    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    pub fn available(&self) -> u32 {
        self.on_hand - self.reserved
    }

    pub(crate) fn reserve(&mut self, key: StockKey, quantity: u32) -> Result<(), LedgerError> {
        if quantity > self.available() {
            return Err(LedgerError::InsufficientStock {
                product: key.product,
                location: key.location,
                requested: quantity,
                available: self.available(),
            });
        }
        self.reserved += quantity;
        Ok(())
    }

    /// Reserved units leave stock entirely.
    pub(crate) fn commit(&mut self, quantity: u32) {
        debug_assert!(quantity <= self.reserved);
        let quantity = quantity.min(self.reserved);
        self.reserved -= quantity;
        self.on_hand -= quantity;
    }

    pub(crate) fn release(&mut self, quantity: u32) {
        debug_assert!(quantity <= self.reserved);
        self.reserved -= quantity.min(self.reserved);
    }

    pub(crate) fn set_on_hand(&mut self, key: StockKey, on_hand: u32) -> Result<(), LedgerError> {
        if on_hand < self.reserved {
            return Err(LedgerError::BelowReserved {
                product: key.product,
                location: key.location,
                reserved: self.reserved,
            });
        }
        self.on_hand = on_hand;
        Ok(())
    }

    pub(crate) fn adjust(&mut self, key: StockKey, delta: i64) -> Result<(), LedgerError> {
        let target = i64::from(self.on_hand) + delta;
        if target < i64::from(self.reserved) {
            return Err(LedgerError::BelowReserved {
                product: key.product,
                location: key.location,
                reserved: self.reserved,
            });
        }
        let target = u32::try_from(target).map_err(|_| LedgerError::Overflow {
            product: key.product,
            location: key.location,
        })?;
        self.on_hand = target;
        Ok(())
    }
}

/// Read-only view of a row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product: ProductId,
    pub location: LocationId,
    pub on_hand: u32,
    pub reserved: u32,
    pub available: u32,
}

impl StockLevel {
    pub(crate) fn of(key: StockKey, row: &StockRow) -> Self {
        Self {
            product: key.product,
            location: key.location,
            on_hand: row.on_hand,
            reserved: row.reserved,
            available: row.available(),
        }
    }

    pub(crate) fn empty(key: StockKey) -> Self {
        Self::of(key, &StockRow::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StockKey {
        StockKey::new(ProductId::new(1), LocationId::new(1))
    }

    #[test]
    fn over_reserving_leaves_row_unchanged() {
        let mut row = StockRow::new(3);
        row.reserve(key(), 2).unwrap();

        let err = row.reserve(key(), 2).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                product: ProductId::new(1),
                location: LocationId::new(1),
                requested: 2,
                available: 1,
            }
        );
        assert_eq!((row.on_hand(), row.reserved()), (3, 2));
    }

    #[test]
    fn commit_removes_from_both_counts() {
        let mut row = StockRow::new(5);
        row.reserve(key(), 4).unwrap();
        row.commit(4);
        assert_eq!((row.on_hand(), row.reserved(), row.available()), (1, 0, 1));
    }

    #[test]
    fn adjust_cannot_undercut_reservations() {
        let mut row = StockRow::new(5);
        row.reserve(key(), 3).unwrap();
        assert!(matches!(row.adjust(key(), -3), Err(LedgerError::BelowReserved { reserved: 3, .. })));
        row.adjust(key(), -2).unwrap();
        assert_eq!(row.available(), 0);
    }
}
