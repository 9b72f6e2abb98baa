use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopkeep_core::{LocationId, ProductId, ReservationId};

use crate::row::StockKey;

/// A live hold against a stock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product: ProductId,
    pub location: LocationId,
    pub quantity: u32,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product, self.location)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One line of a multi-row reservation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRequest {
    pub product: ProductId,
    pub location: LocationId,
    pub quantity: u32,
}

impl StockRequest {
    pub fn new(product: ProductId, location: LocationId, quantity: u32) -> Self {
        Self {
            product,
            location,
            quantity,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product, self.location)
    }
}
