use thiserror::Error;

use shopkeep_core::{LocationId, ProductId, ReservationId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(
        "insufficient stock for product {product} at location {location}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product: ProductId,
        location: LocationId,
        requested: u32,
        available: u32,
    },

    /// The reservation's deadline passed before it was committed; it has been released.
    #[error("reservation {0} timed out")]
    ReservationTimeout(ReservationId),

    /// Already committed, released or swept (or never existed).
    #[error("reservation {0} not found")]
    UnknownReservation(ReservationId),

    #[error("quantity must be positive")]
    ZeroQuantity,

    /// An adjustment would drop on-hand stock below what is currently reserved.
    #[error(
        "stock for product {product} at location {location} cannot go below {reserved} (reserved)"
    )]
    BelowReserved {
        product: ProductId,
        location: LocationId,
        reserved: u32,
    },

    #[error("stock for product {product} at location {location} would overflow")]
    Overflow {
        product: ProductId,
        location: LocationId,
    },
}
