use thiserror::Error;

use shopkeep_core::{DomainError, OrderId};
use shopkeep_inventory::LedgerError;

use crate::order::OrderStatus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// The order is not in a status the requested transition starts from.
    /// The order is unchanged.
    #[error("order {order} cannot move from {from} to {to}")]
    InvalidTransition {
        order: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The stock side effect failed; the order is unchanged.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl OrderError {
    /// Map an aggregate rejection onto the service error for order `order`.
    pub(crate) fn from_domain(
        order: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        err: DomainError,
    ) -> Self {
        match err {
            DomainError::InvalidTransition { .. } => Self::InvalidTransition { order, from, to },
            DomainError::NotFound => Self::NotFound(order),
            other => Self::Domain(other),
        }
    }
}
