//! Inventory ledger: the single writer of stock counts.
//!
//! Stock is tracked per (product, location) row as `on_hand` and `reserved`.
//! Reservations are time-boxed holds against a row; they are either committed
//! (stock leaves the building), released, or swept once their deadline passes.

pub mod error;
pub mod ledger;
pub mod reservation;
pub mod row;

pub use error::LedgerError;
pub use ledger::InventoryLedger;
pub use reservation::{Reservation, StockRequest};
pub use row::{StockKey, StockLevel, StockRow};
