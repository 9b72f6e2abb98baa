//! Orders: the order aggregate and the state machine service around it.
//!
//! `order` holds the pure decision/evolution logic (no IO). `machine` pairs it
//! with the inventory ledger and the status broadcaster.

pub mod book;
pub mod error;
pub mod machine;
pub mod order;

pub use book::OrderBook;
pub use error::OrderError;
pub use machine::{OrderFilter, OrderStateMachine};
pub use order::{
    CancelOrder, DeliverOrder, Order, OrderCancelled, OrderCommand, OrderDelivered, OrderEvent,
    OrderLine, OrderPlaced, OrderStatus, PaymentMethod, PlaceOrder, ProcessingStarted,
    StartProcessing,
};
