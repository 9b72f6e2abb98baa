//! `shopkeep-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the ledger, the
//! order state machine and the bot gateway (no IO, no async).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot};
pub use entity::Entity;
pub use error::DomainError;
pub use id::{CategoryId, LocationId, ManufacturerId, OrderId, ProductId, ReservationId, UserId};
pub use value_object::{Money, ValueObject};
