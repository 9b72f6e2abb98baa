//! Catalog of products, categories, manufacturers and stock locations.
//!
//! The catalog describes *what* can be sold and *where*; how much of it exists
//! is owned by the inventory ledger.

pub mod catalog;
pub mod error;
pub mod model;
pub mod registry;

pub use catalog::Catalog;
pub use error::CatalogError;
pub use model::{Category, Location, Manufacturer, NewLocation, NewProduct, Product};
pub use registry::Registry;
