use serde::{Deserialize, Serialize};

use shopkeep_core::{CategoryId, DomainError, Entity, LocationId, ManufacturerId, Money, ProductId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manufacturer {
    pub id: ManufacturerId,
    pub name: String,
}

impl Entity for Manufacturer {
    type Id = ManufacturerId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Grouping used to browse products (drinks, snacks, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// A warehouse or pickup point holding stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub manufacturer_id: ManufacturerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Archived products stay resolvable for existing orders but are not offered.
    pub active: bool,
}

impl Product {
    /// Name shown in menus and carts, e.g. `Lemon Tea (0.5l)`.
    pub fn display_name(&self) -> String {
        match &self.variation {
            Some(v) => format!("{} ({v})", self.name),
            None => self.name.clone(),
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub manufacturer_id: ManufacturerId,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub price: Money,
    #[serde(default)]
    pub variation: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewProduct {
    pub(crate) fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if self.price == Money::ZERO {
            return Err(DomainError::validation("product price must be positive"));
        }
        Ok(())
    }
}

/// Input for creating a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLocation {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}
