use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use shopkeep_core::{CategoryId, DomainError, LocationId, ManufacturerId, Money, ProductId};

use crate::error::CatalogError;
use crate::model::{Category, Location, Manufacturer, NewLocation, NewProduct, Product};
use crate::registry::Registry;

#[derive(Debug, Default)]
struct State {
    manufacturers: Registry<Manufacturer>,
    categories: Registry<Category>,
    locations: Registry<Location>,
    products: Registry<Product>,
    next_manufacturer: u32,
    next_category: u32,
    next_location: u32,
    next_product: u32,
}

/// Shared, in-memory catalog.
///
/// The lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct Catalog {
    state: RwLock<State>,
}

fn names_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn category_name(name: &str) -> Result<&str, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("category name cannot be empty").into());
    }
    Ok(name)
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_manufacturer(&self, name: &str) -> Result<Manufacturer, CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("manufacturer name cannot be empty").into());
        }
        let mut state = self.write();
        if state.manufacturers.find(|m| names_match(&m.name, name)).is_some() {
            return Err(CatalogError::Duplicate {
                kind: "manufacturer",
                name: name.to_string(),
            });
        }
        state.next_manufacturer += 1;
        let manufacturer = Manufacturer {
            id: ManufacturerId::new(state.next_manufacturer),
            name: name.to_string(),
        };
        state.manufacturers.insert(manufacturer.clone());
        info!(manufacturer_id = %manufacturer.id, name, "manufacturer added");
        Ok(manufacturer)
    }

    pub fn add_category(&self, name: &str) -> Result<Category, CatalogError> {
        let name = category_name(name)?;
        let mut state = self.write();
        if state.categories.find(|c| names_match(&c.name, name)).is_some() {
            return Err(CatalogError::Duplicate {
                kind: "category",
                name: name.to_string(),
            });
        }
        state.next_category += 1;
        let category = Category {
            id: CategoryId::new(state.next_category),
            name: name.to_string(),
        };
        state.categories.insert(category.clone());
        info!(category_id = %category.id, name, "category added");
        Ok(category)
    }

    pub fn rename_category(&self, id: CategoryId, name: &str) -> Result<Category, CatalogError> {
        let name = category_name(name)?;
        let mut state = self.write();
        let taken = state
            .categories
            .find(|c| c.id != id && names_match(&c.name, name))
            .is_some();
        if taken {
            return Err(CatalogError::Duplicate {
                kind: "category",
                name: name.to_string(),
            });
        }
        let category = state
            .categories
            .get_mut(id)
            .ok_or_else(|| CatalogError::not_found("category", id))?;
        category.name = name.to_string();
        info!(category_id = %id, name, "category renamed");
        Ok(category.clone())
    }

    pub fn add_location(&self, input: NewLocation) -> Result<Location, CatalogError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("location name cannot be empty").into());
        }
        let mut state = self.write();
        if state.locations.find(|l| names_match(&l.name, name)).is_some() {
            return Err(CatalogError::Duplicate {
                kind: "location",
                name: name.to_string(),
            });
        }
        state.next_location += 1;
        let location = Location {
            id: LocationId::new(state.next_location),
            name: name.to_string(),
            address: input.address.filter(|a| !a.trim().is_empty()),
        };
        state.locations.insert(location.clone());
        info!(location_id = %location.id, name, "location added");
        Ok(location)
    }

    pub fn add_product(&self, input: NewProduct) -> Result<Product, CatalogError> {
        input.validate()?;
        let mut state = self.write();
        if !state.manufacturers.contains(input.manufacturer_id) {
            return Err(CatalogError::not_found("manufacturer", input.manufacturer_id));
        }
        if let Some(category) = input.category_id.filter(|c| !state.categories.contains(*c)) {
            return Err(CatalogError::not_found("category", category));
        }
        let name = input.name.trim().to_string();
        let duplicate = state.products.find(|p| {
            p.manufacturer_id == input.manufacturer_id
                && names_match(&p.name, &name)
                && p.variation == input.variation
        });
        if duplicate.is_some() {
            return Err(CatalogError::Duplicate {
                kind: "product",
                name,
            });
        }
        state.next_product += 1;
        let product = Product {
            id: ProductId::new(state.next_product),
            name,
            manufacturer_id: input.manufacturer_id,
            category_id: input.category_id,
            price: input.price,
            variation: input.variation,
            description: input.description,
            active: true,
        };
        state.products.insert(product.clone());
        info!(product_id = %product.id, price = %product.price, "product added");
        Ok(product)
    }

    /// Change the unit price. Existing orders keep the price they captured.
    pub fn set_price(&self, id: ProductId, price: Money) -> Result<Product, CatalogError> {
        if price == Money::ZERO {
            return Err(DomainError::validation("product price must be positive").into());
        }
        let mut state = self.write();
        let product = state
            .products
            .get_mut(id)
            .ok_or_else(|| CatalogError::not_found("product", id))?;
        product.price = price;
        Ok(product.clone())
    }

    /// Move a product into `category`, or out of any with `None`.
    pub fn set_category(&self, id: ProductId, category: Option<CategoryId>) -> Result<Product, CatalogError> {
        let mut state = self.write();
        if let Some(c) = category.filter(|c| !state.categories.contains(*c)) {
            return Err(CatalogError::not_found("category", c));
        }
        let product = state
            .products
            .get_mut(id)
            .ok_or_else(|| CatalogError::not_found("product", id))?;
        product.category_id = category;
        Ok(product.clone())
    }

    /// Withdraw a product from sale.
    pub fn archive_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        let mut state = self.write();
        let product = state
            .products
            .get_mut(id)
            .ok_or_else(|| CatalogError::not_found("product", id))?;
        product.active = false;
        info!(product_id = %id, "product archived");
        Ok(product.clone())
    }

    pub fn product(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.read()
            .products
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found("product", id))
    }

    /// A product that can currently be sold.
    pub fn active_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.product(id)
            .and_then(|p| if p.active { Ok(p) } else { Err(CatalogError::not_found("product", id)) })
    }

    pub fn location(&self, id: LocationId) -> Result<Location, CatalogError> {
        self.read()
            .locations
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found("location", id))
    }

    pub fn manufacturer(&self, id: ManufacturerId) -> Result<Manufacturer, CatalogError> {
        self.read()
            .manufacturers
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found("manufacturer", id))
    }

    pub fn products(&self) -> Vec<Product> {
        self.read().products.all()
    }

    pub fn products_by_manufacturer(&self, id: ManufacturerId) -> Vec<Product> {
        self.read()
            .products
            .filtered(|p| p.active && p.manufacturer_id == id)
    }

    pub fn category(&self, id: CategoryId) -> Result<Category, CatalogError> {
        self.read()
            .categories
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found("category", id))
    }

    pub fn categories(&self) -> Vec<Category> {
        self.read().categories.all()
    }

    pub fn products_in_category(&self, id: CategoryId) -> Vec<Product> {
        self.read()
            .products
            .filtered(|p| p.active && p.category_id == Some(id))
    }

    pub fn locations(&self) -> Vec<Location> {
        self.read().locations.all()
    }

    pub fn manufacturers(&self) -> Vec<Manufacturer> {
        self.read().manufacturers.all()
    }

    pub fn product_count(&self) -> usize {
        self.read().products.filtered(|p| p.active).len()
    }

    pub fn location_count(&self) -> usize {
        self.read().locations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Catalog, Manufacturer) {
        let catalog = Catalog::new();
        let m = catalog.add_manufacturer("Acme").unwrap();
        (catalog, m)
    }

    fn tea(m: &Manufacturer) -> NewProduct {
        NewProduct {
            name: "Lemon Tea".into(),
            manufacturer_id: m.id,
            category_id: None,
            price: Money::from_cents(250),
            variation: Some("0.5l".into()),
            description: None,
        }
    }

    #[test]
    fn ids_are_allocated_sequentially() {
        let (catalog, m) = seeded();
        let a = catalog.add_location(NewLocation { name: "North".into(), address: None }).unwrap();
        let b = catalog.add_location(NewLocation { name: "South".into(), address: None }).unwrap();
        assert_eq!(a.id, LocationId::new(1));
        assert_eq!(b.id, LocationId::new(2));
        assert_eq!(m.id, ManufacturerId::new(1));
    }

    #[test]
    fn product_requires_known_manufacturer_and_positive_price() {
        let (catalog, m) = seeded();

        let mut input = tea(&m);
        input.manufacturer_id = ManufacturerId::new(99);
        match catalog.add_product(input) {
            Err(CatalogError::NotFound { kind, .. }) => assert_eq!(kind, "manufacturer"),
            other => panic!("unexpected: {other:?}"),
        }

        let mut input = tea(&m);
        input.price = Money::ZERO;
        match catalog.add_product(input) {
            Err(CatalogError::Domain(DomainError::Validation(_))) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn duplicate_names_are_rejected_case_insensitively() {
        let (catalog, m) = seeded();
        assert!(matches!(
            catalog.add_manufacturer(" acme "),
            Err(CatalogError::Duplicate { .. })
        ));

        catalog.add_product(tea(&m)).unwrap();
        let mut again = tea(&m);
        again.name = "LEMON TEA".into();
        assert!(matches!(catalog.add_product(again), Err(CatalogError::Duplicate { .. })));

        // Same name, different variation is a different product.
        let mut large = tea(&m);
        large.variation = Some("1l".into());
        assert!(catalog.add_product(large).is_ok());
    }

    #[test]
    fn archived_products_stay_resolvable_but_not_active() {
        let (catalog, m) = seeded();
        let p = catalog.add_product(tea(&m)).unwrap();
        catalog.archive_product(p.id).unwrap();

        assert!(catalog.product(p.id).is_ok());
        assert!(catalog.active_product(p.id).is_err());
        assert_eq!(catalog.product_count(), 0);
        assert!(catalog.products_by_manufacturer(m.id).is_empty());
    }

    #[test]
    fn categories_group_products() {
        let (catalog, m) = seeded();
        let drinks = catalog.add_category("Drinks").unwrap();
        assert!(matches!(
            catalog.add_category("drinks"),
            Err(CatalogError::Duplicate { .. })
        ));

        let mut input = tea(&m);
        input.category_id = Some(CategoryId::new(9));
        match catalog.add_product(input) {
            Err(CatalogError::NotFound { kind, .. }) => assert_eq!(kind, "category"),
            other => panic!("unexpected: {other:?}"),
        }

        let mut input = tea(&m);
        input.category_id = Some(drinks.id);
        let p = catalog.add_product(input).unwrap();
        assert_eq!(catalog.products_in_category(drinks.id), vec![p.clone()]);

        let moved = catalog.set_category(p.id, None).unwrap();
        assert_eq!(moved.category_id, None);
        assert!(catalog.products_in_category(drinks.id).is_empty());
    }

    #[test]
    fn renaming_a_category_keeps_names_unique() {
        let catalog = Catalog::new();
        let drinks = catalog.add_category("Drinks").unwrap();
        catalog.add_category("Snacks").unwrap();

        assert!(matches!(
            catalog.rename_category(drinks.id, "SNACKS"),
            Err(CatalogError::Duplicate { .. })
        ));
        assert!(matches!(
            catalog.rename_category(drinks.id, "  "),
            Err(CatalogError::Domain(DomainError::Validation(_)))
        ));

        let renamed = catalog.rename_category(drinks.id, "Hot drinks").unwrap();
        assert_eq!(renamed.id, drinks.id);
        assert_eq!(catalog.category(drinks.id).unwrap().name, "Hot drinks");
        assert_eq!(catalog.categories().len(), 2);
    }

    #[test]
    fn display_name_includes_variation() {
        let (catalog, m) = seeded();
        let p = catalog.add_product(tea(&m)).unwrap();
        assert_eq!(p.display_name(), "Lemon Tea (0.5l)");
    }
}
