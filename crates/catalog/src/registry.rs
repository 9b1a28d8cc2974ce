//! Read-only collaborator contracts consumed by the core.

use std::sync::Arc;

use stocktrace_core::{DomainError, DomainResult, InMemoryTable, LocationId, ProductId};

use crate::location::{Location, LocationKind};
use crate::product::Product;

/// Product metadata source (expiry policy), keyed by product id.
pub trait ProductCatalog: Send + Sync {
    fn product(&self, id: ProductId) -> DomainResult<Option<Product>>;
}

/// Location id -> kind lookup.
pub trait LocationRegistry: Send + Sync {
    fn location(&self, id: LocationId) -> DomainResult<Option<Location>>;
}

impl<S> ProductCatalog for Arc<S>
where
    S: ProductCatalog + ?Sized,
{
    fn product(&self, id: ProductId) -> DomainResult<Option<Product>> {
        (**self).product(id)
    }
}

impl<S> LocationRegistry for Arc<S>
where
    S: LocationRegistry + ?Sized,
{
    fn location(&self, id: LocationId) -> DomainResult<Option<Location>> {
        (**self).location(id)
    }
}

/// Resolve a product, failing with `Validation` when it is unknown.
pub fn require_product(catalog: &dyn ProductCatalog, id: ProductId) -> DomainResult<Product> {
    catalog
        .product(id)?
        .ok_or_else(|| DomainError::validation(format!("unknown product {id}")))
}

/// Resolve an active location of the given kind.
///
/// Unknown, inactive or wrong-kind locations are all `Validation` errors: the
/// caller supplied a location the operation cannot run against.
pub fn require_location(
    registry: &dyn LocationRegistry,
    id: LocationId,
    kind: LocationKind,
) -> DomainResult<Location> {
    let location = registry
        .location(id)?
        .ok_or_else(|| DomainError::validation(format!("unknown location {id}")))?;

    if !location.active {
        return Err(DomainError::validation(format!(
            "location {} is inactive",
            location.name
        )));
    }
    if location.kind != kind {
        return Err(DomainError::validation(format!(
            "location {} is {:?}, expected {:?}",
            location.name, location.kind, kind
        )));
    }
    Ok(location)
}

/// In-memory catalog + registry for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: InMemoryTable<Product>,
    locations: InMemoryTable<Location>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&self, product: Product) -> DomainResult<()> {
        self.products.insert(product)
    }

    pub fn add_location(&self, location: Location) -> DomainResult<()> {
        self.locations.insert(location)
    }

    /// Mark a location inactive; returns `false` if it is unknown.
    pub fn deactivate_location(&self, id: LocationId) -> DomainResult<bool> {
        let updated = self.locations.update(&id, |loc| {
            loc.active = false;
            Ok(())
        })?;
        Ok(updated.is_some())
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn product(&self, id: ProductId) -> DomainResult<Option<Product>> {
        self.products.get(&id)
    }
}

impl LocationRegistry for InMemoryCatalog {
    fn location(&self, id: LocationId) -> DomainResult<Option<Location>> {
        self.locations.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ExpiryPolicy;

    #[test]
    fn require_location_checks_kind_and_activity() {
        let catalog = InMemoryCatalog::new();
        let warehouse = Location::warehouse("Central");
        let store = Location::store("Downtown");
        catalog.add_location(warehouse.clone()).unwrap();
        catalog.add_location(store.clone()).unwrap();

        assert!(require_location(&catalog, warehouse.id, LocationKind::Warehouse).is_ok());

        let err = require_location(&catalog, store.id, LocationKind::Warehouse).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = require_location(&catalog, LocationId::new(), LocationKind::Store).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("unknown location")));

        assert!(catalog.deactivate_location(store.id).unwrap());
        let err = require_location(&catalog, store.id, LocationKind::Store).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("inactive")));
    }

    #[test]
    fn require_product_rejects_unknown_ids() {
        let catalog = InMemoryCatalog::new();
        let product = Product::new("Mozzarella", ExpiryPolicy::new(5, 0, 0));
        catalog.add_product(product.clone()).unwrap();

        assert_eq!(require_product(&catalog, product.id).unwrap(), product);
        assert!(require_product(&catalog, ProductId::new()).is_err());
    }
}
