//! Product and location catalog management.

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use stockledger_core::{DomainError, LocationId, ProductId, UserId};
use stockledger_inventory::{
    Location, LocationPatch, LocationType, NewLocation, NewProduct, Product, ProductPatch,
};

use crate::config::{DefaultLocation, LedgerConfig};
use crate::store::{CatalogStore, StoreError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("location not found: {0}")]
    LocationNotFound(LocationId),

    #[error("sku already in use: {0}")]
    DuplicateSku(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Catalog<S> {
    store: S,
    default_locations: Vec<DefaultLocation>,
}

impl<S: CatalogStore> Catalog<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            default_locations: LedgerConfig::default().default_locations,
        }
    }

    pub fn configured(mut self, config: &LedgerConfig) -> Self {
        self.default_locations = config.default_locations.clone();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn ensure_sku_free(&self, sku: &str, except: Option<ProductId>) -> Result<(), CatalogError> {
        let wanted = sku.trim();
        let taken = self
            .store
            .list_products()?
            .into_iter()
            .any(|p| Some(p.id) != except && p.sku.eq_ignore_ascii_case(wanted));
        if taken {
            return Err(CatalogError::DuplicateSku(wanted.to_string()));
        }
        Ok(())
    }

    pub fn create_product(&self, input: NewProduct) -> Result<Product, CatalogError> {
        input.validate()?;
        self.ensure_sku_free(&input.sku, None)?;

        let product = input.into_product(ProductId::new(), Utc::now())?;
        self.store.put_product(product.clone())?;
        info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product)
    }

    pub fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product, CatalogError> {
        let mut product = self.product(id)?;
        if let Some(sku) = &patch.sku {
            self.ensure_sku_free(sku, Some(id))?;
        }
        product.apply_patch(patch, Utc::now())?;
        self.store.put_product(product.clone())?;
        Ok(product)
    }

    pub fn product(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.store
            .get_product(id)?
            .ok_or(CatalogError::ProductNotFound(id))
    }

    /// Products sorted by name; inactive ones only on request.
    pub fn products(&self, include_inactive: bool) -> Result<Vec<Product>, CatalogError> {
        let mut products: Vec<_> = self
            .store
            .list_products()?
            .into_iter()
            .filter(|p| include_inactive || p.is_active)
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.sku.cmp(&b.sku)));
        Ok(products)
    }

    pub fn create_location(&self, input: NewLocation) -> Result<Location, CatalogError> {
        let location = input.into_location(LocationId::new(), Utc::now())?;
        self.store.put_location(location.clone())?;
        info!(location_id = %location.id, name = %location.name, "location created");
        Ok(location)
    }

    pub fn update_location(&self, id: LocationId, patch: LocationPatch) -> Result<Location, CatalogError> {
        let mut location = self.location(id)?;
        location.apply_patch(patch, Utc::now())?;
        self.store.put_location(location.clone())?;
        Ok(location)
    }

    /// Soft delete. Stock and history at the location are kept.
    pub fn deactivate_location(&self, id: LocationId) -> Result<Location, CatalogError> {
        let mut location = self.location(id)?;
        location.deactivate(Utc::now());
        self.store.put_location(location.clone())?;
        info!(location_id = %id, "location deactivated");
        Ok(location)
    }

    pub fn location(&self, id: LocationId) -> Result<Location, CatalogError> {
        self.store
            .get_location(id)?
            .ok_or(CatalogError::LocationNotFound(id))
    }

    /// Locations sorted by name; inactive ones only on request.
    pub fn locations(&self, include_inactive: bool) -> Result<Vec<Location>, CatalogError> {
        let mut locations: Vec<_> = self
            .store
            .list_locations()?
            .into_iter()
            .filter(|l| include_inactive || l.is_active)
            .collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    /// Create each configured default location missing by (name, type)
    /// among the active ones. A deactivated default is created afresh.
    /// Returns only the locations created by this call.
    pub fn ensure_default_locations(&self) -> Result<Vec<Location>, CatalogError> {
        let existing = self.locations(false)?;
        let mut created = Vec::new();

        for default in &self.default_locations {
            let present = existing
                .iter()
                .any(|l| l.name == default.name && l.location_type == default.location_type);
            if !present {
                created.push(self.create_location(default.to_new_location())?);
            }
        }
        Ok(created)
    }

    /// Where a user's purchases and consumptions go by default: the active
    /// location they are responsible for (vehicles first), otherwise the
    /// first active location by name.
    pub fn default_location_for(&self, user: UserId) -> Result<Option<Location>, CatalogError> {
        let locations = self.locations(false)?;

        let assigned = locations
            .iter()
            .filter(|l| l.responsible_user_id == Some(user))
            .min_by_key(|l| l.location_type != LocationType::Vehiculo);

        Ok(assigned.or(locations.first()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use stockledger_inventory::Quantity;

    use super::*;
    use crate::store::InMemoryLedgerStore;

    fn catalog() -> Catalog<InMemoryLedgerStore> {
        Catalog::new(InMemoryLedgerStore::new())
    }

    #[test]
    fn duplicate_sku_is_rejected_case_insensitively() {
        let c = catalog();
        c.create_product(NewProduct::new("CU-38", "Tubo cobre 3/8", Quantity::from(5)))
            .unwrap();
        let err = c
            .create_product(NewProduct::new(" cu-38 ", "Otro tubo", Quantity::ZERO))
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateSku(s) if s == "cu-38"));
    }

    #[test]
    fn update_keeps_own_sku_and_checks_others() {
        let c = catalog();
        let a = c
            .create_product(NewProduct::new("A-1", "Filtro", Quantity::ZERO))
            .unwrap();
        c.create_product(NewProduct::new("B-1", "Capacitor", Quantity::ZERO))
            .unwrap();

        let same = ProductPatch {
            sku: Some("A-1".to_string()),
            min_stock: Some(Quantity::from(2)),
            ..Default::default()
        };
        assert_eq!(c.update_product(a.id, same).unwrap().min_stock, Quantity::from(2));

        let clash = ProductPatch {
            sku: Some("B-1".to_string()),
            ..Default::default()
        };
        assert!(matches!(c.update_product(a.id, clash), Err(CatalogError::DuplicateSku(_))));
    }

    #[test]
    fn listing_hides_inactive_products_by_default() {
        let c = catalog();
        let p = c
            .create_product(NewProduct::new("X-1", "Termostato", Quantity::ZERO))
            .unwrap();
        c.update_product(
            p.id,
            ProductPatch {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(c.products(false).unwrap().is_empty());
        assert_eq!(c.products(true).unwrap().len(), 1);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let c = catalog();
        assert!(matches!(c.product(ProductId::new()), Err(CatalogError::ProductNotFound(_))));
        assert!(matches!(
            c.deactivate_location(LocationId::new()),
            Err(CatalogError::LocationNotFound(_))
        ));
    }

    #[test]
    fn default_locations_are_seeded_once() {
        let c = catalog();
        assert_eq!(c.ensure_default_locations().unwrap().len(), 3);
        assert!(c.ensure_default_locations().unwrap().is_empty());

        let names: Vec<_> = c.locations(false).unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Almacén Principal", "Camioneta 1", "Camioneta 2"]);
    }

    #[test]
    fn deactivated_default_location_is_recreated() {
        let c = catalog();
        let seeded = c.ensure_default_locations().unwrap();
        let warehouse = seeded
            .iter()
            .find(|l| l.location_type == LocationType::Almacen)
            .unwrap();
        c.deactivate_location(warehouse.id).unwrap();

        let recreated = c.ensure_default_locations().unwrap();
        assert_eq!(recreated.len(), 1);
        assert_eq!(recreated[0].name, warehouse.name);
        assert_ne!(recreated[0].id, warehouse.id);
        assert!(recreated[0].is_active);
        assert_eq!(c.locations(true).unwrap().len(), 4);
        assert_eq!(c.locations(false).unwrap().len(), 3);
    }

    #[test]
    fn deactivated_locations_leave_active_listing() {
        let c = catalog();
        let loc = c
            .create_location(NewLocation::new("Obra Norte", LocationType::Obra))
            .unwrap();
        c.deactivate_location(loc.id).unwrap();

        assert!(c.locations(false).unwrap().is_empty());
        assert!(!c.location(loc.id).unwrap().is_active);
    }

    #[test]
    fn default_location_prefers_the_users_vehicle() {
        let c = catalog();
        let tech = UserId::new();
        c.ensure_default_locations().unwrap();
        let van = c
            .create_location(NewLocation::new("Camioneta 3", LocationType::Vehiculo).responsible(tech))
            .unwrap();

        assert_eq!(c.default_location_for(tech).unwrap().unwrap().id, van.id);

        let other = c.default_location_for(UserId::new()).unwrap().unwrap();
        assert_eq!(other.name, "Almacén Principal");
    }
}
