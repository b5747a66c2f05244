use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use stockledger_core::{
    Entity, ExpectedVersion, LocationId, MovementId, PendingProductId, ProductId, Versioned,
};
use stockledger_inventory::{
    Alert, AlertStatus, Location, Movement, PendingProduct, PendingStatus, Product, StockKey,
    StockRecord,
};

use super::snapshot::LedgerSnapshot;
use super::r#trait::{
    CatalogStore, CommitBatch, DocumentRef, LedgerStore, MovementQuery, PendingProductStore,
    StoreError,
};

#[derive(Debug, Default)]
struct LedgerState {
    stock: HashMap<StockKey, Versioned<StockRecord>>,
    alerts: HashMap<StockKey, Versioned<Alert>>,
    /// Commit order; newest last.
    journal: Vec<Movement>,
    journaled: HashSet<MovementId>,
    products: HashMap<ProductId, Product>,
    locations: HashMap<LocationId, Location>,
    pending: HashMap<PendingProductId, PendingProduct>,
}

impl LedgerState {
    fn version_of(&self, document: DocumentRef) -> u64 {
        match document {
            DocumentRef::Stock(key) => self.stock.get(&key).map(|v| v.version).unwrap_or(0),
            DocumentRef::Alert(key) => self.alerts.get(&key).map(|v| v.version).unwrap_or(0),
        }
    }

    fn check(&self, document: DocumentRef, expected: ExpectedVersion) -> Result<(), StoreError> {
        let actual = self.version_of(document);
        if expected.matches(actual) {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "{document} changed (expected {expected:?}, found {actual})"
            )))
        }
    }
}

/// In-memory ledger store.
///
/// One lock guards every collection, so a commit is trivially atomic and
/// serializable. Intended for tests, the CLI (together with
/// [`LedgerSnapshot`] persistence) and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

fn index<E: Entity>(items: Vec<E>) -> HashMap<E::Id, E> {
    items.into_iter().map(|item| (item.id(), item)).collect()
}

fn versioned_index<E: Entity>(items: Vec<Versioned<E>>) -> HashMap<E::Id, Versioned<E>> {
    items.into_iter().map(|v| (v.value.id(), v)).collect()
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a persisted snapshot.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, StoreError> {
        let mut journaled = HashSet::with_capacity(snapshot.movements.len());
        for m in &snapshot.movements {
            if !journaled.insert(m.id) {
                return Err(StoreError::DuplicateKey(format!(
                    "snapshot journal contains movement {} twice",
                    m.id
                )));
            }
        }

        let state = LedgerState {
            stock: versioned_index(snapshot.stock),
            alerts: versioned_index(snapshot.alerts),
            journal: snapshot.movements,
            journaled,
            products: index(snapshot.products),
            locations: index(snapshot.locations),
            pending: index(snapshot.pending_products),
        };

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Point-in-time copy of every collection.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, StoreError> {
        let state = self.read()?;

        let mut stock: Vec<_> = state.stock.values().cloned().collect();
        stock.sort_by(|a, b| a.value.id.cmp(&b.value.id));
        let mut alerts: Vec<_> = state.alerts.values().cloned().collect();
        alerts.sort_by(|a, b| a.value.id.cmp(&b.value.id));
        let mut products: Vec<_> = state.products.values().cloned().collect();
        products.sort_by_key(|p| p.id);
        let mut locations: Vec<_> = state.locations.values().cloned().collect();
        locations.sort_by_key(|l| l.id);
        let mut pending_products: Vec<_> = state.pending.values().cloned().collect();
        pending_products.sort_by_key(|p| p.id);

        Ok(LedgerSnapshot {
            products,
            locations,
            stock,
            alerts,
            movements: state.journal.clone(),
            pending_products,
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn get_stock(&self, key: &StockKey) -> Result<Option<Versioned<StockRecord>>, StoreError> {
        Ok(self.read()?.stock.get(key).cloned())
    }

    fn get_alert(&self, key: &StockKey) -> Result<Option<Versioned<Alert>>, StoreError> {
        Ok(self.read()?.alerts.get(key).cloned())
    }

    fn commit(&self, batch: CommitBatch) -> Result<(), StoreError> {
        let mut state = self.write()?;

        if state.journaled.contains(&batch.movement.id) {
            return Err(StoreError::DuplicateKey(format!(
                "movement {} already journaled",
                batch.movement.id
            )));
        }

        // Validate everything before touching anything.
        for read in &batch.reads {
            state.check(read.document, read.expected)?;
        }
        for write in &batch.stock {
            state.check(DocumentRef::Stock(write.value.key()), write.expected)?;
        }
        for write in &batch.alerts {
            state.check(DocumentRef::Alert(write.value.key()), write.expected)?;
        }

        for write in batch.stock {
            let key = write.value.key();
            let next = state.version_of(DocumentRef::Stock(key)) + 1;
            state.stock.insert(key, Versioned::new(write.value, next));
        }
        for write in batch.alerts {
            let key = write.value.key();
            let next = state.version_of(DocumentRef::Alert(key)) + 1;
            state.alerts.insert(key, Versioned::new(write.value, next));
        }

        state.journaled.insert(batch.movement.id);
        state.journal.push(batch.movement);

        Ok(())
    }

    fn stock_by_product(&self, product_id: ProductId) -> Result<Vec<StockRecord>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<_> = state
            .stock
            .values()
            .filter(|v| v.value.product_id == product_id)
            .map(|v| v.value.clone())
            .collect();
        out.sort_by_key(|r| r.location_id);
        Ok(out)
    }

    fn stock_by_location(&self, location_id: LocationId) -> Result<Vec<StockRecord>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<_> = state
            .stock
            .values()
            .filter(|v| v.value.location_id == location_id)
            .map(|v| v.value.clone())
            .collect();
        out.sort_by_key(|r| r.product_id);
        Ok(out)
    }

    fn all_stock(&self) -> Result<Vec<StockRecord>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<_> = state.stock.values().map(|v| v.value.clone()).collect();
        out.sort_by_key(|r| r.key());
        Ok(out)
    }

    fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        let state = self.read()?;
        Ok(state.journal.iter().rev().find(|m| m.id == id).cloned())
    }

    fn movements(&self, query: &MovementQuery) -> Result<Vec<Movement>, StoreError> {
        let state = self.read()?;
        let matching = state.journal.iter().rev().filter(|m| query.matches(m)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    fn alerts(&self, status: Option<AlertStatus>) -> Result<Vec<Alert>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<_> = state
            .alerts
            .values()
            .map(|v| &v.value)
            .filter(|a| status.is_none_or(|s| a.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}

impl CatalogStore for InMemoryLedgerStore {
    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    fn put_product(&self, product: Product) -> Result<(), StoreError> {
        self.write()?.products.insert(product.id(), product);
        Ok(())
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.read()?.products.values().cloned().collect())
    }

    fn get_location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        Ok(self.read()?.locations.get(&id).cloned())
    }

    fn put_location(&self, location: Location) -> Result<(), StoreError> {
        self.write()?.locations.insert(location.id(), location);
        Ok(())
    }

    fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        Ok(self.read()?.locations.values().cloned().collect())
    }
}

impl PendingProductStore for InMemoryLedgerStore {
    fn get_pending(&self, id: PendingProductId) -> Result<Option<PendingProduct>, StoreError> {
        Ok(self.read()?.pending.get(&id).cloned())
    }

    fn put_pending(&self, pending: PendingProduct) -> Result<(), StoreError> {
        self.write()?.pending.insert(pending.id(), pending);
        Ok(())
    }

    fn transition_pending(
        &self,
        next: PendingProduct,
        expected: PendingStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let stored = state
            .pending
            .get_mut(&next.id())
            .ok_or_else(|| StoreError::Conflict(format!("pending product {} not found", next.id)))?;
        if stored.status != expected {
            return Err(StoreError::Conflict(format!(
                "pending product {} is {:?}, expected {:?}",
                next.id, stored.status, expected
            )));
        }
        *stored = next;
        Ok(())
    }

    fn list_pending(&self) -> Result<Vec<PendingProduct>, StoreError> {
        Ok(self.read()?.pending.values().cloned().collect())
    }
}
