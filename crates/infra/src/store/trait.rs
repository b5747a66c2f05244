use std::sync::Arc;

use thiserror::Error;

use stockledger_core::{
    ExpectedVersion, LocationId, MovementId, PendingProductId, ProductId, Versioned,
};
use stockledger_inventory::{
    Alert, AlertStatus, Location, Movement, PendingProduct, PendingStatus, Product, StockKey,
    StockRecord,
};

/// Store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A document read by the transaction changed before commit.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// Insert of a document whose id already exists (journal is write-once).
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The backing storage failed (poisoned lock, I/O, corrupt snapshot).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// A document addressed by the commit protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DocumentRef {
    Stock(StockKey),
    Alert(StockKey),
}

impl core::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DocumentRef::Stock(key) => write!(f, "stock {}", key.record_id()),
            DocumentRef::Alert(key) => write!(f, "alert {}", key.alert_id()),
        }
    }
}

/// A document that was read but not written; its version must still hold at commit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReadCheck {
    pub document: DocumentRef,
    pub expected: ExpectedVersion,
}

/// A write staged by a transaction, guarded by the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedWrite<T> {
    pub expected: ExpectedVersion,
    pub value: T,
}

/// Everything one movement changes, applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBatch {
    pub reads: Vec<ReadCheck>,
    pub stock: Vec<StagedWrite<StockRecord>>,
    pub alerts: Vec<StagedWrite<Alert>>,
    pub movement: Movement,
}

/// Journal query. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementQuery {
    pub product_id: Option<ProductId>,
    pub location_id: Option<LocationId>,
    pub ticket_id: Option<String>,
    /// `None` returns the full history.
    pub limit: Option<usize>,
}

impl MovementQuery {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, movement: &Movement) -> bool {
        if let Some(p) = self.product_id {
            if movement.product_id != p {
                return false;
            }
        }
        if let Some(l) = self.location_id {
            if !movement.kind.locations().contains(&l) {
                return false;
            }
        }
        if let Some(t) = &self.ticket_id {
            if movement.ticket_id.as_deref() != Some(t.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Stock records, alerts and the movement journal.
///
/// Implementations must:
/// - apply a `CommitBatch` atomically (all writes or none)
/// - reject the batch with `StoreError::Conflict` if any read or write
///   expectation does not match the current document version
/// - bump a document's version by one on every committed write
/// - reject a movement whose id is already journaled
/// - never expose a partially applied batch to readers
pub trait LedgerStore: Send + Sync {
    fn get_stock(&self, key: &StockKey) -> Result<Option<Versioned<StockRecord>>, StoreError>;

    fn get_alert(&self, key: &StockKey) -> Result<Option<Versioned<Alert>>, StoreError>;

    fn commit(&self, batch: CommitBatch) -> Result<(), StoreError>;

    fn stock_by_product(&self, product_id: ProductId) -> Result<Vec<StockRecord>, StoreError>;

    fn stock_by_location(&self, location_id: LocationId) -> Result<Vec<StockRecord>, StoreError>;

    fn all_stock(&self) -> Result<Vec<StockRecord>, StoreError>;

    fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError>;

    /// Journal entries matching `query`, newest first.
    fn movements(&self, query: &MovementQuery) -> Result<Vec<Movement>, StoreError>;

    /// Alerts, optionally filtered by status.
    fn alerts(&self, status: Option<AlertStatus>) -> Result<Vec<Alert>, StoreError>;
}

/// Product and location reference data.
pub trait CatalogStore: Send + Sync {
    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    fn put_product(&self, product: Product) -> Result<(), StoreError>;

    fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    fn get_location(&self, id: LocationId) -> Result<Option<Location>, StoreError>;

    fn put_location(&self, location: Location) -> Result<(), StoreError>;

    fn list_locations(&self) -> Result<Vec<Location>, StoreError>;
}

/// Purchase lines waiting for a product match.
pub trait PendingProductStore: Send + Sync {
    fn get_pending(&self, id: PendingProductId) -> Result<Option<PendingProduct>, StoreError>;

    fn put_pending(&self, pending: PendingProduct) -> Result<(), StoreError>;

    /// Replace a stored item only while its status is still `expected`.
    ///
    /// Fails with `StoreError::Conflict` when the item is missing or another
    /// caller already moved it out of `expected`.
    fn transition_pending(
        &self,
        next: PendingProduct,
        expected: PendingStatus,
    ) -> Result<(), StoreError>;

    fn list_pending(&self) -> Result<Vec<PendingProduct>, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn get_stock(&self, key: &StockKey) -> Result<Option<Versioned<StockRecord>>, StoreError> {
        (**self).get_stock(key)
    }

    fn get_alert(&self, key: &StockKey) -> Result<Option<Versioned<Alert>>, StoreError> {
        (**self).get_alert(key)
    }

    fn commit(&self, batch: CommitBatch) -> Result<(), StoreError> {
        (**self).commit(batch)
    }

    fn stock_by_product(&self, product_id: ProductId) -> Result<Vec<StockRecord>, StoreError> {
        (**self).stock_by_product(product_id)
    }

    fn stock_by_location(&self, location_id: LocationId) -> Result<Vec<StockRecord>, StoreError> {
        (**self).stock_by_location(location_id)
    }

    fn all_stock(&self) -> Result<Vec<StockRecord>, StoreError> {
        (**self).all_stock()
    }

    fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        (**self).get_movement(id)
    }

    fn movements(&self, query: &MovementQuery) -> Result<Vec<Movement>, StoreError> {
        (**self).movements(query)
    }

    fn alerts(&self, status: Option<AlertStatus>) -> Result<Vec<Alert>, StoreError> {
        (**self).alerts(status)
    }
}

impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore + ?Sized,
{
    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id)
    }

    fn put_product(&self, product: Product) -> Result<(), StoreError> {
        (**self).put_product(product)
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        (**self).list_products()
    }

    fn get_location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        (**self).get_location(id)
    }

    fn put_location(&self, location: Location) -> Result<(), StoreError> {
        (**self).put_location(location)
    }

    fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        (**self).list_locations()
    }
}

impl<S> PendingProductStore for Arc<S>
where
    S: PendingProductStore + ?Sized,
{
    fn get_pending(&self, id: PendingProductId) -> Result<Option<PendingProduct>, StoreError> {
        (**self).get_pending(id)
    }

    fn put_pending(&self, pending: PendingProduct) -> Result<(), StoreError> {
        (**self).put_pending(pending)
    }

    fn transition_pending(
        &self,
        next: PendingProduct,
        expected: PendingStatus,
    ) -> Result<(), StoreError> {
        (**self).transition_pending(next, expected)
    }

    fn list_pending(&self) -> Result<Vec<PendingProduct>, StoreError> {
        (**self).list_pending()
    }
}
