//! Infrastructure layer: ledger storage, the movement registrar, catalog and
//! purchase services, configuration.

pub mod catalog;
pub mod config;
pub mod queries;
pub mod receiving;
pub mod registrar;
pub mod retry;
pub mod store;


pub use catalog::{Catalog, CatalogError};
pub use config::{DefaultLocation, LedgerConfig, RetrySettings};
pub use queries::{LedgerQueries, ReconciliationReport};
pub use receiving::{
    PurchaseLine, PurchaseReceipt, PurchaseReceiving, ReceivingError, ReceivingOutcome, Resolution,
};
pub use registrar::{MovementError, MovementRegistrar, RegisteredMovement};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use store::{InMemoryLedgerStore, LedgerSnapshot, LedgerStore};
