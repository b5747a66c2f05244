//! Ledger document store boundary.
//!
//! Stock records, alerts and the movement journal live behind [`LedgerStore`];
//! catalog reference data behind [`CatalogStore`]. The only way to change a
//! stock record or an alert is a [`CommitBatch`] built by a
//! [`LedgerTransaction`], which the store applies atomically after checking
//! every recorded read version.

pub mod in_memory;
pub mod snapshot;
pub mod transaction;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use snapshot::LedgerSnapshot;
pub use transaction::LedgerTransaction;
pub use r#trait::{
    CatalogStore, CommitBatch, DocumentRef, LedgerStore, MovementQuery, PendingProductStore,
    ReadCheck, StagedWrite, StoreError,
};
