//! Optimistic read-set / write-set transaction over a [`LedgerStore`].
//!
//! Every document read records the version it was read at. Staged writes are
//! buffered locally and reads of a staged document return the staged value.
//! Nothing reaches the store until [`LedgerTransaction::commit`], which hands
//! the store a single [`CommitBatch`]; the store rejects it if any recorded
//! version moved in the meantime.

use std::collections::BTreeMap;

use stockledger_core::{ExpectedVersion, Versioned};
use stockledger_inventory::{Alert, Movement, StockKey, StockRecord};

use super::r#trait::{CommitBatch, DocumentRef, LedgerStore, ReadCheck, StagedWrite, StoreError};

#[derive(Debug)]
struct Slot<T> {
    /// Version observed on first read (0 when absent).
    read_version: u64,
    current: Option<T>,
    dirty: bool,
}

impl<T: Clone> Slot<T> {
    fn observed(doc: Option<Versioned<T>>) -> Self {
        match doc {
            Some(v) => Self {
                read_version: v.version,
                current: Some(v.value),
                dirty: false,
            },
            None => Self {
                read_version: 0,
                current: None,
                dirty: false,
            },
        }
    }

    fn expected(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.read_version)
    }
}

pub struct LedgerTransaction<'s, S: LedgerStore + ?Sized> {
    store: &'s S,
    stock: BTreeMap<StockKey, Slot<StockRecord>>,
    alerts: BTreeMap<StockKey, Slot<Alert>>,
}

impl<'s, S: LedgerStore + ?Sized> LedgerTransaction<'s, S> {
    pub fn begin(store: &'s S) -> Self {
        Self {
            store,
            stock: BTreeMap::new(),
            alerts: BTreeMap::new(),
        }
    }

    fn stock_slot(&mut self, key: StockKey) -> Result<&mut Slot<StockRecord>, StoreError> {
        if !self.stock.contains_key(&key) {
            let doc = self.store.get_stock(&key)?;
            self.stock.insert(key, Slot::observed(doc));
        }
        self.stock
            .get_mut(&key)
            .ok_or_else(|| StoreError::Backend(format!("transaction lost read of {key}")))
    }

    fn alert_slot(&mut self, key: StockKey) -> Result<&mut Slot<Alert>, StoreError> {
        if !self.alerts.contains_key(&key) {
            let doc = self.store.get_alert(&key)?;
            self.alerts.insert(key, Slot::observed(doc));
        }
        self.alerts
            .get_mut(&key)
            .ok_or_else(|| StoreError::Backend(format!("transaction lost read of alert {key}")))
    }

    /// Read the stock record for `key` within this transaction.
    pub fn stock(&mut self, key: &StockKey) -> Result<Option<StockRecord>, StoreError> {
        Ok(self.stock_slot(*key)?.current.clone())
    }

    pub fn stage_stock(&mut self, record: StockRecord) -> Result<(), StoreError> {
        let slot = self.stock_slot(record.key())?;
        slot.current = Some(record);
        slot.dirty = true;
        Ok(())
    }

    /// Read the alert for `key` within this transaction.
    pub fn alert(&mut self, key: &StockKey) -> Result<Option<Alert>, StoreError> {
        Ok(self.alert_slot(*key)?.current.clone())
    }

    pub fn stage_alert(&mut self, alert: Alert) -> Result<(), StoreError> {
        let slot = self.alert_slot(alert.key())?;
        slot.current = Some(alert);
        slot.dirty = true;
        Ok(())
    }

    /// Freeze the read and write sets into a batch journaling `movement`.
    pub fn into_batch(self, movement: Movement) -> CommitBatch {
        let mut batch = CommitBatch {
            reads: Vec::new(),
            stock: Vec::new(),
            alerts: Vec::new(),
            movement,
        };

        for (key, slot) in self.stock {
            let expected = slot.expected();
            match (slot.dirty, slot.current) {
                (true, Some(value)) => batch.stock.push(StagedWrite { expected, value }),
                _ => batch.reads.push(ReadCheck {
                    document: DocumentRef::Stock(key),
                    expected,
                }),
            }
        }
        for (key, slot) in self.alerts {
            let expected = slot.expected();
            match (slot.dirty, slot.current) {
                (true, Some(value)) => batch.alerts.push(StagedWrite { expected, value }),
                _ => batch.reads.push(ReadCheck {
                    document: DocumentRef::Alert(key),
                    expected,
                }),
            }
        }

        batch
    }

    pub fn commit(self, movement: Movement) -> Result<(), StoreError> {
        let store = self.store;
        store.commit(self.into_batch(movement))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use stockledger_core::{LocationId, MovementId, ProductId, UserId};
    use stockledger_inventory::{MovementRequest, Quantity};

    use super::*;
    use crate::store::InMemoryLedgerStore;

    fn entrada(key: StockKey) -> Movement {
        let req = MovementRequest::entrada(key.product_id, key.location_id, dec!(3), "Compra", UserId::new());
        let qty = req.validate().unwrap();
        Movement::record(MovementId::new(), req, qty, Utc::now())
    }

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), LocationId::new())
    }

    #[test]
    fn staged_writes_are_visible_inside_the_transaction_only() {
        let store = InMemoryLedgerStore::new();
        let k = key();

        let mut tx = LedgerTransaction::begin(&store);
        assert!(tx.stock(&k).unwrap().is_none());
        tx.stage_stock(StockRecord::empty(k, Utc::now()).with_quantity(Quantity::from(3), Utc::now()))
            .unwrap();

        assert_eq!(tx.stock(&k).unwrap().unwrap().quantity, Quantity::from(3));
        assert!(store.get_stock(&k).unwrap().is_none());

        tx.commit(entrada(k)).unwrap();
        assert_eq!(store.get_stock(&k).unwrap().unwrap().value.quantity, Quantity::from(3));
    }

    #[test]
    fn untouched_reads_become_read_checks() {
        let store = InMemoryLedgerStore::new();
        let read_only = key();
        let written = key();

        let mut tx = LedgerTransaction::begin(&store);
        tx.stock(&read_only).unwrap();
        tx.alert(&written).unwrap();
        tx.stage_stock(StockRecord::empty(written, Utc::now())).unwrap();

        let batch = tx.into_batch(entrada(written));
        assert_eq!(batch.stock.len(), 1);
        assert_eq!(batch.stock[0].expected, ExpectedVersion::absent());
        assert_eq!(batch.reads.len(), 2);
        assert!(batch.reads.contains(&ReadCheck {
            document: DocumentRef::Stock(read_only),
            expected: ExpectedVersion::absent(),
        }));
    }

    #[test]
    fn concurrent_writer_invalidates_the_transaction() {
        let store = InMemoryLedgerStore::new();
        let k = key();

        let mut slow = LedgerTransaction::begin(&store);
        slow.stock(&k).unwrap();

        let mut fast = LedgerTransaction::begin(&store);
        fast.stage_stock(StockRecord::empty(k, Utc::now()).with_quantity(Quantity::from(1), Utc::now()))
            .unwrap();
        fast.commit(entrada(k)).unwrap();

        slow.stage_stock(StockRecord::empty(k, Utc::now()).with_quantity(Quantity::from(9), Utc::now()))
            .unwrap();
        let err = slow.commit(entrada(k)).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get_stock(&k).unwrap().unwrap().value.quantity, Quantity::from(1));
    }
}
