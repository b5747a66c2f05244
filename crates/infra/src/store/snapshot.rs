//! File persistence for the in-memory store.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use stockledger_core::Versioned;
use stockledger_inventory::{Alert, Location, Movement, PendingProduct, Product, StockRecord};

use super::r#trait::StoreError;

/// Serializable image of every ledger collection.
///
/// Document versions are kept so a restored store keeps rejecting stale
/// writers exactly as before.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub stock: Vec<Versioned<StockRecord>>,
    #[serde(default)]
    pub alerts: Vec<Versioned<Alert>>,
    /// Journal in commit order.
    #[serde(default)]
    pub movements: Vec<Movement>,
    #[serde(default)]
    pub pending_products: Vec<PendingProduct>,
}

impl LedgerSnapshot {
    /// Read a snapshot; a missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(io_error(path, e)),
        };
        serde_json::from_str(&raw)
            .map_err(|e| StoreError::Backend(format!("corrupt snapshot {}: {e}", path.display())))
    }

    /// Write the snapshot through a temp file and rename, so readers never see a torn file.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Backend(format!("serialize snapshot: {e}")))?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| io_error(path, e))
    }
}

fn io_error(path: &Path, e: io::Error) -> StoreError {
    StoreError::Backend(format!("{}: {e}", path.display()))
}
