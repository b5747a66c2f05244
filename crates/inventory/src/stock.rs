use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Entity, LocationId, ProductId};

use crate::quantity::Quantity;

/// Ledger key: one stock balance per (product, location) pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
}

impl StockKey {
    pub fn new(product_id: ProductId, location_id: LocationId) -> Self {
        Self {
            product_id,
            location_id,
        }
    }

    /// Document id of the stock record: `<productId>_<locationId>`.
    pub fn record_id(&self) -> String {
        format!("{}_{}", self.product_id, self.location_id)
    }

    /// Document id of the alert for this pair: `alert_<productId>_<locationId>`.
    pub fn alert_id(&self) -> String {
        format!("alert_{}_{}", self.product_id, self.location_id)
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.location_id)
    }
}

/// Current-balance projection for one (product, location) pair.
///
/// Created lazily on the first incoming movement and never deleted; the
/// balance may settle at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRecord {
    pub id: String,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: Quantity,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// A fresh, empty balance for `key`.
    pub fn empty(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            id: key.record_id(),
            product_id: key.product_id,
            location_id: key.location_id,
            quantity: Quantity::ZERO,
            updated_at: now,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    /// Copy of this record carrying a new balance.
    pub fn with_quantity(&self, quantity: Quantity, now: DateTime<Utc>) -> Self {
        Self {
            quantity,
            updated_at: now,
            ..self.clone()
        }
    }
}

impl Entity for StockRecord {
    type Id = StockKey;

    fn id(&self) -> Self::Id {
        self.key()
    }
}
