//! Read side of the ledger: balances, history, alerts and reconciliation.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use stockledger_core::{LocationId, ProductId};
use stockledger_inventory::{
    Alert, AlertStatus, AlertType, Movement, Quantity, StockKey, StockRecord,
};

use crate::store::{CatalogStore, LedgerStore, MovementQuery, StoreError};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

pub struct LedgerQueries<S> {
    store: S,
    history_limit: usize,
}

impl<S: LedgerStore> LedgerQueries<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Balance of one pair; zero when no record exists yet.
    pub fn quantity(&self, key: &StockKey) -> Result<Quantity, StoreError> {
        Ok(self
            .store
            .get_stock(key)?
            .map_or(Quantity::ZERO, |v| v.value.quantity))
    }

    pub fn stock(&self, key: &StockKey) -> Result<Option<StockRecord>, StoreError> {
        Ok(self.store.get_stock(key)?.map(|v| v.into_value()))
    }

    pub fn stock_by_product(&self, product_id: ProductId) -> Result<Vec<StockRecord>, StoreError> {
        self.store.stock_by_product(product_id)
    }

    pub fn stock_by_location(&self, location_id: LocationId) -> Result<Vec<StockRecord>, StoreError> {
        self.store.stock_by_location(location_id)
    }

    /// Sum of a product's balances across every location.
    pub fn total_on_hand(&self, product_id: ProductId) -> Result<Quantity, StoreError> {
        let total: Decimal = self
            .stock_by_product(product_id)?
            .iter()
            .map(|r| r.quantity.value())
            .sum();
        Quantity::new(total).map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// Newest first. `limit` falls back to the configured history limit.
    pub fn movements(
        &self,
        product_id: Option<ProductId>,
        limit: Option<usize>,
    ) -> Result<Vec<Movement>, StoreError> {
        let query = MovementQuery {
            product_id,
            limit: Some(limit.unwrap_or(self.history_limit)),
            ..Default::default()
        };
        self.store.movements(&query)
    }

    /// Movements consumed on (or purchased for) a ticket, newest first.
    pub fn movements_for_ticket(&self, ticket_id: &str) -> Result<Vec<Movement>, StoreError> {
        self.store.movements(&MovementQuery {
            ticket_id: Some(ticket_id.to_string()),
            ..Default::default()
        })
    }

    pub fn active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        self.store.alerts(Some(AlertStatus::Active))
    }
}

impl<S: LedgerStore + CatalogStore> LedgerQueries<S> {
    /// Replay the whole journal and compare with the stored balances and alerts.
    pub fn reconcile(&self) -> Result<ReconciliationReport, StoreError> {
        let journal = self.store.movements(&MovementQuery::default())?;

        let mut expected: BTreeMap<StockKey, Decimal> = BTreeMap::new();
        // Journal comes newest first; balances must be replayed oldest first.
        let mut negative_balances = Vec::new();
        for movement in journal.iter().rev() {
            for location_id in movement.kind.locations() {
                let key = StockKey::new(movement.product_id, location_id);
                let balance = expected.entry(key).or_default();
                *balance += movement.effect_on(&key);
                if *balance < Decimal::ZERO {
                    negative_balances.push(NegativeBalance {
                        key,
                        movement_id: movement.id.to_string(),
                        balance: *balance,
                    });
                }
            }
        }

        let records = self.store.all_stock()?;
        let mut discrepancies = Vec::new();
        for record in &records {
            let key = record.key();
            let replayed = expected.remove(&key).unwrap_or_default();
            if replayed != record.quantity.value() {
                discrepancies.push(Discrepancy {
                    key,
                    recorded: Some(record.quantity.value()),
                    replayed,
                });
            }
        }
        // Balances the journal implies but no record holds.
        for (key, replayed) in expected {
            if !replayed.is_zero() {
                discrepancies.push(Discrepancy {
                    key,
                    recorded: None,
                    replayed,
                });
            }
        }

        let alert_mismatches = self.check_alerts(&records)?;

        let report = ReconciliationReport {
            movements_checked: journal.len(),
            records_checked: records.len(),
            discrepancies,
            negative_balances,
            alert_mismatches,
        };
        if !report.is_consistent() {
            warn!(
                discrepancies = report.discrepancies.len(),
                negative_balances = report.negative_balances.len(),
                alert_mismatches = report.alert_mismatches.len(),
                "ledger is inconsistent"
            );
        }
        Ok(report)
    }

    /// Every stored pair must carry an ACTIVE alert exactly when its balance
    /// is at or below the product threshold, typed OUT_OF_STOCK exactly at zero.
    fn check_alerts(&self, records: &[StockRecord]) -> Result<Vec<AlertMismatch>, StoreError> {
        let mut alerts: BTreeMap<StockKey, Alert> = self
            .store
            .alerts(None)?
            .into_iter()
            .map(|a| (a.key(), a))
            .collect();
        let mut thresholds: BTreeMap<ProductId, Quantity> = BTreeMap::new();
        let mut mismatches = Vec::new();

        for record in records {
            let key = record.key();
            let threshold = match thresholds.get(&key.product_id) {
                Some(t) => *t,
                None => {
                    // Unknown products alert at zero, as the registrar does.
                    let t = self
                        .store
                        .get_product(key.product_id)?
                        .map_or(Quantity::ZERO, |p| p.threshold());
                    thresholds.insert(key.product_id, t);
                    t
                }
            };
            let alert = alerts.remove(&key).filter(Alert::is_active);
            let issue = match (&alert, record.quantity <= threshold) {
                (None, true) => Some(AlertIssue::Missing),
                (None, false) => None,
                (Some(_), false) => Some(AlertIssue::AboveThreshold),
                (Some(a), true) if a.current_qty != record.quantity => Some(AlertIssue::StaleQuantity),
                (Some(a), true) if a.alert_type != AlertType::for_quantity(record.quantity) => {
                    Some(AlertIssue::WrongType)
                }
                (Some(_), true) => None,
            };
            if let Some(issue) = issue {
                mismatches.push(AlertMismatch {
                    key,
                    issue,
                    alert_qty: alert.map(|a| a.current_qty.value()),
                    stock_qty: record.quantity.value(),
                    threshold: threshold.value(),
                });
            }
        }

        // Active alerts for pairs that have no stock record at all.
        for (key, alert) in alerts {
            if alert.is_active() {
                mismatches.push(AlertMismatch {
                    key,
                    issue: AlertIssue::StaleQuantity,
                    alert_qty: Some(alert.current_qty.value()),
                    stock_qty: Decimal::ZERO,
                    threshold: alert.threshold.value(),
                });
            }
        }
        Ok(mismatches)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub key: StockKey,
    /// `None` when the journal implies a balance but no record exists.
    pub recorded: Option<Decimal>,
    pub replayed: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegativeBalance {
    pub key: StockKey,
    pub movement_id: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMismatch {
    pub key: StockKey,
    pub issue: AlertIssue,
    /// `None` when no active alert exists for the pair.
    pub alert_qty: Option<Decimal>,
    pub stock_qty: Decimal,
    pub threshold: Decimal,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertIssue {
    /// Balance is at or below the threshold but no alert is active.
    Missing,
    /// An alert is active although the balance is above the threshold.
    AboveThreshold,
    /// The active alert records a different balance.
    StaleQuantity,
    /// LOW_STOCK at zero, or OUT_OF_STOCK above zero.
    WrongType,
}

impl core::fmt::Display for AlertIssue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            AlertIssue::Missing => "missing alert",
            AlertIssue::AboveThreshold => "active above threshold",
            AlertIssue::StaleQuantity => "stale quantity",
            AlertIssue::WrongType => "wrong alert type",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub movements_checked: usize,
    pub records_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
    pub negative_balances: Vec<NegativeBalance>,
    pub alert_mismatches: Vec<AlertMismatch>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
            && self.negative_balances.is_empty()
            && self.alert_mismatches.is_empty()
    }
}
