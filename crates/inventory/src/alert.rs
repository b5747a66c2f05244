//! Low-stock alert state, derived from post-mutation balances.
//!
//! There is at most one alert document per (product, location) pair. Its id is
//! stable, so an alert that was resolved is reactivated in place when the
//! balance drops again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Entity, LocationId, ProductId};

use crate::quantity::Quantity;
use crate::stock::StockKey;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    LowStock,
    OutOfStock,
}

impl AlertType {
    /// OUT_OF_STOCK exactly when the balance is zero.
    pub fn for_quantity(quantity: Quantity) -> Self {
        if quantity.is_zero() {
            AlertType::OutOfStock
        } else {
            AlertType::LowStock
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub product_id: ProductId,
    pub location_id: LocationId,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub status: AlertStatus,
    pub current_qty: Quantity,
    pub threshold: Quantity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

impl Entity for Alert {
    type Id = StockKey;

    fn id(&self) -> Self::Id {
        self.key()
    }
}

/// Next alert state for a pair after a balance change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    /// Raise a new alert, or reactivate a resolved one.
    Create(Alert),
    /// Refresh an alert that is already active.
    Update(Alert),
    /// The balance recovered above the threshold.
    Resolve(Alert),
    Noop,
}

impl AlertDecision {
    /// The alert document to write, if any.
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            AlertDecision::Create(a) | AlertDecision::Update(a) | AlertDecision::Resolve(a) => {
                Some(a)
            }
            AlertDecision::Noop => None,
        }
    }

    pub fn into_alert(self) -> Option<Alert> {
        match self {
            AlertDecision::Create(a) | AlertDecision::Update(a) | AlertDecision::Resolve(a) => {
                Some(a)
            }
            AlertDecision::Noop => None,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, AlertDecision::Noop)
    }
}

/// Decide the alert state for `key` given its new balance.
///
/// Deterministic and side-effect free. A balance equal to the threshold is a
/// breach.
pub fn evaluate_alert(
    key: StockKey,
    new_qty: Quantity,
    threshold: Quantity,
    existing: Option<&Alert>,
    now: DateTime<Utc>,
) -> AlertDecision {
    let breached = new_qty <= threshold;
    let active = existing.filter(|a| a.is_active());

    match (breached, active) {
        (true, Some(current)) => AlertDecision::Update(Alert {
            alert_type: AlertType::for_quantity(new_qty),
            current_qty: new_qty,
            threshold,
            updated_at: now,
            ..current.clone()
        }),
        (true, None) => AlertDecision::Create(Alert {
            id: key.alert_id(),
            product_id: key.product_id,
            location_id: key.location_id,
            alert_type: AlertType::for_quantity(new_qty),
            status: AlertStatus::Active,
            current_qty: new_qty,
            threshold,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }),
        (false, Some(current)) => AlertDecision::Resolve(Alert {
            status: AlertStatus::Resolved,
            current_qty: new_qty,
            threshold,
            updated_at: now,
            resolved_at: Some(now),
            ..current.clone()
        }),
        (false, None) => AlertDecision::Noop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), LocationId::new())
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn q(n: u32) -> Quantity {
        Quantity::from(n)
    }

    #[test]
    fn breach_without_alert_creates_low_stock() {
        let k = key();
        let decision = evaluate_alert(k, q(5), q(10), None, t(0));
        match decision {
            AlertDecision::Create(a) => {
                assert_eq!(a.id, k.alert_id());
                assert_eq!(a.status, AlertStatus::Active);
                assert_eq!(a.alert_type, AlertType::LowStock);
                assert_eq!(a.current_qty, q(5));
                assert_eq!(a.threshold, q(10));
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    #[test]
    fn equality_counts_as_breach() {
        let decision = evaluate_alert(key(), q(10), q(10), None, t(0));
        assert!(matches!(decision, AlertDecision::Create(_)));
    }

    #[test]
    fn zero_balance_is_out_of_stock() {
        let decision = evaluate_alert(key(), q(0), q(10), None, t(0));
        assert_eq!(decision.alert().unwrap().alert_type, AlertType::OutOfStock);
    }

    #[test]
    fn zero_threshold_still_flags_empty_stock() {
        let decision = evaluate_alert(key(), q(0), Quantity::ZERO, None, t(0));
        assert_eq!(decision.alert().unwrap().alert_type, AlertType::OutOfStock);
        assert!(evaluate_alert(key(), q(1), Quantity::ZERO, None, t(0)).is_noop());
    }

    #[test]
    fn active_alert_is_refreshed_in_place() {
        let k = key();
        let created = evaluate_alert(k, q(5), q(10), None, t(0)).into_alert().unwrap();
        let decision = evaluate_alert(k, q(0), q(10), Some(&created), t(60));
        match decision {
            AlertDecision::Update(a) => {
                assert_eq!(a.alert_type, AlertType::OutOfStock);
                assert_eq!(a.current_qty, q(0));
                assert_eq!(a.created_at, t(0));
                assert_eq!(a.updated_at, t(60));
            }
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[test]
    fn recovery_resolves_active_alert() {
        let k = key();
        let created = evaluate_alert(k, q(5), q(10), None, t(0)).into_alert().unwrap();
        match evaluate_alert(k, q(25), q(10), Some(&created), t(30)) {
            AlertDecision::Resolve(a) => {
                assert_eq!(a.status, AlertStatus::Resolved);
                assert_eq!(a.resolved_at, Some(t(30)));
                assert_eq!(a.current_qty, q(25));
                assert_eq!(a.id, created.id);
            }
            other => panic!("expected Resolve, got {other:?}"),
        }
    }

    #[test]
    fn healthy_balance_without_active_alert_is_noop() {
        let k = key();
        assert!(evaluate_alert(k, q(50), q(10), None, t(0)).is_noop());

        let created = evaluate_alert(k, q(5), q(10), None, t(0)).into_alert().unwrap();
        let resolved = evaluate_alert(k, q(20), q(10), Some(&created), t(1))
            .into_alert()
            .unwrap();
        assert!(evaluate_alert(k, q(30), q(10), Some(&resolved), t(2)).is_noop());
    }

    #[test]
    fn resolved_alert_is_reactivated_with_same_id() {
        let k = key();
        let created = evaluate_alert(k, q(5), q(10), None, t(0)).into_alert().unwrap();
        let resolved = evaluate_alert(k, q(20), q(10), Some(&created), t(1))
            .into_alert()
            .unwrap();

        match evaluate_alert(k, q(3), q(10), Some(&resolved), t(2)) {
            AlertDecision::Create(a) => {
                assert_eq!(a.id, created.id);
                assert_eq!(a.status, AlertStatus::Active);
                assert_eq!(a.resolved_at, None);
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: after any decision, the written alert is active iff qty <= threshold.
            #[test]
            fn decision_matches_breach(
                qty in 0u32..200,
                threshold in 0u32..200,
                had_alert in any::<bool>(),
            ) {
                let k = key();
                let existing = if had_alert {
                    evaluate_alert(k, q(0), q(0), None, t(0)).into_alert()
                } else {
                    None
                };

                let decision = evaluate_alert(k, q(qty), q(threshold), existing.as_ref(), t(1));
                let breached = qty <= threshold;

                match decision.alert() {
                    Some(a) => {
                        prop_assert_eq!(a.is_active(), breached);
                        if breached {
                            prop_assert_eq!(a.alert_type == AlertType::OutOfStock, qty == 0);
                        }
                    }
                    None => prop_assert!(!breached && existing.is_none()),
                }
            }
        }
    }
}
