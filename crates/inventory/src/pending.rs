use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, LocationId, PendingProductId, ProductId, UserId};

use crate::quantity::Quantity;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingStatus {
    Pending,
    Approved,
    Rejected,
}

/// A purchased line that did not match any catalog product.
///
/// It keeps enough to register the entry retroactively once an admin picks
/// the matching product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingProduct {
    pub id: PendingProductId,
    pub detected_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_price: Option<Decimal>,
    pub quantity: Quantity,
    pub target_location_id: LocationId,
    pub ticket_id: String,
    pub purchase_id: String,
    pub status: PendingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_product_id: Option<ProductId>,
    pub created_by_user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl PendingProduct {
    pub fn is_pending(&self) -> bool {
        self.status == PendingStatus::Pending
    }

    fn ensure_pending(&self) -> DomainResult<()> {
        if !self.is_pending() {
            return Err(DomainError::conflict(format!(
                "pending product {} already resolved as {:?}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn approve(&mut self, product_id: ProductId) -> DomainResult<()> {
        self.ensure_pending()?;
        self.status = PendingStatus::Approved;
        self.resolved_product_id = Some(product_id);
        Ok(())
    }

    pub fn reject(&mut self) -> DomainResult<()> {
        self.ensure_pending()?;
        self.status = PendingStatus::Rejected;
        Ok(())
    }
}

impl Entity for PendingProduct {
    type Id = PendingProductId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPendingProduct {
    pub detected_name: String,
    pub provider_name: Option<String>,
    pub suggested_unit: Option<String>,
    pub detected_price: Option<Decimal>,
    pub quantity: Quantity,
    pub target_location_id: LocationId,
    pub ticket_id: String,
    pub purchase_id: String,
    pub created_by_user_id: UserId,
}

impl NewPendingProduct {
    pub fn into_pending(self, id: PendingProductId, now: DateTime<Utc>) -> DomainResult<PendingProduct> {
        if self.detected_name.trim().is_empty() {
            return Err(DomainError::validation("detected name cannot be empty"));
        }
        if self.quantity.is_zero() {
            return Err(DomainError::validation("pending quantity must be greater than zero"));
        }
        Ok(PendingProduct {
            id,
            detected_name: self.detected_name,
            provider_name: self.provider_name,
            suggested_unit: self.suggested_unit,
            detected_price: self.detected_price,
            quantity: self.quantity,
            target_location_id: self.target_location_id,
            ticket_id: self.ticket_id,
            purchase_id: self.purchase_id,
            status: PendingStatus::Pending,
            resolved_product_id: None,
            created_by_user_id: self.created_by_user_id,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingProduct {
        NewPendingProduct {
            detected_name: "Tubo cobre 3/8".to_string(),
            provider_name: Some("Ferretería Central".to_string()),
            suggested_unit: Some("UND".to_string()),
            detected_price: None,
            quantity: Quantity::from(4),
            target_location_id: LocationId::new(),
            ticket_id: "T-7".to_string(),
            purchase_id: "P-1".to_string(),
            created_by_user_id: UserId::new(),
        }
        .into_pending(PendingProductId::new(), Utc::now())
        .unwrap()
    }

    #[test]
    fn approve_records_resolved_product() {
        let mut p = pending();
        let product = ProductId::new();
        p.approve(product).unwrap();
        assert_eq!(p.status, PendingStatus::Approved);
        assert_eq!(p.resolved_product_id, Some(product));
    }

    #[test]
    fn resolved_items_cannot_be_resolved_again() {
        let mut p = pending();
        p.reject().unwrap();
        assert!(matches!(p.approve(ProductId::new()), Err(DomainError::Conflict(_))));
        assert!(matches!(p.reject(), Err(DomainError::Conflict(_))));
    }
}
