//! Purchase receiving and the pending-product queue.
//!
//! Inventory lines of a purchase that were matched to a catalog product enter
//! stock right away as ENTRADA movements. Unmatched lines are parked as
//! pending products until an admin either maps them to a product (which
//! registers the entry retroactively) or rejects them.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use stockledger_core::{DomainError, LocationId, PendingProductId, ProductId, UserId};
use stockledger_events::EventBus;
use stockledger_inventory::{
    ActorType, LedgerEvent, MovementRequest, NewPendingProduct, PendingProduct, PendingStatus,
    Quantity,
};

use crate::registrar::{MovementError, MovementRegistrar, RegisteredMovement};
use crate::store::{CatalogStore, LedgerStore, PendingProductStore, StoreError};

pub const APPROVAL_REASON: &str = "Purchase entry (pending approval)";

#[derive(Debug, Error)]
pub enum ReceivingError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Movement(#[from] MovementError),

    #[error("pending product not found: {0}")]
    PendingNotFound(PendingProductId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLine {
    pub description: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub matched_product_id: Option<ProductId>,
    /// Non-inventory lines (labour, fuel) are ignored.
    #[serde(default = "yes")]
    pub is_inventory: bool,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub purchase_id: String,
    pub ticket_id: String,
    /// Human-facing ticket number; falls back to the ticket id in reasons.
    #[serde(default)]
    pub ticket_number: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
    pub target_location_id: LocationId,
    pub received_by: UserId,
    pub lines: Vec<PurchaseLine>,
}

impl PurchaseReceipt {
    fn entry_reason(&self) -> String {
        format!(
            "Purchase ticket #{}",
            self.ticket_number.as_deref().unwrap_or(&self.ticket_id)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineFailure {
    pub line: usize,
    pub description: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceivingOutcome {
    pub registered: Vec<RegisteredMovement>,
    pub pending: Vec<PendingProduct>,
    /// Lines that could not be processed. Other lines are unaffected.
    pub failures: Vec<LineFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Register the parked quantity as an ENTRADA of `product_id`.
    Approve { product_id: ProductId, approved_by: UserId },
    Reject,
}

pub struct PurchaseReceiving<'r, S, B> {
    registrar: &'r MovementRegistrar<S, B>,
}

impl<'r, S, B> PurchaseReceiving<'r, S, B>
where
    S: LedgerStore + CatalogStore + PendingProductStore,
    B: EventBus<LedgerEvent>,
{
    pub fn new(registrar: &'r MovementRegistrar<S, B>) -> Self {
        Self { registrar }
    }

    /// Process every inventory line of a receipt independently.
    pub fn receive(&self, receipt: &PurchaseReceipt) -> ReceivingOutcome {
        let mut outcome = ReceivingOutcome::default();

        for (index, line) in receipt.lines.iter().enumerate() {
            if !line.is_inventory {
                continue;
            }

            let result = match line.matched_product_id {
                Some(product_id) => self
                    .enter_matched(receipt, line, product_id)
                    .map(|r| outcome.registered.push(r)),
                None => self
                    .park_unmatched(receipt, line)
                    .map(|p| outcome.pending.push(p)),
            };

            if let Err(e) = result {
                warn!(purchase_id = %receipt.purchase_id, line = index, error = %e, "purchase line not received");
                outcome.failures.push(LineFailure {
                    line: index,
                    description: line.description.clone(),
                    error: e.to_string(),
                });
            }
        }

        info!(
            purchase_id = %receipt.purchase_id,
            registered = outcome.registered.len(),
            pending = outcome.pending.len(),
            failed = outcome.failures.len(),
            "purchase received"
        );
        outcome
    }

    fn enter_matched(
        &self,
        receipt: &PurchaseReceipt,
        line: &PurchaseLine,
        product_id: ProductId,
    ) -> Result<RegisteredMovement, ReceivingError> {
        let mut request = MovementRequest::entrada(
            product_id,
            receipt.target_location_id,
            line.quantity,
            receipt.entry_reason(),
            receipt.received_by,
        )
        .with_ticket(receipt.ticket_id.clone())
        .by(ActorType::Technician);
        request.unit_cost = line.unit_price;

        Ok(self.registrar.register_movement(request)?)
    }

    fn park_unmatched(
        &self,
        receipt: &PurchaseReceipt,
        line: &PurchaseLine,
    ) -> Result<PendingProduct, ReceivingError> {
        let pending = NewPendingProduct {
            detected_name: line.description.clone(),
            provider_name: receipt.provider_name.clone(),
            suggested_unit: Some("UND".to_string()),
            detected_price: line.unit_price,
            quantity: Quantity::positive(line.quantity)?,
            target_location_id: receipt.target_location_id,
            ticket_id: receipt.ticket_id.clone(),
            purchase_id: receipt.purchase_id.clone(),
            created_by_user_id: receipt.received_by,
        }
        .into_pending(PendingProductId::new(), Utc::now())?;

        self.registrar.store().put_pending(pending.clone())?;
        Ok(pending)
    }

    /// Unresolved items, newest first.
    pub fn pending_products(&self) -> Result<Vec<PendingProduct>, ReceivingError> {
        let mut items: Vec<_> = self
            .registrar
            .store()
            .list_pending()?
            .into_iter()
            .filter(PendingProduct::is_pending)
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    /// Approve or reject a pending item. An item can be resolved only once.
    ///
    /// The status change is claimed in the store before any stock moves, so
    /// of two concurrent approvals exactly one registers the entry. A failed
    /// registration hands the item back to the queue.
    pub fn resolve(
        &self,
        id: PendingProductId,
        resolution: Resolution,
    ) -> Result<PendingProduct, ReceivingError> {
        let store = self.registrar.store();
        let current = store
            .get_pending(id)?
            .ok_or(ReceivingError::PendingNotFound(id))?;
        let mut resolved = current.clone();

        match resolution {
            Resolution::Reject => {
                resolved.reject()?;
                self.claim(&resolved)?;
            }
            Resolution::Approve {
                product_id,
                approved_by,
            } => {
                resolved.approve(product_id)?;
                self.claim(&resolved)?;

                let mut request = MovementRequest::entrada(
                    product_id,
                    resolved.target_location_id,
                    resolved.quantity.value(),
                    APPROVAL_REASON,
                    approved_by,
                )
                .with_ticket(resolved.ticket_id.clone())
                .by(ActorType::Admin);
                request.unit_cost = resolved.detected_price;

                if let Err(e) = self.registrar.register_movement(request) {
                    if let Err(release) =
                        store.transition_pending(current, PendingStatus::Approved)
                    {
                        error!(pending_id = %id, error = %release, "approval claim not released");
                    }
                    return Err(e.into());
                }
            }
        }

        info!(pending_id = %id, status = ?resolved.status, "pending product resolved");
        Ok(resolved)
    }

    /// Persist a resolution only if the stored item is still pending.
    fn claim(&self, resolved: &PendingProduct) -> Result<(), ReceivingError> {
        self.registrar
            .store()
            .transition_pending(resolved.clone(), PendingStatus::Pending)
            .map_err(|e| match e {
                StoreError::Conflict(msg) => ReceivingError::Domain(DomainError::conflict(msg)),
                other => ReceivingError::Store(other),
            })
    }
}
