use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, LocationId, MovementId, ProductId, UserId};

use crate::quantity::Quantity;
use crate::stock::StockKey;

/// The four stock-affecting event kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Entry (purchase, return to warehouse).
    Entrada,
    /// Exit (consumption on a ticket, loss).
    Salida,
    /// Transfer between two locations.
    Transferencia,
    /// Adjustment (found stock). Always increases the balance.
    Ajuste,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Entrada => "ENTRADA",
            MovementType::Salida => "SALIDA",
            MovementType::Transferencia => "TRANSFERENCIA",
            MovementType::Ajuste => "AJUSTE",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Movement direction, keyed on `type`.
///
/// Each variant carries exactly the location fields it needs, so a SALIDA
/// without an origin is unrepresentable. On the wire this is the flat
/// `{"type": "SALIDA", "originLocationId": ...}` layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    #[serde(rename_all = "camelCase")]
    Entrada { destination_location_id: LocationId },
    #[serde(rename_all = "camelCase")]
    Salida { origin_location_id: LocationId },
    #[serde(rename_all = "camelCase")]
    Transferencia {
        origin_location_id: LocationId,
        destination_location_id: LocationId,
    },
    /// The adjusted location travels as `originLocationId`.
    #[serde(rename_all = "camelCase")]
    Ajuste { origin_location_id: LocationId },
}

impl MovementKind {
    pub fn movement_type(&self) -> MovementType {
        match self {
            MovementKind::Entrada { .. } => MovementType::Entrada,
            MovementKind::Salida { .. } => MovementType::Salida,
            MovementKind::Transferencia { .. } => MovementType::Transferencia,
            MovementKind::Ajuste { .. } => MovementType::Ajuste,
        }
    }

    /// Location whose balance decreases, if any.
    pub fn outgoing_location(&self) -> Option<LocationId> {
        match *self {
            MovementKind::Salida { origin_location_id }
            | MovementKind::Transferencia {
                origin_location_id, ..
            } => Some(origin_location_id),
            MovementKind::Entrada { .. } | MovementKind::Ajuste { .. } => None,
        }
    }

    /// Location whose balance increases, if any.
    pub fn incoming_location(&self) -> Option<LocationId> {
        match *self {
            MovementKind::Entrada {
                destination_location_id,
            }
            | MovementKind::Transferencia {
                destination_location_id,
                ..
            } => Some(destination_location_id),
            MovementKind::Ajuste { origin_location_id } => Some(origin_location_id),
            MovementKind::Salida { .. } => None,
        }
    }

    /// Every location this movement touches (one or two).
    pub fn locations(&self) -> Vec<LocationId> {
        self.outgoing_location()
            .into_iter()
            .chain(self.incoming_location())
            .collect()
    }
}

/// Who created a movement.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    Admin,
    Technician,
    #[default]
    System,
}

/// A caller's request to move stock. Validated and journaled by the registrar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRequest {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub created_by_user_id: UserId,
    #[serde(default)]
    pub created_by_type: ActorType,
}

impl MovementRequest {
    pub fn new(
        product_id: ProductId,
        kind: MovementKind,
        quantity: Decimal,
        reason: impl Into<String>,
        created_by_user_id: UserId,
    ) -> Self {
        Self {
            product_id,
            kind,
            quantity,
            reason: reason.into(),
            note: None,
            unit_cost: None,
            ticket_id: None,
            created_by_user_id,
            created_by_type: ActorType::default(),
        }
    }

    pub fn entrada(
        product_id: ProductId,
        destination_location_id: LocationId,
        quantity: Decimal,
        reason: impl Into<String>,
        user: UserId,
    ) -> Self {
        Self::new(
            product_id,
            MovementKind::Entrada {
                destination_location_id,
            },
            quantity,
            reason,
            user,
        )
    }

    pub fn salida(
        product_id: ProductId,
        origin_location_id: LocationId,
        quantity: Decimal,
        reason: impl Into<String>,
        user: UserId,
    ) -> Self {
        Self::new(
            product_id,
            MovementKind::Salida { origin_location_id },
            quantity,
            reason,
            user,
        )
    }

    pub fn transferencia(
        product_id: ProductId,
        origin_location_id: LocationId,
        destination_location_id: LocationId,
        quantity: Decimal,
        reason: impl Into<String>,
        user: UserId,
    ) -> Self {
        Self::new(
            product_id,
            MovementKind::Transferencia {
                origin_location_id,
                destination_location_id,
            },
            quantity,
            reason,
            user,
        )
    }

    pub fn ajuste(
        product_id: ProductId,
        origin_location_id: LocationId,
        quantity: Decimal,
        reason: impl Into<String>,
        user: UserId,
    ) -> Self {
        Self::new(
            product_id,
            MovementKind::Ajuste { origin_location_id },
            quantity,
            reason,
            user,
        )
    }

    pub fn with_ticket(mut self, ticket_id: impl Into<String>) -> Self {
        self.ticket_id = Some(ticket_id.into());
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn by(mut self, actor: ActorType) -> Self {
        self.created_by_type = actor;
        self
    }

    pub fn movement_type(&self) -> MovementType {
        self.kind.movement_type()
    }

    /// Validate the request and return its (strictly positive) quantity.
    pub fn validate(&self) -> DomainResult<Quantity> {
        let quantity = Quantity::positive(self.quantity)?;

        if self.reason.trim().is_empty() {
            return Err(DomainError::validation("reason cannot be empty"));
        }

        if let MovementKind::Transferencia {
            origin_location_id,
            destination_location_id,
        } = self.kind
        {
            if origin_location_id == destination_location_id {
                return Err(DomainError::validation(
                    "transfer origin and destination must differ",
                ));
            }
        }

        if let Some(cost) = self.unit_cost {
            if cost < Decimal::ZERO {
                return Err(DomainError::validation("unit cost cannot be negative"));
            }
        }

        Ok(quantity)
    }
}

/// Immutable journal entry. Written once, never edited or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: MovementId,
    pub product_id: ProductId,
    #[serde(flatten)]
    pub kind: MovementKind,
    pub quantity: Quantity,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub created_by_user_id: UserId,
    pub created_by_type: ActorType,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    /// Journal a validated request.
    pub fn record(
        id: MovementId,
        request: MovementRequest,
        quantity: Quantity,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product_id: request.product_id,
            kind: request.kind,
            quantity,
            reason: request.reason,
            note: request.note,
            unit_cost: request.unit_cost,
            ticket_id: request.ticket_id,
            created_by_user_id: request.created_by_user_id,
            created_by_type: request.created_by_type,
            created_at,
        }
    }

    pub fn movement_type(&self) -> MovementType {
        self.kind.movement_type()
    }

    /// Signed effect of this movement on the balance of `key`.
    pub fn effect_on(&self, key: &StockKey) -> Decimal {
        if self.product_id != key.product_id {
            return Decimal::ZERO;
        }
        let mut delta = Decimal::ZERO;
        if self.kind.incoming_location() == Some(key.location_id) {
            delta += self.quantity.value();
        }
        if self.kind.outgoing_location() == Some(key.location_id) {
            delta -= self.quantity.value();
        }
        delta
    }
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ids() -> (ProductId, LocationId, LocationId, UserId) {
        (ProductId::new(), LocationId::new(), LocationId::new(), UserId::new())
    }

    #[test]
    fn entrada_only_increases_destination() {
        let (p, _, dest, u) = ids();
        let req = MovementRequest::entrada(p, dest, dec!(5), "Compra", u);
        assert_eq!(req.kind.outgoing_location(), None);
        assert_eq!(req.kind.incoming_location(), Some(dest));
        assert_eq!(req.movement_type(), MovementType::Entrada);
    }

    #[test]
    fn ajuste_increases_its_origin_location() {
        let (p, origin, _, u) = ids();
        let req = MovementRequest::ajuste(p, origin, dec!(2), "Conteo", u);
        assert_eq!(req.kind.outgoing_location(), None);
        assert_eq!(req.kind.incoming_location(), Some(origin));
    }

    #[test]
    fn transfer_touches_both_locations() {
        let (p, origin, dest, u) = ids();
        let req = MovementRequest::transferencia(p, origin, dest, dec!(1), "Reparto", u);
        assert_eq!(req.kind.locations(), vec![origin, dest]);
    }

    #[test]
    fn validate_rejects_non_positive_quantity() {
        let (p, origin, _, u) = ids();
        let zero = MovementRequest::salida(p, origin, dec!(0), "Consumo", u);
        assert!(matches!(zero.validate(), Err(DomainError::Validation(_))));
        let negative = MovementRequest::salida(p, origin, dec!(-3), "Consumo", u);
        assert!(matches!(negative.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn validate_rejects_blank_reason_and_self_transfer() {
        let (p, origin, _, u) = ids();
        let blank = MovementRequest::entrada(p, origin, dec!(1), "   ", u);
        assert!(blank.validate().is_err());

        let loop_transfer = MovementRequest::transferencia(p, origin, origin, dec!(1), "x", u);
        match loop_transfer.validate() {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("must differ")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_negative_unit_cost() {
        let (p, _, dest, u) = ids();
        let req = MovementRequest::entrada(p, dest, dec!(1), "Compra", u).with_unit_cost(dec!(-1));
        assert!(req.validate().is_err());
    }

    #[test]
    fn wire_format_is_flat_and_tagged_by_type() {
        let (p, origin, _, u) = ids();
        let req = MovementRequest::salida(p, origin, dec!(8), "Consumo Ticket", u)
            .with_ticket("T-100")
            .by(ActorType::Technician);

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "SALIDA");
        assert_eq!(json["originLocationId"], origin.to_string());
        assert!(json.get("destinationLocationId").is_none());
        assert_eq!(json["createdByType"], "TECHNICIAN");

        let back: MovementRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn wire_format_rejects_missing_required_location() {
        let (p, _, _, u) = ids();
        let json = serde_json::json!({
            "productId": p,
            "type": "TRANSFERENCIA",
            "originLocationId": LocationId::new(),
            "quantity": "1",
            "reason": "x",
            "createdByUserId": u,
        });
        assert!(serde_json::from_value::<MovementRequest>(json).is_err());
    }

    #[test]
    fn effect_on_is_signed_per_location() {
        let (p, origin, dest, u) = ids();
        let req = MovementRequest::transferencia(p, origin, dest, dec!(4), "x", u);
        let qty = req.validate().unwrap();
        let movement = Movement::record(MovementId::new(), req, qty, Utc::now());

        assert_eq!(movement.effect_on(&StockKey::new(p, origin)), dec!(-4));
        assert_eq!(movement.effect_on(&StockKey::new(p, dest)), dec!(4));
        assert_eq!(movement.effect_on(&StockKey::new(ProductId::new(), dest)), dec!(0));
    }
}
