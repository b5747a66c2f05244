use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, ProductId};

use crate::quantity::Quantity;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitOfMeasure {
    #[default]
    Unidad,
    Pie,
    Metro,
    Rollo,
    Galon,
    Libra,
    Caja,
    Juego,
    Paquete,
    Otro,
}

/// Catalog product. `min_stock` is the low-stock alert threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub unit: UnitOfMeasure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Moving average cost.
    pub average_cost: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_price: Option<Decimal>,
    pub min_stock: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stock: Option<Quantity>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Alert threshold for this product.
    pub fn threshold(&self) -> Quantity {
        self.min_stock
    }

    /// Apply a partial update, re-validating the result.
    pub fn apply_patch(&mut self, patch: ProductPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = self.clone();
        if let Some(sku) = patch.sku {
            next.sku = sku;
        }
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(category) = patch.category {
            next.category = category;
        }
        if let Some(unit) = patch.unit {
            next.unit = unit;
        }
        if let Some(average_cost) = patch.average_cost {
            next.average_cost = average_cost;
        }
        if let Some(min_stock) = patch.min_stock {
            next.min_stock = min_stock;
        }
        if let Some(max_stock) = patch.max_stock {
            next.max_stock = max_stock;
        }
        if let Some(is_active) = patch.is_active {
            next.is_active = is_active;
        }

        validate_fields(&next.sku, &next.name, next.average_cost, next.min_stock, next.max_stock)?;

        next.updated_at = now;
        *self = next;
        Ok(())
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Input for creating a catalog product. Products start active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub unit: UnitOfMeasure,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub average_cost: Decimal,
    #[serde(default)]
    pub reference_price: Option<Decimal>,
    #[serde(default)]
    pub min_stock: Quantity,
    #[serde(default)]
    pub max_stock: Option<Quantity>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, min_stock: Quantity) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            category: String::new(),
            brand: None,
            unit: UnitOfMeasure::default(),
            description: None,
            average_cost: Decimal::ZERO,
            reference_price: None,
            min_stock,
            max_stock: None,
            tags: Vec::new(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        validate_fields(&self.sku, &self.name, self.average_cost, self.min_stock, self.max_stock)
    }

    pub fn into_product(self, id: ProductId, now: DateTime<Utc>) -> DomainResult<Product> {
        self.validate()?;
        Ok(Product {
            id,
            sku: self.sku.trim().to_string(),
            name: self.name.trim().to_string(),
            category: self.category,
            brand: self.brand,
            unit: self.unit,
            description: self.description,
            average_cost: self.average_cost,
            reference_price: self.reference_price,
            min_stock: self.min_stock,
            max_stock: self.max_stock,
            tags: self.tags,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial product update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<UnitOfMeasure>,
    pub average_cost: Option<Decimal>,
    pub min_stock: Option<Quantity>,
    pub max_stock: Option<Option<Quantity>>,
    pub is_active: Option<bool>,
}

fn validate_fields(
    sku: &str,
    name: &str,
    average_cost: Decimal,
    min_stock: Quantity,
    max_stock: Option<Quantity>,
) -> DomainResult<()> {
    if sku.trim().is_empty() {
        return Err(DomainError::validation("sku cannot be empty"));
    }
    if name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if average_cost < Decimal::ZERO {
        return Err(DomainError::validation("average cost cannot be negative"));
    }
    if let Some(max) = max_stock {
        if max < min_stock {
            return Err(DomainError::validation(format!(
                "max stock ({max}) cannot be below min stock ({min_stock})"
            )));
        }
    }
    Ok(())
}
