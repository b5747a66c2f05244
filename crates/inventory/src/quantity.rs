use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, ValueObject};

/// Non-negative stock amount.
///
/// Quantities are exact decimals because several units of measure are
/// fractional (metres of pipe, pounds of refrigerant). A `Quantity` can never
/// hold a negative value, which is what makes "stock never goes negative" a
/// type-level property of `StockRecord`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl ValueObject for Quantity {}

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    /// Build a quantity, rejecting negative values.
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "quantity cannot be negative (got {value})"
            )));
        }
        Ok(Self(value))
    }

    /// Build a strictly positive quantity (movement amounts).
    pub fn positive(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "quantity must be greater than zero (got {value})"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// `self - other`, or `None` when the result would be negative.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        let result = self.0.checked_sub(other.0)?;
        if result < Decimal::ZERO {
            None
        } else {
            Some(Quantity(result))
        }
    }

    /// `self + other`, or `None` on decimal overflow.
    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl From<u32> for Quantity {
    fn from(value: u32) -> Self {
        Quantity(Decimal::from(value))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.normalize(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_negative_values() {
        assert!(Quantity::new(dec!(-0.5)).is_err());
        assert!(Quantity::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn positive_rejects_zero() {
        let err = Quantity::positive(Decimal::ZERO).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(Quantity::positive(dec!(2.5)).unwrap().value(), dec!(2.5));
    }

    #[test]
    fn checked_sub_refuses_to_go_below_zero() {
        let ten = Quantity::from(10);
        assert_eq!(ten.checked_sub(Quantity::from(8)), Some(Quantity::from(2)));
        assert_eq!(ten.checked_sub(Quantity::from(10)), Some(Quantity::ZERO));
        assert_eq!(ten.checked_sub(Quantity::from(11)), None);
    }

    #[test]
    fn display_drops_trailing_zeros() {
        let q = Quantity::new(dec!(30.00)).unwrap();
        assert_eq!(q.to_string(), "30");
    }

    #[test]
    fn deserialization_enforces_non_negative() {
        let ok: Quantity = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(ok.value(), dec!(12.5));
        assert!(serde_json::from_str::<Quantity>("\"-1\"").is_err());
    }
}
