use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pantry_core::{IngredientId, ServiceError, ServiceResult};

/// Tolerance used when comparing physical quantities.
///
/// Sums of `f64` reservations can land a hair below the true value; anything
/// within this distance of zero counts as zero.
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// Unit of measure for an ingredient.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasureUnit {
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "l")]
    Litre,
    #[serde(rename = "pcs")]
    Piece,
}

impl MeasureUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            MeasureUnit::Kilogram => "kg",
            MeasureUnit::Litre => "l",
            MeasureUnit::Piece => "pcs",
        }
    }
}

impl core::fmt::Display for MeasureUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasureUnit {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kg" => Ok(MeasureUnit::Kilogram),
            "l" => Ok(MeasureUnit::Litre),
            "pcs" => Ok(MeasureUnit::Piece),
            other => Err(ServiceError::invalid_input(format!(
                "invalid measurement unit '{other}' (expected: kg, l, pcs)"
            ))),
        }
    }
}

/// One stock-ledger row: how much of an ingredient is physically on hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientStock {
    pub id: IngredientId,
    pub name: String,
    pub on_hand: f64,
    pub unit: MeasureUnit,
    pub unit_cost: Decimal,
}

impl IngredientStock {
    pub fn new(
        id: IngredientId,
        name: impl Into<String>,
        on_hand: f64,
        unit: MeasureUnit,
        unit_cost: Decimal,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            on_hand,
            unit,
            unit_cost,
        }
    }

    /// Administrative validation for create/update.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::invalid_input("ingredient name is required"));
        }
        if !self.on_hand.is_finite() || self.on_hand < 0.0 {
            return Err(ServiceError::invalid_input(
                "on-hand quantity must be a non-negative number",
            ));
        }
        if self.unit_cost <= Decimal::ZERO {
            return Err(ServiceError::invalid_input(
                "unit cost must be greater than zero",
            ));
        }
        Ok(())
    }

    /// On-hand minus what is already promised to open orders.
    pub fn available(&self, reserved: f64) -> f64 {
        self.on_hand - reserved
    }

    /// Permanently remove `quantity` from on-hand stock.
    ///
    /// Fails (leaving the row untouched) if the result would be negative.
    pub fn deduct(&mut self, quantity: f64) -> ServiceResult<()> {
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(ServiceError::invalid_input(format!(
                "deduction for {} must be a non-negative number, got {quantity}",
                self.id
            )));
        }
        let remaining = self.on_hand - quantity;
        if remaining < -QUANTITY_EPSILON {
            return Err(ServiceError::inventory_not_available(format!(
                "insufficient stock for {} ({}): on hand {}, deduction {quantity}",
                self.name, self.id, self.on_hand
            )));
        }
        self.on_hand = remaining.max(0.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_core::ErrorKind;
    use rust_decimal_macros::dec;

    fn flour(on_hand: f64) -> IngredientStock {
        IngredientStock::new(IngredientId::new(), "flour", on_hand, MeasureUnit::Kilogram, dec!(1.20))
    }

    #[test]
    fn deduct_reduces_on_hand() {
        let mut stock = flour(10.0);
        stock.deduct(4.0).unwrap();
        assert_eq!(stock.on_hand, 6.0);
    }

    #[test]
    fn deduct_refuses_to_go_negative_and_leaves_row_untouched() {
        let mut stock = flour(3.0);
        let err = stock.deduct(4.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InventoryNotAvailable);
        assert_eq!(stock.on_hand, 3.0);
    }

    #[test]
    fn deduct_tolerates_float_noise_at_zero() {
        let mut stock = flour(0.3);
        stock.deduct(0.1 + 0.2).unwrap();
        assert_eq!(stock.on_hand, 0.0);
    }

    #[test]
    fn validate_rejects_bad_rows() {
        let mut stock = flour(1.0);
        stock.name = "  ".into();
        assert!(stock.validate().is_err());

        let mut stock = flour(-1.0);
        assert!(stock.validate().is_err());
        stock.on_hand = 1.0;
        stock.unit_cost = Decimal::ZERO;
        assert!(stock.validate().is_err());

        assert!(flour(0.0).validate().is_ok());
    }

    #[test]
    fn unit_parses_and_serializes_short_names() {
        assert_eq!("pcs".parse::<MeasureUnit>().unwrap(), MeasureUnit::Piece);
        assert!("gallon".parse::<MeasureUnit>().is_err());
        assert_eq!(serde_json::to_string(&MeasureUnit::Litre).unwrap(), "\"l\"");
    }
}
