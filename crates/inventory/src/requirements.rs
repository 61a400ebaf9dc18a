//! Per-ingredient quantity requirements of a set of line items.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pantry_core::{IngredientId, OrderId};

use crate::reservation::Reservation;
use crate::stock::QUANTITY_EPSILON;

/// Required quantity per distinct ingredient.
///
/// Quantities are summed exactly as given (`per_unit * count`); nothing is
/// rounded here. Iteration is in ascending ingredient id order, which is also
/// the order the store locks rows in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngredientRequirements {
    quantities: BTreeMap<IngredientId, f64>,
}

/// An ingredient whose available balance cannot cover the requirement.
#[derive(Debug, Clone, PartialEq)]
pub struct Shortfall {
    pub ingredient_id: IngredientId,
    pub required: f64,
    pub available: f64,
}

impl core::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "ingredient {}: required {}, available {}",
            self.ingredient_id, self.required, self.available
        )
    }
}

impl IngredientRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` to the running requirement of `ingredient_id`.
    pub fn add(&mut self, ingredient_id: IngredientId, quantity: f64) {
        *self.quantities.entry(ingredient_id).or_insert(0.0) += quantity;
    }

    pub fn get(&self, ingredient_id: &IngredientId) -> Option<f64> {
        self.quantities.get(ingredient_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IngredientId, f64)> + '_ {
        self.quantities.iter().map(|(id, q)| (*id, *q))
    }

    pub fn ingredient_ids(&self) -> Vec<IngredientId> {
        self.quantities.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    /// True when no ingredient needs a positive quantity.
    pub fn is_empty(&self) -> bool {
        self.quantities.values().all(|q| *q <= QUANTITY_EPSILON)
    }

    /// Compare against an available balance, returning the shortfall if any.
    pub fn shortfall(&self, ingredient_id: IngredientId, available: f64) -> Option<Shortfall> {
        let required = self.get(&ingredient_id)?;
        if required > available + QUANTITY_EPSILON {
            Some(Shortfall {
                ingredient_id,
                required,
                available,
            })
        } else {
            None
        }
    }

    /// One reservation row per ingredient with a positive requirement.
    pub fn to_reservations(&self, order_id: OrderId, reserved_at: DateTime<Utc>) -> Vec<Reservation> {
        self.quantities
            .iter()
            .filter(|(_, q)| **q > QUANTITY_EPSILON)
            .map(|(ingredient_id, quantity)| Reservation {
                order_id,
                ingredient_id: *ingredient_id,
                quantity: *quantity,
                reserved_at,
            })
            .collect()
    }
}

impl FromIterator<(IngredientId, f64)> for IngredientRequirements {
    fn from_iter<I: IntoIterator<Item = (IngredientId, f64)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (id, q) in iter {
            out.add(id, q);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn shared_ingredients_are_summed() {
        let flour = IngredientId::new();
        let milk = IngredientId::new();
        let reqs: IngredientRequirements =
            [(flour, 2.0), (milk, 0.25), (flour, 1.5)].into_iter().collect();

        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs.get(&flour), Some(3.5));
        assert_eq!(reqs.get(&milk), Some(0.25));
    }

    #[test]
    fn shortfall_only_when_required_exceeds_available() {
        let flour = IngredientId::new();
        let reqs: IngredientRequirements = [(flour, 7.0)].into_iter().collect();

        let short = reqs.shortfall(flour, 6.0).unwrap();
        assert_eq!(short.required, 7.0);
        assert_eq!(short.available, 6.0);
        assert!(reqs.shortfall(flour, 7.0).is_none());
        assert!(reqs.shortfall(IngredientId::new(), 0.0).is_none());
    }

    #[test]
    fn zero_requirements_produce_no_reservations() {
        let order_id = OrderId::new();
        let reqs: IngredientRequirements = [(IngredientId::new(), 0.0)].into_iter().collect();
        assert!(reqs.is_empty());
        assert!(reqs.to_reservations(order_id, Utc::now()).is_empty());
    }

    #[test]
    fn fractional_requirements_are_not_rounded() {
        let sugar = IngredientId::new();
        let reqs: IngredientRequirements = [(sugar, 0.015 * 3.0)].into_iter().collect();
        let rows = reqs.to_reservations(OrderId::new(), Utc::now());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity, 0.015 * 3.0);
    }

    proptest! {
        #[test]
        fn total_requirement_equals_sum_of_parts(
            parts in prop::collection::vec((0usize..4, 0.0f64..100.0), 1..30)
        ) {
            let ids: Vec<IngredientId> = (0..4).map(|_| IngredientId::new()).collect();
            let reqs: IngredientRequirements =
                parts.iter().map(|(i, q)| (ids[*i], *q)).collect();

            for (idx, id) in ids.iter().enumerate() {
                let expected: f64 = parts.iter().filter(|(i, _)| *i == idx).map(|(_, q)| q).sum();
                let got = reqs.get(id).unwrap_or(0.0);
                prop_assert!((got - expected).abs() < 1e-6);
            }
        }
    }
}
