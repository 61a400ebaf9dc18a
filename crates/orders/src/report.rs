//! Batch submission results.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pantry_core::{IngredientId, OrderId, round_quantity};

use crate::order::Order;

/// Net consumption of one ingredient across a batch, plus what is left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEvent {
    pub ingredient_id: IngredientId,
    pub ingredient_name: String,
    pub consumed: f64,
    pub remaining: f64,
}

/// Aggregate over one batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    #[serde(rename = "confirmed")]
    pub accepted: usize,
    pub declined: usize,
    /// Sum of the totals of accepted orders.
    pub revenue: Decimal,
    pub stock_events: Vec<StockEvent>,
}

/// Every submitted order (in input order) plus the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub handled: Vec<Order>,
    /// Declined orders whose rejection could not be written to the store.
    /// Their entry in `handled` exists only in this outcome; one that was
    /// already created is still `open` in the store and keeps its reservation
    /// until it is cancelled or deleted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unrecorded: Vec<OrderId>,
    pub report: BatchReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Accumulator {
    consumed: f64,
}

/// Running per-ingredient consumption totals, private to one batch call.
///
/// Every accumulation is rounded to 2 decimal places to bound float drift.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumptionMap {
    entries: BTreeMap<IngredientId, Accumulator>,
}

impl ConsumptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, ingredient_id: IngredientId, quantity: f64) {
        let acc = self.entries.entry(ingredient_id).or_default();
        acc.consumed = round_quantity(acc.consumed + round_quantity(quantity));
    }

    /// Fold another map (typically one order's consumption) into this one.
    pub fn merge(&mut self, other: ConsumptionMap) {
        for (id, acc) in other.entries {
            self.record(id, acc.consumed);
        }
    }

    pub fn consumed(&self, ingredient_id: &IngredientId) -> Option<f64> {
        self.entries.get(ingredient_id).map(|a| a.consumed)
    }

    pub fn iter(&self) -> impl Iterator<Item = (IngredientId, f64)> + '_ {
        self.entries.iter().map(|(id, a)| (*id, a.consumed))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn record_sums_and_rounds_each_step() {
        let sugar = IngredientId::new();
        let mut map = ConsumptionMap::new();
        map.record(sugar, 0.125);
        assert_eq!(map.consumed(&sugar), Some(0.13));
        map.record(sugar, 0.333);
        assert_eq!(map.consumed(&sugar), Some(0.46));
    }

    #[test]
    fn merge_adds_per_ingredient() {
        let milk = IngredientId::new();
        let beans = IngredientId::new();

        let mut batch = ConsumptionMap::new();
        batch.record(milk, 0.4);

        let mut order = ConsumptionMap::new();
        order.record(milk, 0.2);
        order.record(beans, 0.036);

        batch.merge(order);
        assert_eq!(batch.consumed(&milk), Some(0.6));
        assert_eq!(batch.consumed(&beans), Some(0.04));
    }

    #[test]
    fn report_serializes_accepted_as_confirmed() {
        let report = BatchReport {
            total: 3,
            accepted: 2,
            declined: 1,
            revenue: Decimal::new(15, 0),
            stock_events: vec![],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["confirmed"], 2);
        assert_eq!(json["declined"], 1);
    }

    proptest! {
        #[test]
        fn accumulated_total_stays_on_hundredths(
            quantities in prop::collection::vec(0.0f64..50.0, 1..40)
        ) {
            let id = IngredientId::new();
            let mut map = ConsumptionMap::new();
            for q in &quantities {
                map.record(id, *q);
            }
            let consumed = map.consumed(&id).unwrap();
            prop_assert!((consumed * 100.0 - (consumed * 100.0).round()).abs() < 1e-6);

            let exact: f64 = quantities.iter().sum();
            prop_assert!((consumed - exact).abs() <= 0.01 * quantities.len() as f64);
        }
    }
}
