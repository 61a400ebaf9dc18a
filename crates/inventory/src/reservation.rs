use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pantry_core::{IngredientId, OrderId};

/// A provisional hold against an ingredient's stock, tied to one open order.
///
/// At most one reservation exists per `(order_id, ingredient_id)`; quantities
/// for the same ingredient are summed before the row is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub order_id: OrderId,
    pub ingredient_id: IngredientId,
    /// Always strictly positive.
    pub quantity: f64,
    pub reserved_at: DateTime<Utc>,
}

impl Reservation {
    pub fn key(&self) -> (OrderId, IngredientId) {
        (self.order_id, self.ingredient_id)
    }
}
