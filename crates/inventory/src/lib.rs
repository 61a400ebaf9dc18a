//! Inventory domain module.
//!
//! Ingredient stock rows, reservations held against them and the per-order
//! ingredient requirement map, implemented purely as deterministic domain
//! logic (no IO, no storage).

pub mod requirements;
pub mod reservation;
pub mod stock;

pub use requirements::{IngredientRequirements, Shortfall};
pub use reservation::Reservation;
pub use stock::{IngredientStock, MeasureUnit, QUANTITY_EPSILON};
