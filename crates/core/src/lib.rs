//! `pantry-core`: shared building blocks for the fulfillment engine.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! identifiers, the service error taxonomy, rounding rules and the opaque
//! adjustments bag carried on line items.

pub mod adjustments;
pub mod error;
pub mod id;
pub mod money;

pub use adjustments::{AdjustmentValue, Adjustments};
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use id::{CustomerId, IngredientId, MenuItemId, OrderId};
pub use money::{round_currency, round_quantity};
