//! Menu catalog domain module.
//!
//! Menu items with their current unit price and recipe (ingredient quantity per
//! unit sold). Catalog CRUD lives elsewhere; this crate only models what the
//! fulfillment engine reads.

pub mod menu;

pub use menu::{IngredientRequirement, MenuItem, MenuSnapshot};
