//! Orders domain module.
//!
//! The order state machine, status history and batch report types,
//! implemented purely as deterministic domain logic (no IO, no storage).

pub mod history;
pub mod order;
pub mod report;

pub use history::OrderStatusChanged;
pub use order::{
    LineItem, Order, OrderStatus, OrderSubmission, distinct_menu_items, validate_lines,
};
pub use report::{BatchOutcome, BatchReport, ConsumptionMap, StockEvent};
