//! Immutable facts recorded by the engine (status history and the like).

pub mod event;

pub use event::{Event, chronological};
