//! Durable store boundary.
//!
//! The engine only talks to storage through [`Store`] and the transaction
//! handle it hands out. Two implementations ship:
//! - [`InMemoryStore`] for tests/dev
//! - [`PostgresStore`] backed by `sqlx`

mod in_memory;
mod postgres;
mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{Store, StoreError, StoreResult, StoreTx};
