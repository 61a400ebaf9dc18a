//! Infrastructure layer: durable store, collaborators, configuration and the
//! engine components that need IO (ledger, reservations, pricing, lifecycle,
//! batch).

pub mod batch;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod ledger;
pub mod lifecycle;
pub mod pricing;
pub mod reservation;
pub mod service;
pub mod store;

pub use batch::BatchProcessor;
pub use collaborators::{Catalog, CustomerDirectory, InMemoryCatalog, InMemoryCustomerDirectory};
pub use config::{ConfigError, EngineConfig};
pub use context::RequestContext;
pub use ledger::{StockAdjustment, StockLedger};
pub use lifecycle::OrderLifecycleController;
pub use pricing::PriceResolver;
pub use reservation::ReservationEngine;
pub use service::OrderService;
pub use store::{InMemoryStore, PostgresStore, Store, StoreError, StoreTx};
