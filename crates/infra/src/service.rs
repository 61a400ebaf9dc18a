//! `OrderService`: the operations exposed to the surrounding request layer.

use std::sync::Arc;

use tracing::info;

use pantry_core::{IngredientId, OrderId, ServiceError, ServiceResult};
use pantry_inventory::IngredientStock;
use pantry_orders::{BatchOutcome, LineItem, Order, OrderStatusChanged, OrderSubmission};

use crate::batch::BatchProcessor;
use crate::collaborators::{Catalog, CustomerDirectory};
use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::ledger::{StockAdjustment, StockLedger};
use crate::lifecycle::OrderLifecycleController;
use crate::pricing::PriceResolver;
use crate::reservation::ReservationEngine;
use crate::store::{InMemoryStore, PostgresStore, Store};

/// Wires ledger, reservation engine, pricing, lifecycle controller and batch
/// processor over one store.
#[derive(Clone)]
pub struct OrderService {
    ledger: StockLedger,
    lifecycle: Arc<OrderLifecycleController>,
    batch: BatchProcessor,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn Catalog>,
        customers: Arc<dyn CustomerDirectory>,
    ) -> Self {
        let ledger = StockLedger::new(store.clone());
        let reservations = ReservationEngine::new(ledger.clone());
        let pricing = PriceResolver::new(catalog);
        let lifecycle = Arc::new(OrderLifecycleController::new(
            store,
            customers,
            pricing,
            reservations,
        ));
        let batch = BatchProcessor::new(lifecycle.clone(), ledger.clone());
        Self {
            ledger,
            lifecycle,
            batch,
        }
    }

    /// Postgres when `database_url` is set (schema applied on connect),
    /// otherwise an in-memory store.
    pub async fn from_config(
        config: &EngineConfig,
        catalog: Arc<dyn Catalog>,
        customers: Arc<dyn CustomerDirectory>,
    ) -> ServiceResult<Self> {
        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => {
                let store = PostgresStore::connect(url, config.max_connections)
                    .await
                    .map_err(ServiceError::from)?;
                store.apply_schema().await.map_err(ServiceError::from)?;
                info!(max_connections = config.max_connections, "using postgres store");
                Arc::new(store)
            }
            None => {
                info!("using in-memory store");
                Arc::new(InMemoryStore::new())
            }
        };
        Ok(Self::new(store, catalog, customers))
    }

    pub async fn create_order(&self, ctx: &RequestContext, submission: &OrderSubmission) -> ServiceResult<Order> {
        self.lifecycle.create(ctx, submission).await
    }

    pub async fn update_order(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
        submission: &OrderSubmission,
    ) -> ServiceResult<Order> {
        self.lifecycle.update(ctx, order_id, submission).await
    }

    pub async fn close_order(&self, ctx: &RequestContext, order_id: OrderId) -> ServiceResult<Order> {
        self.lifecycle.close(ctx, order_id).await
    }

    pub async fn cancel_order(&self, ctx: &RequestContext, order_id: OrderId) -> ServiceResult<Order> {
        self.lifecycle.cancel(ctx, order_id).await
    }

    pub async fn delete_order(&self, ctx: &RequestContext, order_id: OrderId) -> ServiceResult<()> {
        self.lifecycle.delete(ctx, order_id).await
    }

    pub async fn process_batch(
        &self,
        ctx: &RequestContext,
        submissions: &[OrderSubmission],
    ) -> ServiceResult<BatchOutcome> {
        self.batch.process_batch(ctx, submissions).await
    }

    pub async fn check_inventory_availability(
        &self,
        ctx: &RequestContext,
        lines: &[LineItem],
    ) -> ServiceResult<bool> {
        self.lifecycle.check_availability(ctx, lines).await
    }

    pub async fn get_order(&self, ctx: &RequestContext, order_id: OrderId) -> ServiceResult<Order> {
        self.lifecycle.get(ctx, order_id).await
    }

    pub async fn list_orders(&self, ctx: &RequestContext) -> ServiceResult<Vec<Order>> {
        self.lifecycle.list(ctx).await
    }

    pub async fn order_history(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
    ) -> ServiceResult<Vec<OrderStatusChanged>> {
        self.lifecycle.history(ctx, order_id).await
    }

    pub async fn adjust_stock(
        &self,
        ctx: &RequestContext,
        adjustment: StockAdjustment,
    ) -> ServiceResult<Option<IngredientStock>> {
        self.ledger.adjust(ctx, adjustment).await
    }

    pub async fn stock(&self, ctx: &RequestContext, ingredient_id: IngredientId) -> ServiceResult<IngredientStock> {
        self.ledger.stock(ctx, ingredient_id).await
    }

    pub async fn list_stock(&self, ctx: &RequestContext) -> ServiceResult<Vec<IngredientStock>> {
        self.ledger.list_stock(ctx).await
    }

    pub async fn available_balance(&self, ctx: &RequestContext, ingredient_id: IngredientId) -> ServiceResult<f64> {
        self.ledger.available_balance(ctx, ingredient_id).await
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    pub fn lifecycle(&self) -> &OrderLifecycleController {
        &self.lifecycle
    }
}
