//! Order Lifecycle Controller.
//!
//! Owns every order status transition. Each public operation is one store
//! transaction:
//!
//! - `create`: lock → check → insert order + lines → reserve → history
//! - `update`: release old reservation → lock → check → replace lines → reserve → history
//! - `close`: deduct every reservation → release → `completed` → history
//! - `cancel`: release → `cancelled` → history
//! - `delete`: release → purge order, lines and history
//!
//! A failure anywhere drops the transaction, so no partial order, reservation
//! or deduction survives. Operations on an existing order lock its row before
//! reading the status, so concurrent transitions of one order serialize.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use pantry_core::{CustomerId, ErrorKind, OrderId, ServiceError, ServiceResult};
use pantry_events::chronological;
use pantry_inventory::{IngredientRequirements, Reservation};
use pantry_orders::{
    LineItem, Order, OrderStatusChanged, OrderSubmission, distinct_menu_items, validate_lines,
};

use crate::collaborators::CustomerDirectory;
use crate::context::RequestContext;
use crate::pricing::PriceResolver;
use crate::reservation::ReservationEngine;
use crate::store::{Store, StoreTx};

/// A submission that passed every check that does not need the ledger.
struct Admission {
    lines: Vec<LineItem>,
    total: Decimal,
    requirements: IngredientRequirements,
}

#[derive(Clone)]
pub struct OrderLifecycleController {
    store: Arc<dyn Store>,
    customers: Arc<dyn CustomerDirectory>,
    pricing: PriceResolver,
    reservations: ReservationEngine,
}

impl OrderLifecycleController {
    pub fn new(
        store: Arc<dyn Store>,
        customers: Arc<dyn CustomerDirectory>,
        pricing: PriceResolver,
        reservations: ReservationEngine,
    ) -> Self {
        Self {
            store,
            customers,
            pricing,
            reservations,
        }
    }

    async fn begin(&self, ctx: &RequestContext) -> ServiceResult<Box<dyn StoreTx>> {
        ctx.run("begin", self.store.begin()).await
    }

    async fn ensure_customer(&self, ctx: &RequestContext, customer_id: CustomerId) -> ServiceResult<()> {
        let exists = ctx
            .run("customer_exists", self.customers.exists(customer_id))
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::Timeout => e,
                _ => ServiceError::internal(e.detail()).context("customer lookup failed"),
            })?;
        if !exists {
            return Err(ServiceError::invalid_input(format!(
                "customer {customer_id} not found"
            )));
        }
        Ok(())
    }

    /// Validation, customer check, one catalog lookup, requirement map and pricing.
    async fn admit(&self, ctx: &RequestContext, submission: &OrderSubmission) -> ServiceResult<Admission> {
        submission.validate()?;
        self.ensure_customer(ctx, submission.customer_id).await?;

        let snapshot = self.pricing.lookup(ctx, &submission.menu_item_ids()).await?;
        let requirements = snapshot.requirements_for(submission.counts())?;
        let (lines, total) = PriceResolver::price(&snapshot, &submission.lines)?;
        Ok(Admission {
            lines,
            total,
            requirements,
        })
    }

    /// Order header plus its line items.
    async fn load(&self, ctx: &RequestContext, tx: &mut dyn StoreTx, order_id: OrderId) -> ServiceResult<Order> {
        let mut order = ctx
            .run("order", tx.order(order_id))
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("order {order_id} not found")))?;
        order.lines = ctx.run("line_items", tx.line_items(order_id)).await?;
        Ok(order)
    }

    /// [`Self::load`] with the order row locked, for operations that check
    /// the status and then transition it.
    async fn load_for_update(
        &self,
        ctx: &RequestContext,
        tx: &mut dyn StoreTx,
        order_id: OrderId,
    ) -> ServiceResult<Order> {
        ctx.run("lock_order", tx.lock_order(order_id)).await?;
        self.load(ctx, tx, order_id).await
    }

    async fn record(
        &self,
        ctx: &RequestContext,
        tx: &mut dyn StoreTx,
        entry: &OrderStatusChanged,
    ) -> ServiceResult<()> {
        ctx.run("append_status_history", tx.append_status_history(entry))
            .await
    }

    #[instrument(skip(self, ctx, submission), fields(customer_id = %submission.customer_id), err)]
    pub async fn create(&self, ctx: &RequestContext, submission: &OrderSubmission) -> ServiceResult<Order> {
        let admission = self.admit(ctx, submission).await?;
        let now = Utc::now();
        let (order, opened) = Order::open(
            OrderId::new(),
            submission.customer_id,
            admission.lines,
            admission.total,
            now,
        );

        let mut tx = self.begin(ctx).await?;
        self.reservations
            .ensure_available(ctx, tx.as_mut(), &admission.requirements)
            .await?;
        ctx.run("insert_order", tx.insert_order(&order)).await?;
        ctx.run("insert_line_items", tx.insert_line_items(order.id, &order.lines))
            .await?;
        self.reservations
            .reserve(ctx, tx.as_mut(), order.id, &admission.requirements, now)
            .await?;
        self.record(ctx, tx.as_mut(), &opened).await?;
        ctx.run("commit", tx.commit()).await?;

        info!(order_id = %order.id, total = %order.total, "order opened");
        Ok(order)
    }

    /// Replace customer and lines of an open order, re-checking stock against
    /// the new lines with the old reservation already released.
    #[instrument(skip(self, ctx, submission), fields(order_id = %order_id), err)]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
        submission: &OrderSubmission,
    ) -> ServiceResult<Order> {
        let admission = self.admit(ctx, submission).await?;
        let now = Utc::now();

        let mut tx = self.begin(ctx).await?;
        let mut order = self.load_for_update(ctx, tx.as_mut(), order_id).await?;
        let revised = order.revise(submission.customer_id, admission.lines, admission.total, now)?;

        self.reservations.release(ctx, tx.as_mut(), order_id).await?;
        self.reservations
            .ensure_available(ctx, tx.as_mut(), &admission.requirements)
            .await?;
        ctx.run("delete_line_items", tx.delete_line_items(order_id))
            .await?;
        ctx.run("insert_line_items", tx.insert_line_items(order_id, &order.lines))
            .await?;
        ctx.run("update_order", tx.update_order(&order)).await?;
        self.reservations
            .reserve(ctx, tx.as_mut(), order_id, &admission.requirements, now)
            .await?;
        self.record(ctx, tx.as_mut(), &revised).await?;
        ctx.run("commit", tx.commit()).await?;

        info!(%order_id, total = %order.total, "order revised");
        Ok(order)
    }

    #[instrument(skip(self, ctx), fields(order_id = %order_id), err)]
    pub async fn close(&self, ctx: &RequestContext, order_id: OrderId) -> ServiceResult<Order> {
        self.close_consuming(ctx, order_id).await.map(|(order, _)| order)
    }

    /// Close an order and return the reservations its closure consumed.
    pub(crate) async fn close_consuming(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
    ) -> ServiceResult<(Order, Vec<Reservation>)> {
        let mut tx = self.begin(ctx).await?;
        let mut order = self.load_for_update(ctx, tx.as_mut(), order_id).await?;
        let completed = order.complete(Utc::now())?;

        let consumed = self.reservations.commit(ctx, tx.as_mut(), order_id).await?;
        ctx.run("update_order", tx.update_order(&order)).await?;
        self.record(ctx, tx.as_mut(), &completed).await?;
        ctx.run("commit", tx.commit()).await?;

        info!(%order_id, total = %order.total, ingredients = consumed.len(), "order completed");
        Ok((order, consumed))
    }

    /// Release the reservation of an open order and mark it `cancelled`.
    #[instrument(skip(self, ctx), fields(order_id = %order_id), err)]
    pub async fn cancel(&self, ctx: &RequestContext, order_id: OrderId) -> ServiceResult<Order> {
        let mut tx = self.begin(ctx).await?;
        let mut order = self.load_for_update(ctx, tx.as_mut(), order_id).await?;
        let cancelled = order.cancel(Utc::now())?;

        self.reservations.release(ctx, tx.as_mut(), order_id).await?;
        ctx.run("update_order", tx.update_order(&order)).await?;
        self.record(ctx, tx.as_mut(), &cancelled).await?;
        ctx.run("commit", tx.commit()).await?;

        info!(%order_id, "order cancelled");
        Ok(order)
    }

    /// Move an open order to `rejected` with `reason` in its note, releasing
    /// its reservation.
    pub(crate) async fn reject(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
        reason: &str,
    ) -> ServiceResult<Order> {
        let mut tx = self.begin(ctx).await?;
        let mut order = self.load_for_update(ctx, tx.as_mut(), order_id).await?;
        let rejected = order.reject(reason, Utc::now())?;

        self.reservations.release(ctx, tx.as_mut(), order_id).await?;
        ctx.run("update_order", tx.update_order(&order)).await?;
        self.record(ctx, tx.as_mut(), &rejected).await?;
        ctx.run("commit", tx.commit()).await?;
        Ok(order)
    }

    /// Persist a submission that never got admitted as a `rejected` order.
    pub(crate) async fn record_rejection(
        &self,
        ctx: &RequestContext,
        submission: &OrderSubmission,
        reason: &str,
    ) -> ServiceResult<Order> {
        let (order, rejected) = Order::rejected(OrderId::new(), submission, reason, Utc::now());

        let mut tx = self.begin(ctx).await?;
        ctx.run("insert_order", tx.insert_order(&order)).await?;
        ctx.run("insert_line_items", tx.insert_line_items(order.id, &order.lines))
            .await?;
        self.record(ctx, tx.as_mut(), &rejected).await?;
        ctx.run("commit", tx.commit()).await?;
        Ok(order)
    }

    /// Remove an order with its line items, reservation and history,
    /// whatever its status.
    #[instrument(skip(self, ctx), fields(order_id = %order_id), err)]
    pub async fn delete(&self, ctx: &RequestContext, order_id: OrderId) -> ServiceResult<()> {
        let mut tx = self.begin(ctx).await?;
        ctx.run("lock_order", tx.lock_order(order_id)).await?;
        if ctx.run("order", tx.order(order_id)).await?.is_none() {
            return Err(ServiceError::not_found(format!("order {order_id} not found")));
        }
        self.reservations.release(ctx, tx.as_mut(), order_id).await?;
        ctx.run("delete_line_items", tx.delete_line_items(order_id))
            .await?;
        ctx.run("delete_order", tx.delete_order(order_id)).await?;
        ctx.run("commit", tx.commit()).await?;

        info!(%order_id, "order deleted");
        Ok(())
    }

    pub async fn get(&self, ctx: &RequestContext, order_id: OrderId) -> ServiceResult<Order> {
        let mut tx = self.begin(ctx).await?;
        self.load(ctx, tx.as_mut(), order_id).await
    }

    /// Every order with its lines, newest first.
    pub async fn list(&self, ctx: &RequestContext) -> ServiceResult<Vec<Order>> {
        let mut tx = self.begin(ctx).await?;
        let mut orders = ctx.run("orders", tx.orders()).await?;
        for order in &mut orders {
            order.lines = ctx.run("line_items", tx.line_items(order.id)).await?;
        }
        Ok(orders)
    }

    pub async fn history(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
    ) -> ServiceResult<Vec<OrderStatusChanged>> {
        let mut tx = self.begin(ctx).await?;
        if ctx.run("order", tx.order(order_id)).await?.is_none() {
            return Err(ServiceError::not_found(format!("order {order_id} not found")));
        }
        let mut entries = ctx.run("status_history", tx.status_history(order_id)).await?;
        chronological(&mut entries);
        Ok(entries)
    }

    /// Whether current stock covers `lines`, without reserving anything.
    pub async fn check_availability(&self, ctx: &RequestContext, lines: &[LineItem]) -> ServiceResult<bool> {
        validate_lines(lines)?;
        let snapshot = self.pricing.lookup(ctx, &distinct_menu_items(lines)).await?;
        let requirements = snapshot.requirements_for(lines.iter().map(|l| (l.menu_item_id, l.count)))?;

        let mut tx = self.begin(ctx).await?;
        self.reservations
            .check_availability(ctx, tx.as_mut(), &requirements)
            .await
    }
}
