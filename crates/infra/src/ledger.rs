//! Stock Ledger: the only writer of on-hand quantities.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use pantry_core::{IngredientId, ServiceError, ServiceResult};
use pantry_inventory::IngredientStock;

use crate::context::RequestContext;
use crate::store::{Store, StoreTx};

/// Administrative change to the ledger, outside the reservation path.
#[derive(Debug, Clone, PartialEq)]
pub enum StockAdjustment {
    Create(IngredientStock),
    /// Replace name, on-hand, unit and cost of an existing row.
    Update(IngredientStock),
    Delete(IngredientId),
}

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn Store>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// On-hand minus active reservations, read inside the caller's transaction.
    ///
    /// An ingredient with no ledger row has a balance of zero.
    pub async fn balance_in(
        &self,
        ctx: &RequestContext,
        tx: &mut dyn StoreTx,
        ingredient_id: IngredientId,
    ) -> ServiceResult<f64> {
        let Some(stock) = ctx.run("ingredient", tx.ingredient(ingredient_id)).await? else {
            return Ok(0.0);
        };
        let reserved = ctx
            .run("reserved_quantity", tx.reserved_quantity(ingredient_id))
            .await?;
        Ok(stock.available(reserved))
    }

    /// Standalone balance read in its own transaction.
    #[instrument(skip(self, ctx), fields(ingredient_id = %ingredient_id), err)]
    pub async fn available_balance(
        &self,
        ctx: &RequestContext,
        ingredient_id: IngredientId,
    ) -> ServiceResult<f64> {
        let mut tx = ctx.run("begin", self.store.begin()).await?;
        self.balance_in(ctx, tx.as_mut(), ingredient_id).await
    }

    /// Permanently remove `quantity` from on-hand stock.
    ///
    /// Fails with `InventoryNotAvailable` if the row would go negative, which
    /// only happens if reservation discipline was bypassed.
    pub async fn deduct(
        &self,
        ctx: &RequestContext,
        tx: &mut dyn StoreTx,
        ingredient_id: IngredientId,
        quantity: f64,
    ) -> ServiceResult<IngredientStock> {
        let mut stock = ctx
            .run("ingredient", tx.ingredient(ingredient_id))
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("ingredient {ingredient_id} not found")))?;
        stock.deduct(quantity)?;
        ctx.run("update_ingredient", tx.update_ingredient(&stock))
            .await?;
        debug!(%ingredient_id, quantity, remaining = stock.on_hand, "stock deducted");
        Ok(stock)
    }

    /// Apply an administrative create/update/delete.
    ///
    /// Returns the row as stored, or `None` after a delete.
    #[instrument(skip(self, ctx, adjustment), err)]
    pub async fn adjust(
        &self,
        ctx: &RequestContext,
        adjustment: StockAdjustment,
    ) -> ServiceResult<Option<IngredientStock>> {
        let mut tx = ctx.run("begin", self.store.begin()).await?;

        let stored = match adjustment {
            StockAdjustment::Create(stock) => {
                stock.validate()?;
                ctx.run("insert_ingredient", tx.insert_ingredient(&stock))
                    .await?;
                info!(ingredient_id = %stock.id, name = %stock.name, on_hand = stock.on_hand, "ingredient created");
                Some(stock)
            }
            StockAdjustment::Update(stock) => {
                stock.validate()?;
                ctx.run("lock_ingredients", tx.lock_ingredients(&[stock.id]))
                    .await?;
                if ctx.run("ingredient", tx.ingredient(stock.id)).await?.is_none() {
                    return Err(ServiceError::not_found(format!("ingredient {} not found", stock.id)));
                }
                let reserved = ctx
                    .run("reserved_quantity", tx.reserved_quantity(stock.id))
                    .await?;
                if stock.available(reserved) < -pantry_inventory::QUANTITY_EPSILON {
                    return Err(ServiceError::invalid_input(format!(
                        "on-hand quantity {} is below the {reserved} currently reserved for {}",
                        stock.on_hand, stock.name
                    )));
                }
                ctx.run("update_ingredient", tx.update_ingredient(&stock))
                    .await?;
                info!(ingredient_id = %stock.id, on_hand = stock.on_hand, "ingredient updated");
                Some(stock)
            }
            StockAdjustment::Delete(ingredient_id) => {
                ctx.run("lock_ingredients", tx.lock_ingredients(&[ingredient_id]))
                    .await?;
                let holds = ctx
                    .run(
                        "reservation_count_for_ingredient",
                        tx.reservation_count_for_ingredient(ingredient_id),
                    )
                    .await?;
                if holds > 0 {
                    return Err(ServiceError::invalid_input(format!(
                        "ingredient {ingredient_id} is reserved by {holds} open order(s)"
                    )));
                }
                ctx.run("delete_ingredient", tx.delete_ingredient(ingredient_id))
                    .await?;
                info!(%ingredient_id, "ingredient deleted");
                None
            }
        };

        ctx.run("commit", tx.commit()).await?;
        Ok(stored)
    }

    #[instrument(skip(self, ctx), fields(ingredient_id = %ingredient_id), err)]
    pub async fn stock(
        &self,
        ctx: &RequestContext,
        ingredient_id: IngredientId,
    ) -> ServiceResult<IngredientStock> {
        let mut tx = ctx.run("begin", self.store.begin()).await?;
        ctx.run("ingredient", tx.ingredient(ingredient_id))
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("ingredient {ingredient_id} not found")))
    }

    pub async fn list_stock(&self, ctx: &RequestContext) -> ServiceResult<Vec<IngredientStock>> {
        let mut tx = ctx.run("begin", self.store.begin()).await?;
        ctx.run("ingredients", tx.ingredients()).await
    }
}
