//! Reservation Engine: the only writer of reservation rows.
//!
//! Every method works inside a transaction owned by the caller. Check-then-
//! reserve and commit are only safe when the caller runs them in one
//! transaction after [`ReservationEngine::lock`].

use chrono::{DateTime, Utc};
use tracing::debug;

use pantry_core::{OrderId, ServiceError, ServiceResult};
use pantry_inventory::{IngredientRequirements, Reservation, Shortfall};

use crate::context::RequestContext;
use crate::ledger::StockLedger;
use crate::store::StoreTx;

#[derive(Clone)]
pub struct ReservationEngine {
    ledger: StockLedger,
}

impl ReservationEngine {
    pub fn new(ledger: StockLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    /// Row-lock every ingredient named by `requirements`.
    pub async fn lock(
        &self,
        ctx: &RequestContext,
        tx: &mut dyn StoreTx,
        requirements: &IngredientRequirements,
    ) -> ServiceResult<()> {
        let ids = requirements.ingredient_ids();
        ctx.run("lock_ingredients", tx.lock_ingredients(&ids)).await
    }

    /// First ingredient (ascending id) whose balance cannot cover its requirement.
    pub async fn shortfall(
        &self,
        ctx: &RequestContext,
        tx: &mut dyn StoreTx,
        requirements: &IngredientRequirements,
    ) -> ServiceResult<Option<Shortfall>> {
        for (ingredient_id, required) in requirements.iter() {
            if required <= pantry_inventory::QUANTITY_EPSILON {
                continue;
            }
            let available = self.ledger.balance_in(ctx, tx, ingredient_id).await?;
            if let Some(short) = requirements.shortfall(ingredient_id, available) {
                debug!(%short, "insufficient stock");
                return Ok(Some(short));
            }
        }
        Ok(None)
    }

    /// `false` when any ingredient is short. Not an error.
    pub async fn check_availability(
        &self,
        ctx: &RequestContext,
        tx: &mut dyn StoreTx,
        requirements: &IngredientRequirements,
    ) -> ServiceResult<bool> {
        Ok(self.shortfall(ctx, tx, requirements).await?.is_none())
    }

    /// Lock, then fail with `InventoryNotAvailable` on the first shortfall.
    pub async fn ensure_available(
        &self,
        ctx: &RequestContext,
        tx: &mut dyn StoreTx,
        requirements: &IngredientRequirements,
    ) -> ServiceResult<()> {
        self.lock(ctx, tx, requirements).await?;
        match self.shortfall(ctx, tx, requirements).await? {
            None => Ok(()),
            Some(short) => Err(ServiceError::inventory_not_available(short.to_string())),
        }
    }

    /// Insert one reservation row per ingredient with a positive requirement.
    pub async fn reserve(
        &self,
        ctx: &RequestContext,
        tx: &mut dyn StoreTx,
        order_id: OrderId,
        requirements: &IngredientRequirements,
        at: DateTime<Utc>,
    ) -> ServiceResult<Vec<Reservation>> {
        let rows = requirements.to_reservations(order_id, at);
        for row in &rows {
            ctx.run("insert_reservation", tx.insert_reservation(row))
                .await?;
        }
        debug!(%order_id, rows = rows.len(), "stock reserved");
        Ok(rows)
    }

    /// Drop every reservation of the order. A no-op when there are none.
    pub async fn release(
        &self,
        ctx: &RequestContext,
        tx: &mut dyn StoreTx,
        order_id: OrderId,
    ) -> ServiceResult<usize> {
        let released = ctx
            .run("delete_reservations_for_order", tx.delete_reservations_for_order(order_id))
            .await?;
        debug!(%order_id, released, "reservations released");
        Ok(released)
    }

    /// Turn the order's reservations into permanent deductions, then release
    /// them. Returns the reservations that were consumed.
    ///
    /// Atomic only together with the caller's transaction: any failure must
    /// be followed by dropping `tx`.
    pub async fn commit(
        &self,
        ctx: &RequestContext,
        tx: &mut dyn StoreTx,
        order_id: OrderId,
    ) -> ServiceResult<Vec<Reservation>> {
        let reservations = ctx
            .run("reservations_for_order", tx.reservations_for_order(order_id))
            .await?;

        let requirements: IngredientRequirements = reservations
            .iter()
            .map(|r| (r.ingredient_id, r.quantity))
            .collect();
        self.lock(ctx, tx, &requirements).await?;

        for reservation in &reservations {
            self.ledger
                .deduct(ctx, tx, reservation.ingredient_id, reservation.quantity)
                .await?;
        }
        self.release(ctx, tx, order_id).await?;
        Ok(reservations)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ledger::StockAdjustment;
    use crate::store::{InMemoryStore, Store};
    use pantry_core::{ErrorKind, IngredientId};
    use pantry_inventory::{IngredientStock, MeasureUnit};
    use rust_decimal_macros::dec;

    async fn engine_with(stock: &[IngredientStock]) -> (ReservationEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let ledger = StockLedger::new(store.clone());
        let ctx = RequestContext::background();
        for s in stock {
            ledger.adjust(&ctx, StockAdjustment::Create(s.clone())).await.unwrap();
        }
        (ReservationEngine::new(ledger), store)
    }

    fn stock(name: &str, on_hand: f64) -> IngredientStock {
        IngredientStock::new(IngredientId::new(), name, on_hand, MeasureUnit::Kilogram, dec!(1))
    }

    #[tokio::test]
    async fn check_then_reserve_reduces_balance() {
        let flour = stock("flour", 10.0);
        let (engine, store) = engine_with(&[flour.clone()]).await;
        let ctx = RequestContext::background();
        let reqs: IngredientRequirements = [(flour.id, 4.0)].into_iter().collect();

        let mut tx = store.begin().await.unwrap();
        engine.ensure_available(&ctx, tx.as_mut(), &reqs).await.unwrap();
        engine
            .reserve(&ctx, tx.as_mut(), OrderId::new(), &reqs, Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let balance = engine.ledger().available_balance(&ctx, flour.id).await.unwrap();
        assert_eq!(balance, 6.0);

        let too_much: IngredientRequirements = [(flour.id, 7.0)].into_iter().collect();
        let mut tx = store.begin().await.unwrap();
        assert!(!engine.check_availability(&ctx, tx.as_mut(), &too_much).await.unwrap());
        let err = engine
            .ensure_available(&ctx, tx.as_mut(), &too_much)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InventoryNotAvailable);
    }

    #[tokio::test]
    async fn unknown_ingredient_counts_as_unavailable() {
        let (engine, store) = engine_with(&[]).await;
        let ctx = RequestContext::background();
        let reqs: IngredientRequirements = [(IngredientId::new(), 0.5)].into_iter().collect();

        let mut tx = store.begin().await.unwrap();
        assert!(!engine.check_availability(&ctx, tx.as_mut(), &reqs).await.unwrap());
    }

    #[tokio::test]
    async fn zero_requirement_is_always_admissible() {
        let (engine, store) = engine_with(&[]).await;
        let ctx = RequestContext::background();
        let reqs = IngredientRequirements::new();

        let mut tx = store.begin().await.unwrap();
        engine.ensure_available(&ctx, tx.as_mut(), &reqs).await.unwrap();
        let rows = engine
            .reserve(&ctx, tx.as_mut(), OrderId::new(), &reqs, Utc::now())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let flour = stock("flour", 10.0);
        let (engine, store) = engine_with(&[flour.clone()]).await;
        let ctx = RequestContext::background();
        let order_id = OrderId::new();
        let reqs: IngredientRequirements = [(flour.id, 3.0)].into_iter().collect();

        let mut tx = store.begin().await.unwrap();
        engine.reserve(&ctx, tx.as_mut(), order_id, &reqs, Utc::now()).await.unwrap();
        assert_eq!(engine.release(&ctx, tx.as_mut(), order_id).await.unwrap(), 1);
        assert_eq!(engine.release(&ctx, tx.as_mut(), order_id).await.unwrap(), 0);
        tx.commit().await.unwrap();

        assert_eq!(engine.ledger().available_balance(&ctx, flour.id).await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn commit_deducts_and_releases() {
        let flour = stock("flour", 10.0);
        let milk = stock("milk", 2.0);
        let (engine, store) = engine_with(&[flour.clone(), milk.clone()]).await;
        let ctx = RequestContext::background();
        let order_id = OrderId::new();
        let reqs: IngredientRequirements = [(flour.id, 4.0), (milk.id, 0.5)].into_iter().collect();

        let mut tx = store.begin().await.unwrap();
        engine.reserve(&ctx, tx.as_mut(), order_id, &reqs, Utc::now()).await.unwrap();
        let consumed = engine.commit(&ctx, tx.as_mut(), order_id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(consumed.len(), 2);
        let ledger = engine.ledger();
        assert_eq!(ledger.stock(&ctx, flour.id).await.unwrap().on_hand, 6.0);
        assert_eq!(ledger.stock(&ctx, milk.id).await.unwrap().on_hand, 1.5);
        assert_eq!(ledger.available_balance(&ctx, flour.id).await.unwrap(), 6.0);
    }
}
