use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use pantry_core::{IngredientId, OrderId, ServiceError};
use pantry_inventory::{IngredientStock, Reservation};
use pantry_orders::{LineItem, Order, OrderStatusChanged};

pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation error.
///
/// These are infrastructure failures. Business outcomes (insufficient stock,
/// order not open) never come out of the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("row not found: {0}")]
    NotFound(String),

    #[error("row already exists: {0}")]
    AlreadyExists(String),

    /// Serialization failure or deadlock; the transaction was aborted.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(msg) => ServiceError::not_found(msg),
            StoreError::AlreadyExists(msg) => ServiceError::already_exists(msg),
            StoreError::Conflict(msg) => ServiceError::internal(format!("transaction conflict: {msg}")),
            StoreError::Backend(msg) => ServiceError::internal(msg),
        }
    }
}

/// Transactional durable store.
///
/// Every engine operation runs inside one transaction obtained from
/// [`Store::begin`]. Implementations must give each transaction at least
/// serializable behaviour for rows locked with
/// [`StoreTx::lock_ingredients`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

#[async_trait]
impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        (**self).begin().await
    }
}

/// An open transaction.
///
/// Dropping the handle without calling [`StoreTx::commit`] rolls back every
/// write made through it.
///
/// Order rows are headers only: `Order::lines` is neither written by
/// `insert_order`/`update_order` nor filled in by `order`/`orders`. Line
/// items live in their own table.
#[async_trait]
pub trait StoreTx: Send {
    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;

    // ingredients

    /// Exclusively lock the given ingredient rows until the transaction ends.
    ///
    /// Locks are taken in ascending id order regardless of input order.
    /// Unknown ids are ignored.
    async fn lock_ingredients(&mut self, ids: &[IngredientId]) -> StoreResult<()>;
    async fn ingredient(&mut self, id: IngredientId) -> StoreResult<Option<IngredientStock>>;
    /// All ingredients, ordered by name.
    async fn ingredients(&mut self) -> StoreResult<Vec<IngredientStock>>;
    async fn insert_ingredient(&mut self, stock: &IngredientStock) -> StoreResult<()>;
    async fn update_ingredient(&mut self, stock: &IngredientStock) -> StoreResult<()>;
    async fn delete_ingredient(&mut self, id: IngredientId) -> StoreResult<()>;

    // reservations

    /// Σ reserved quantity across every order for one ingredient.
    async fn reserved_quantity(&mut self, id: IngredientId) -> StoreResult<f64>;
    async fn reservation_count_for_ingredient(&mut self, id: IngredientId) -> StoreResult<usize>;
    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()>;
    async fn reservations_for_order(&mut self, order_id: OrderId) -> StoreResult<Vec<Reservation>>;
    /// Returns how many rows were removed.
    async fn delete_reservations_for_order(&mut self, order_id: OrderId) -> StoreResult<usize>;

    // orders

    /// Exclusively lock one order row until the transaction ends, so status
    /// checks on it cannot race another transaction's transition. Unknown ids
    /// are ignored.
    async fn lock_order(&mut self, id: OrderId) -> StoreResult<()>;
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;
    async fn update_order(&mut self, order: &Order) -> StoreResult<()>;
    async fn order(&mut self, id: OrderId) -> StoreResult<Option<Order>>;
    /// All order headers, newest first.
    async fn orders(&mut self) -> StoreResult<Vec<Order>>;
    async fn delete_order(&mut self, id: OrderId) -> StoreResult<()>;

    // line items

    async fn insert_line_items(&mut self, order_id: OrderId, lines: &[LineItem]) -> StoreResult<()>;
    /// Line items in their original order.
    async fn line_items(&mut self, order_id: OrderId) -> StoreResult<Vec<LineItem>>;
    async fn delete_line_items(&mut self, order_id: OrderId) -> StoreResult<()>;

    // status history

    async fn append_status_history(&mut self, entry: &OrderStatusChanged) -> StoreResult<()>;
    async fn status_history(&mut self, order_id: OrderId) -> StoreResult<Vec<OrderStatusChanged>>;
}
