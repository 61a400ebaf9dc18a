//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | PostgreSQL code | `StoreError` | Scenario |
//! |-----------------|--------------|----------|
//! | `23505` | `AlreadyExists` | duplicate order, ingredient or reservation |
//! | `40001` | `Conflict` | serialization failure |
//! | `40P01` | `Conflict` | deadlock detected |
//! | other / non-database | `Backend` | network, pool, decode failures |
//!
//! ## Locking
//!
//! `lock_ingredients` issues `SELECT … ORDER BY id FOR UPDATE`, so two
//! transactions that touch overlapping ingredient sets acquire row locks in
//! the same order and simply queue behind each other. Status transitions
//! take `lock_order` first, so two transactions can never both act on the
//! same `open` order.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use pantry_core::{Adjustments, CustomerId, IngredientId, MenuItemId, OrderId};
use pantry_inventory::{IngredientStock, MeasureUnit, Reservation};
use pantry_orders::{LineItem, Order, OrderStatus, OrderStatusChanged};

use super::r#trait::{Store, StoreError, StoreResult, StoreTx};

const SCHEMA: &str = include_str!("../../migrations/0001_engine.sql");

/// Postgres-backed transactional store.
///
/// Uses a SQLx connection pool (`Send + Sync`); each [`Store::begin`] checks
/// out one connection for the lifetime of the transaction.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the engine tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresTx { tx }))
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }

    async fn lock_ingredients(&mut self, ids: &[IngredientId]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        sqlx::query("SELECT id FROM ingredients WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_ingredients", e))?;
        Ok(())
    }

    async fn ingredient(&mut self, id: IngredientId) -> StoreResult<Option<IngredientStock>> {
        let row = sqlx::query(
            "SELECT id, name, on_hand, unit, unit_cost FROM ingredients WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("ingredient", e))?;
        row.as_ref().map(ingredient_from_row).transpose()
    }

    async fn ingredients(&mut self) -> StoreResult<Vec<IngredientStock>> {
        let rows = sqlx::query(
            "SELECT id, name, on_hand, unit, unit_cost FROM ingredients ORDER BY name ASC, id ASC",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("ingredients", e))?;
        rows.iter().map(ingredient_from_row).collect()
    }

    async fn insert_ingredient(&mut self, stock: &IngredientStock) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ingredients (id, name, on_hand, unit, unit_cost)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(stock.id.as_uuid())
        .bind(&stock.name)
        .bind(stock.on_hand)
        .bind(stock.unit.as_str())
        .bind(stock.unit_cost)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_ingredient", e))?;
        Ok(())
    }

    async fn update_ingredient(&mut self, stock: &IngredientStock) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE ingredients
            SET name = $2, on_hand = $3, unit = $4, unit_cost = $5
            WHERE id = $1
            "#,
        )
        .bind(stock.id.as_uuid())
        .bind(&stock.name)
        .bind(stock.on_hand)
        .bind(stock.unit.as_str())
        .bind(stock.unit_cost)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_ingredient", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("ingredient {}", stock.id)));
        }
        Ok(())
    }

    async fn delete_ingredient(&mut self, id: IngredientId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM ingredients WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_ingredient", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("ingredient {id}")));
        }
        Ok(())
    }

    async fn reserved_quantity(&mut self, id: IngredientId) -> StoreResult<f64> {
        let total: Option<f64> =
            sqlx::query_scalar("SELECT SUM(quantity) FROM reservations WHERE ingredient_id = $1")
                .bind(id.as_uuid())
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("reserved_quantity", e))?;
        Ok(total.unwrap_or(0.0))
    }

    async fn reservation_count_for_ingredient(&mut self, id: IngredientId) -> StoreResult<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE ingredient_id = $1")
                .bind(id.as_uuid())
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("reservation_count_for_ingredient", e))?;
        usize::try_from(count).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reservations (order_id, ingredient_id, quantity, reserved_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(reservation.order_id.as_uuid())
        .bind(reservation.ingredient_id.as_uuid())
        .bind(reservation.quantity)
        .bind(reservation.reserved_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_reservation", e))?;
        Ok(())
    }

    async fn reservations_for_order(&mut self, order_id: OrderId) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, ingredient_id, quantity, reserved_at
            FROM reservations
            WHERE order_id = $1
            ORDER BY ingredient_id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("reservations_for_order", e))?;

        rows.iter()
            .map(|row| {
                Ok(Reservation {
                    order_id: OrderId::from_uuid(get(row, "order_id")?),
                    ingredient_id: IngredientId::from_uuid(get(row, "ingredient_id")?),
                    quantity: get(row, "quantity")?,
                    reserved_at: get(row, "reserved_at")?,
                })
            })
            .collect()
    }

    async fn delete_reservations_for_order(&mut self, order_id: OrderId) -> StoreResult<usize> {
        let result = sqlx::query("DELETE FROM reservations WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_reservations_for_order", e))?;
        usize::try_from(result.rows_affected()).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn lock_order(&mut self, id: OrderId) -> StoreResult<()> {
        sqlx::query("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order", e))?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status, total, note, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total)
        .bind(order.note.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET customer_id = $2, status = $3, total = $4, note = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total)
        .bind(order.note.as_deref())
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("order {}", order.id)));
        }
        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, status, total, note, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("order", e))?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn orders(&mut self) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, status, total, note, created_at, updated_at
            FROM orders
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("orders", e))?;
        rows.iter().map(order_from_row).collect()
    }

    async fn delete_order(&mut self, id: OrderId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("order {id}")));
        }
        Ok(())
    }

    async fn insert_line_items(&mut self, order_id: OrderId, lines: &[LineItem]) -> StoreResult<()> {
        let next: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM order_line_items WHERE order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_line_items", e))?;

        for (offset, line) in lines.iter().enumerate() {
            let position = i32::try_from(offset)
                .ok()
                .and_then(|o| o.checked_add(next))
                .ok_or_else(|| StoreError::Backend("line item position overflow".into()))?;
            let count = i32::try_from(line.count)
                .map_err(|_| StoreError::Backend(format!("line item count {} out of range", line.count)))?;

            sqlx::query(
                r#"
                INSERT INTO order_line_items
                    (order_id, position, menu_item_id, count, unit_price, adjustments)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order_id.as_uuid())
            .bind(position)
            .bind(line.menu_item_id.as_uuid())
            .bind(count)
            .bind(line.unit_price)
            .bind(Json(&line.adjustments))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_line_items", e))?;
        }
        Ok(())
    }

    async fn line_items(&mut self, order_id: OrderId) -> StoreResult<Vec<LineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT menu_item_id, count, unit_price, adjustments
            FROM order_line_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("line_items", e))?;

        rows.iter()
            .map(|row| {
                let count: i32 = get(row, "count")?;
                let Json(adjustments): Json<Adjustments> = get(row, "adjustments")?;
                Ok(LineItem {
                    menu_item_id: MenuItemId::from_uuid(get(row, "menu_item_id")?),
                    count: u32::try_from(count)
                        .map_err(|_| StoreError::Backend(format!("stored count {count} is negative")))?,
                    unit_price: get(row, "unit_price")?,
                    adjustments,
                })
            })
            .collect()
    }

    async fn delete_line_items(&mut self, order_id: OrderId) -> StoreResult<()> {
        sqlx::query("DELETE FROM order_line_items WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_line_items", e))?;
        Ok(())
    }

    async fn append_status_history(&mut self, entry: &OrderStatusChanged) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, from_status, to_status, occurred_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.order_id.as_uuid())
        .bind(entry.from.map(OrderStatus::as_str))
        .bind(entry.to.as_str())
        .bind(entry.occurred_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_status_history", e))?;
        Ok(())
    }

    async fn status_history(&mut self, order_id: OrderId) -> StoreResult<Vec<OrderStatusChanged>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, from_status, to_status, occurred_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("status_history", e))?;

        rows.iter()
            .map(|row| {
                let from: Option<String> = get(row, "from_status")?;
                let to: String = get(row, "to_status")?;
                Ok(OrderStatusChanged {
                    order_id: OrderId::from_uuid(get(row, "order_id")?),
                    from: from.as_deref().map(parse_status).transpose()?,
                    to: parse_status(&to)?,
                    occurred_at: get(row, "occurred_at")?,
                })
            })
            .collect()
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {column}: {e}")))
}

fn parse_status(raw: &str) -> StoreResult<OrderStatus> {
    OrderStatus::from_str(raw).map_err(|e| StoreError::Backend(e.to_string()))
}

fn ingredient_from_row(row: &PgRow) -> StoreResult<IngredientStock> {
    let unit: String = get(row, "unit")?;
    let unit_cost: Decimal = get(row, "unit_cost")?;
    Ok(IngredientStock {
        id: IngredientId::from_uuid(get(row, "id")?),
        name: get(row, "name")?,
        on_hand: get(row, "on_hand")?,
        unit: MeasureUnit::from_str(&unit).map_err(|e| StoreError::Backend(e.to_string()))?,
        unit_cost,
    })
}

fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    let status: String = get(row, "status")?;
    let created_at: DateTime<Utc> = get(row, "created_at")?;
    let updated_at: DateTime<Utc> = get(row, "updated_at")?;
    Ok(Order {
        id: OrderId::from_uuid(get(row, "id")?),
        customer_id: CustomerId::from_uuid(get(row, "customer_id")?),
        lines: Vec::new(),
        status: parse_status(&status)?,
        total: get(row, "total")?,
        note: get(row, "note")?,
        created_at,
        updated_at,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::AlreadyExists(msg),
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("no row returned in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
