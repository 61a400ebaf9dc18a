use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use pantry_core::{IngredientId, OrderId};
use pantry_inventory::{IngredientStock, Reservation};
use pantry_orders::{LineItem, Order, OrderStatusChanged};

use super::r#trait::{Store, StoreError, StoreResult, StoreTx};

const NO_FAULT: usize = usize::MAX;

#[derive(Debug, Clone, Default)]
struct Tables {
    ingredients: BTreeMap<IngredientId, IngredientStock>,
    reservations: BTreeMap<(OrderId, IngredientId), Reservation>,
    orders: HashMap<OrderId, Order>,
    line_items: HashMap<OrderId, Vec<LineItem>>,
    history: HashMap<OrderId, Vec<OrderStatusChanged>>,
}

/// Countdown to an injected backend failure, shared by a store and its
/// transactions.
#[derive(Debug, Clone)]
struct Fault {
    what: &'static str,
    remaining: Arc<AtomicUsize>,
}

impl Fault {
    fn new(what: &'static str) -> Self {
        Self {
            what,
            remaining: Arc::new(AtomicUsize::new(NO_FAULT)),
        }
    }

    fn arm(&self, n: usize) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.remaining.store(NO_FAULT, Ordering::SeqCst);
    }

    fn take_permit(&self) -> StoreResult<()> {
        let permitted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                NO_FAULT => Some(NO_FAULT),
                0 => None,
                n => Some(n - 1),
            });
        match permitted {
            Ok(_) => Ok(()),
            Err(_) => Err(StoreError::Backend(format!("injected {} fault", self.what))),
        }
    }
}

/// In-memory transactional store.
///
/// Intended for tests/dev. A single async mutex serializes transactions; each
/// transaction mutates a private copy of the tables, which replaces the shared
/// copy on commit.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    ingredient_fault: Fault,
    order_fault: Fault,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            tables: Arc::default(),
            ingredient_fault: Fault::new("ingredient update"),
            order_fault: Fault::new("order update"),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `update_ingredient` fail with a backend error after `n` more
    /// successful calls. Used to simulate a store fault mid-commit.
    pub fn fail_ingredient_updates_after(&self, n: usize) {
        self.ingredient_fault.arm(n);
    }

    /// Make `update_order` fail with a backend error after `n` more
    /// successful calls.
    pub fn fail_order_updates_after(&self, n: usize) {
        self.order_fault.arm(n);
    }

    pub fn clear_faults(&self) {
        self.ingredient_fault.clear();
        self.order_fault.clear();
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx {
            guard,
            working,
            ingredient_fault: self.ingredient_fault.clone(),
            order_fault: self.order_fault.clone(),
        }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    ingredient_fault: Fault,
    order_fault: Fault,
}

fn header(order: &Order) -> Order {
    Order {
        lines: Vec::new(),
        ..order.clone()
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }

    async fn lock_ingredients(&mut self, _ids: &[IngredientId]) -> StoreResult<()> {
        // The whole store is already held exclusively.
        Ok(())
    }

    async fn ingredient(&mut self, id: IngredientId) -> StoreResult<Option<IngredientStock>> {
        Ok(self.working.ingredients.get(&id).cloned())
    }

    async fn ingredients(&mut self) -> StoreResult<Vec<IngredientStock>> {
        let mut all: Vec<IngredientStock> = self.working.ingredients.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn insert_ingredient(&mut self, stock: &IngredientStock) -> StoreResult<()> {
        if self.working.ingredients.contains_key(&stock.id) {
            return Err(StoreError::AlreadyExists(format!("ingredient {}", stock.id)));
        }
        self.working.ingredients.insert(stock.id, stock.clone());
        Ok(())
    }

    async fn update_ingredient(&mut self, stock: &IngredientStock) -> StoreResult<()> {
        self.ingredient_fault.take_permit()?;
        match self.working.ingredients.get_mut(&stock.id) {
            Some(row) => {
                *row = stock.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("ingredient {}", stock.id))),
        }
    }

    async fn delete_ingredient(&mut self, id: IngredientId) -> StoreResult<()> {
        self.working
            .ingredients
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("ingredient {id}")))
    }

    async fn reserved_quantity(&mut self, id: IngredientId) -> StoreResult<f64> {
        Ok(self
            .working
            .reservations
            .values()
            .filter(|r| r.ingredient_id == id)
            .map(|r| r.quantity)
            .sum())
    }

    async fn reservation_count_for_ingredient(&mut self, id: IngredientId) -> StoreResult<usize> {
        Ok(self
            .working
            .reservations
            .values()
            .filter(|r| r.ingredient_id == id)
            .count())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        let key = reservation.key();
        if self.working.reservations.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!(
                "reservation for order {} on ingredient {}",
                key.0, key.1
            )));
        }
        self.working.reservations.insert(key, reservation.clone());
        Ok(())
    }

    async fn reservations_for_order(&mut self, order_id: OrderId) -> StoreResult<Vec<Reservation>> {
        Ok(self
            .working
            .reservations
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn delete_reservations_for_order(&mut self, order_id: OrderId) -> StoreResult<usize> {
        let before = self.working.reservations.len();
        self.working.reservations.retain(|(o, _), _| *o != order_id);
        Ok(before - self.working.reservations.len())
    }

    async fn lock_order(&mut self, _id: OrderId) -> StoreResult<()> {
        // Same as lock_ingredients.
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        if self.working.orders.contains_key(&order.id) {
            return Err(StoreError::AlreadyExists(format!("order {}", order.id)));
        }
        self.working.orders.insert(order.id, header(order));
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        self.order_fault.take_permit()?;
        match self.working.orders.get_mut(&order.id) {
            Some(row) => {
                *row = header(order);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("order {}", order.id))),
        }
    }

    async fn order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn orders(&mut self) -> StoreResult<Vec<Order>> {
        let mut all: Vec<Order> = self.working.orders.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(all)
    }

    async fn delete_order(&mut self, id: OrderId) -> StoreResult<()> {
        if self.working.orders.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("order {id}")));
        }
        self.working.history.remove(&id);
        Ok(())
    }

    async fn insert_line_items(&mut self, order_id: OrderId, lines: &[LineItem]) -> StoreResult<()> {
        if !self.working.orders.contains_key(&order_id) {
            return Err(StoreError::NotFound(format!("order {order_id}")));
        }
        self.working
            .line_items
            .entry(order_id)
            .or_default()
            .extend_from_slice(lines);
        Ok(())
    }

    async fn line_items(&mut self, order_id: OrderId) -> StoreResult<Vec<LineItem>> {
        Ok(self.working.line_items.get(&order_id).cloned().unwrap_or_default())
    }

    async fn delete_line_items(&mut self, order_id: OrderId) -> StoreResult<()> {
        self.working.line_items.remove(&order_id);
        Ok(())
    }

    async fn append_status_history(&mut self, entry: &OrderStatusChanged) -> StoreResult<()> {
        self.working
            .history
            .entry(entry.order_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn status_history(&mut self, order_id: OrderId) -> StoreResult<Vec<OrderStatusChanged>> {
        Ok(self.working.history.get(&order_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_inventory::MeasureUnit;
    use rust_decimal_macros::dec;

    fn flour() -> IngredientStock {
        IngredientStock::new(IngredientId::new(), "flour", 10.0, MeasureUnit::Kilogram, dec!(1.10))
    }

    #[tokio::test]
    async fn committed_writes_are_visible_to_later_transactions() {
        let store = InMemoryStore::new();
        let stock = flour();

        let mut tx = store.begin().await.unwrap();
        tx.insert_ingredient(&stock).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.ingredient(stock.id).await.unwrap(), Some(stock));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryStore::new();
        let stock = flour();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_ingredient(&stock).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.ingredient(stock.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_fault_fails_the_nth_update() {
        let store = InMemoryStore::new();
        let mut stock = flour();

        let mut tx = store.begin().await.unwrap();
        tx.insert_ingredient(&stock).await.unwrap();
        store.fail_ingredient_updates_after(1);

        stock.on_hand = 9.0;
        tx.update_ingredient(&stock).await.unwrap();
        let err = tx.update_ingredient(&stock).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));

        store.clear_faults();
        tx.update_ingredient(&stock).await.unwrap();
    }

    #[tokio::test]
    async fn order_update_fault_leaves_ingredient_updates_alone() {
        let store = InMemoryStore::new();
        let stock = flour();
        let (order, _) = Order::open(
            OrderId::new(),
            pantry_core::CustomerId::new(),
            Vec::new(),
            dec!(0),
            chrono::Utc::now(),
        );

        let mut tx = store.begin().await.unwrap();
        tx.insert_ingredient(&stock).await.unwrap();
        tx.insert_order(&order).await.unwrap();
        store.fail_order_updates_after(0);

        let err = tx.update_order(&order).await.unwrap_err();
        assert_eq!(err, StoreError::Backend("injected order update fault".into()));
        tx.update_ingredient(&stock).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_reservation_is_rejected() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let reservation = Reservation {
            order_id: OrderId::new(),
            ingredient_id: IngredientId::new(),
            quantity: 1.0,
            reserved_at: chrono::Utc::now(),
        };
        tx.insert_reservation(&reservation).await.unwrap();
        let err = tx.insert_reservation(&reservation).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(tx.delete_reservations_for_order(reservation.order_id).await.unwrap(), 1);
        assert_eq!(tx.delete_reservations_for_order(reservation.order_id).await.unwrap(), 0);
    }
}
