//! External collaborators consumed by the engine: the menu catalog and the
//! customer directory.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use pantry_catalog::MenuItem;
use pantry_core::{CustomerId, MenuItemId, ServiceError, ServiceResult};

/// Read access to menu items with their prices and recipes.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch the given items. Fails with `NotFound` if any id is unknown.
    async fn lookup_menu_items(&self, ids: &[MenuItemId]) -> ServiceResult<Vec<MenuItem>>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn exists(&self, customer_id: CustomerId) -> ServiceResult<bool>;
}

#[async_trait]
impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    async fn lookup_menu_items(&self, ids: &[MenuItemId]) -> ServiceResult<Vec<MenuItem>> {
        (**self).lookup_menu_items(ids).await
    }
}

#[async_trait]
impl<D> CustomerDirectory for Arc<D>
where
    D: CustomerDirectory + ?Sized,
{
    async fn exists(&self, customer_id: CustomerId) -> ServiceResult<bool> {
        (**self).exists(customer_id).await
    }
}

fn poisoned() -> ServiceError {
    ServiceError::internal("lock poisoned")
}

/// In-memory catalog.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: RwLock<HashMap<MenuItemId, MenuItem>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a menu item after validating it.
    pub fn upsert(&self, item: MenuItem) -> ServiceResult<()> {
        item.validate()?;
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items.insert(item.id, item);
        Ok(())
    }

    pub fn remove(&self, id: &MenuItemId) -> ServiceResult<Option<MenuItem>> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        Ok(items.remove(id))
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn lookup_menu_items(&self, ids: &[MenuItemId]) -> ServiceResult<Vec<MenuItem>> {
        let items = self.items.read().map_err(|_| poisoned())?;
        ids.iter()
            .map(|id| {
                items
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ServiceError::not_found(format!("menu item {id} not found")))
            })
            .collect()
    }
}

/// In-memory customer directory.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCustomerDirectory {
    customers: RwLock<HashSet<CustomerId>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, customer_id: CustomerId) -> ServiceResult<()> {
        let mut customers = self.customers.write().map_err(|_| poisoned())?;
        customers.insert(customer_id);
        Ok(())
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn exists(&self, customer_id: CustomerId) -> ServiceResult<bool> {
        let customers = self.customers.read().map_err(|_| poisoned())?;
        Ok(customers.contains(&customer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_core::ErrorKind;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn catalog_lookup_fails_on_unknown_item() {
        let catalog = InMemoryCatalog::new();
        let latte = MenuItem::new(MenuItemId::new(), "latte", dec!(4.5));
        catalog.upsert(latte.clone()).unwrap();

        let found = catalog.lookup_menu_items(&[latte.id]).await.unwrap();
        assert_eq!(found, vec![latte.clone()]);

        let err = catalog
            .lookup_menu_items(&[latte.id, MenuItemId::new()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn directory_knows_registered_customers() {
        let directory = InMemoryCustomerDirectory::new();
        let known = CustomerId::new();
        directory.register(known).unwrap();
        assert!(directory.exists(known).await.unwrap());
        assert!(!directory.exists(CustomerId::new()).await.unwrap());
    }
}
