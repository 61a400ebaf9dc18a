//! Price Resolver.

use std::sync::Arc;

use rust_decimal::Decimal;

use pantry_catalog::MenuSnapshot;
use pantry_core::{ErrorKind, MenuItemId, ServiceError, ServiceResult, round_currency};
use pantry_orders::{LineItem, distinct_menu_items};

use crate::collaborators::Catalog;
use crate::context::RequestContext;

#[derive(Clone)]
pub struct PriceResolver {
    catalog: Arc<dyn Catalog>,
}

impl PriceResolver {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// One catalog round-trip for every distinct menu item in `ids`.
    pub async fn lookup(&self, ctx: &RequestContext, ids: &[MenuItemId]) -> ServiceResult<MenuSnapshot> {
        let found = ctx
            .run("lookup_menu_items", self.catalog.lookup_menu_items(ids))
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::Timeout => e,
                _ => ServiceError::internal(e.detail()).context("catalog lookup failed"),
            })?;
        MenuSnapshot::resolve(ids, found)
    }

    /// Overwrite each line's unit price with the catalog price and total the
    /// order, rounded half away from zero to whole currency units.
    pub fn price(snapshot: &MenuSnapshot, lines: &[LineItem]) -> ServiceResult<(Vec<LineItem>, Decimal)> {
        let mut priced = Vec::with_capacity(lines.len());
        let mut total = Decimal::ZERO;
        for line in lines {
            let item = snapshot.require(&line.menu_item_id)?;
            let mut line = line.clone();
            line.unit_price = item.unit_price;
            total = total.checked_add(line.subtotal()?).ok_or_else(|| {
                ServiceError::invalid_input("order total overflows")
            })?;
            priced.push(line);
        }
        Ok((priced, round_currency(total)))
    }

    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        lines: &[LineItem],
    ) -> ServiceResult<(Vec<LineItem>, Decimal)> {
        let snapshot = self.lookup(ctx, &distinct_menu_items(lines)).await?;
        Self::price(&snapshot, lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryCatalog;
    use pantry_catalog::MenuItem;
    use rust_decimal_macros::dec;

    fn resolver_with(items: &[MenuItem]) -> PriceResolver {
        let catalog = InMemoryCatalog::new();
        for item in items {
            catalog.upsert(item.clone()).unwrap();
        }
        PriceResolver::new(Arc::new(catalog))
    }

    #[tokio::test]
    async fn client_prices_are_overwritten_and_total_rounded() {
        let latte = MenuItem::new(MenuItemId::new(), "latte", dec!(4.25));
        let resolver = resolver_with(&[latte.clone()]);

        let mut line = LineItem::new(latte.id, 2);
        line.unit_price = dec!(0.01);
        let (priced, total) = resolver
            .resolve(&RequestContext::background(), &[line])
            .await
            .unwrap();

        assert_eq!(priced[0].unit_price, dec!(4.25));
        // 8.50 rounds half away from zero
        assert_eq!(total, dec!(9));
    }

    #[tokio::test]
    async fn unknown_menu_item_is_not_found() {
        let resolver = resolver_with(&[]);
        let err = resolver
            .resolve(&RequestContext::background(), &[LineItem::new(MenuItemId::new(), 1)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn repeated_items_are_priced_per_line() {
        let bagel = MenuItem::new(MenuItemId::new(), "bagel", dec!(2.20));
        let snapshot = MenuSnapshot::resolve(&[bagel.id], vec![bagel.clone()]).unwrap();
        let (priced, total) = PriceResolver::price(
            &snapshot,
            &[LineItem::new(bagel.id, 1), LineItem::new(bagel.id, 2)],
        )
        .unwrap();
        assert_eq!(priced.len(), 2);
        // 6.60 → 7
        assert_eq!(total, dec!(7));
    }

    #[tokio::test]
    async fn overflowing_price_is_invalid_input_not_a_panic() {
        let huge = MenuItem::new(MenuItemId::new(), "gold leaf cake", Decimal::MAX / dec!(2));
        let resolver = resolver_with(&[huge.clone()]);

        let err = resolver
            .resolve(&RequestContext::background(), &[LineItem::new(huge.id, 3)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        // Each line fits, their sum does not.
        let err = resolver
            .resolve(
                &RequestContext::background(),
                &[LineItem::new(huge.id, 1), LineItem::new(huge.id, 1), LineItem::new(huge.id, 1)],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.detail().contains("order total overflows"));
    }
}
