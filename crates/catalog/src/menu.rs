use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pantry_core::{IngredientId, MenuItemId, ServiceError, ServiceResult};
use pantry_inventory::IngredientRequirements;

/// Quantity of one ingredient consumed per unit of a menu item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientRequirement {
    pub ingredient_id: IngredientId,
    pub per_unit: f64,
}

/// A sellable menu item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub name: String,
    /// Current catalog price per unit. The only price the engine trusts.
    pub unit_price: Decimal,
    pub ingredients: Vec<IngredientRequirement>,
}

impl MenuItem {
    pub fn new(id: MenuItemId, name: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            unit_price,
            ingredients: Vec::new(),
        }
    }

    pub fn with_ingredient(mut self, ingredient_id: IngredientId, per_unit: f64) -> Self {
        self.ingredients.push(IngredientRequirement {
            ingredient_id,
            per_unit,
        });
        self
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::invalid_input("menu item name is required"));
        }
        if self.unit_price <= Decimal::ZERO {
            return Err(ServiceError::invalid_input(
                "unit price must be greater than 0",
            ));
        }
        for req in &self.ingredients {
            if !req.per_unit.is_finite() || req.per_unit <= 0.0 {
                return Err(ServiceError::invalid_input(format!(
                    "ingredient {} quantity must be greater than 0",
                    req.ingredient_id
                )));
            }
        }
        Ok(())
    }
}

/// The menu items referenced by one request, as read from the catalog.
///
/// Built per call and discarded afterwards; never cached across requests.
#[derive(Debug, Clone, Default)]
pub struct MenuSnapshot {
    items: HashMap<MenuItemId, MenuItem>,
}

impl MenuSnapshot {
    /// Build a snapshot, failing with `NotFound` if any requested id is missing.
    pub fn resolve(requested: &[MenuItemId], found: Vec<MenuItem>) -> ServiceResult<Self> {
        let items: HashMap<MenuItemId, MenuItem> =
            found.into_iter().map(|item| (item.id, item)).collect();

        if let Some(missing) = requested.iter().find(|id| !items.contains_key(id)) {
            return Err(ServiceError::not_found(format!("menu item {missing} not found")));
        }

        Ok(Self { items })
    }

    pub fn get(&self, id: &MenuItemId) -> Option<&MenuItem> {
        self.items.get(id)
    }

    /// Look up an item that must be present.
    pub fn require(&self, id: &MenuItemId) -> ServiceResult<&MenuItem> {
        self.items
            .get(id)
            .ok_or_else(|| ServiceError::not_found(format!("menu item {id} not found")))
    }

    /// Ingredient requirements for `(menu item, count)` pairs:
    /// `per_unit * count`, summed across items that share an ingredient.
    pub fn requirements_for<I>(&self, lines: I) -> ServiceResult<IngredientRequirements>
    where
        I: IntoIterator<Item = (MenuItemId, u32)>,
    {
        let mut reqs = IngredientRequirements::new();
        for (menu_item_id, count) in lines {
            let item = self.require(&menu_item_id)?;
            for ingredient in &item.ingredients {
                reqs.add(ingredient.ingredient_id, ingredient.per_unit * f64::from(count));
            }
        }
        Ok(reqs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_core::ErrorKind;
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_reports_missing_items_as_not_found() {
        let known = MenuItem::new(MenuItemId::new(), "latte", dec!(4.50));
        let unknown = MenuItemId::new();

        let err = MenuSnapshot::resolve(&[known.id, unknown], vec![known]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.detail().contains(&unknown.to_string()));
    }

    #[test]
    fn requirements_multiply_by_count_and_sum_shared_ingredients() {
        let milk = IngredientId::new();
        let coffee = IngredientId::new();
        let latte = MenuItem::new(MenuItemId::new(), "latte", dec!(4.50))
            .with_ingredient(milk, 0.2)
            .with_ingredient(coffee, 0.018);
        let flat_white = MenuItem::new(MenuItemId::new(), "flat white", dec!(4.00))
            .with_ingredient(milk, 0.15);

        let snapshot =
            MenuSnapshot::resolve(&[latte.id, flat_white.id], vec![latte.clone(), flat_white.clone()])
                .unwrap();
        let reqs = snapshot
            .requirements_for([(latte.id, 2), (flat_white.id, 1)])
            .unwrap();

        assert!((reqs.get(&milk).unwrap() - 0.55).abs() < 1e-12);
        assert!((reqs.get(&coffee).unwrap() - 0.036).abs() < 1e-12);
    }

    #[test]
    fn items_without_recipe_require_nothing() {
        let water = MenuItem::new(MenuItemId::new(), "tap water", dec!(1));
        let snapshot = MenuSnapshot::resolve(&[water.id], vec![water.clone()]).unwrap();
        let reqs = snapshot.requirements_for([(water.id, 5)]).unwrap();
        assert!(reqs.is_empty());
    }

    #[test]
    fn validate_requires_positive_price_and_quantities() {
        let item = MenuItem::new(MenuItemId::new(), "latte", dec!(0));
        assert!(item.validate().is_err());

        let item = MenuItem::new(MenuItemId::new(), "latte", dec!(3))
            .with_ingredient(IngredientId::new(), 0.0);
        assert!(item.validate().is_err());
    }
}
