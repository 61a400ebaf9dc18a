use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pantry_core::{Adjustments, CustomerId, MenuItemId, OrderId, ServiceError, ServiceResult};

use crate::history::OrderStatusChanged;

/// Order status lifecycle.
///
/// `Open` is the only non-terminal state; the only self-transition is
/// `Open → Open` when an order is revised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    #[serde(alias = "accepted")]
    Completed,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Completed => "completed",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Open)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!((self, next), (OrderStatus::Open, _))
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(OrderStatus::Open),
            "completed" | "accepted" => Ok(OrderStatus::Completed),
            "rejected" => Ok(OrderStatus::Rejected),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(ServiceError::invalid_input(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// One ordered quantity of a menu item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub menu_item_id: MenuItemId,
    pub count: u32,
    /// Resolved from the catalog; whatever the client sent is overwritten.
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub adjustments: Adjustments,
}

impl LineItem {
    pub fn new(menu_item_id: MenuItemId, count: u32) -> Self {
        Self {
            menu_item_id,
            count,
            unit_price: Decimal::ZERO,
            adjustments: Adjustments::new(),
        }
    }

    pub fn with_adjustments(mut self, adjustments: Adjustments) -> Self {
        self.adjustments = adjustments;
        self
    }

    /// `unit_price × count`; `InvalidInput` when the product does not fit a
    /// `Decimal`.
    pub fn subtotal(&self) -> ServiceResult<Decimal> {
        self.unit_price
            .checked_mul(Decimal::from(self.count))
            .ok_or_else(|| {
                ServiceError::invalid_input(format!(
                    "line total overflows for menu item {}",
                    self.menu_item_id
                ))
            })
    }
}

/// Menu item ids referenced by `lines`, each once, in first-seen order.
pub fn distinct_menu_items(lines: &[LineItem]) -> Vec<MenuItemId> {
    let mut ids: Vec<MenuItemId> = Vec::with_capacity(lines.len());
    for line in lines {
        if !ids.contains(&line.menu_item_id) {
            ids.push(line.menu_item_id);
        }
    }
    ids
}

/// Structural checks on line items: at least one line, every line naming a
/// menu item with a positive count.
pub fn validate_lines(lines: &[LineItem]) -> ServiceResult<()> {
    if lines.is_empty() {
        return Err(ServiceError::invalid_input(
            "at least one line item is required",
        ));
    }
    for line in lines {
        if line.menu_item_id.is_nil() {
            return Err(ServiceError::invalid_input("missing menu item id"));
        }
        if line.count == 0 {
            return Err(ServiceError::invalid_input(format!(
                "invalid item count for menu item {}",
                line.menu_item_id
            )));
        }
    }
    Ok(())
}

/// What a caller submits to create or revise an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSubmission {
    pub customer_id: CustomerId,
    pub lines: Vec<LineItem>,
}

impl OrderSubmission {
    pub fn new(customer_id: CustomerId, lines: Vec<LineItem>) -> Self {
        Self { customer_id, lines }
    }

    /// Structural validation; collaborator checks happen elsewhere.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.customer_id.is_nil() {
            return Err(ServiceError::invalid_input("customer id is required"));
        }
        validate_lines(&self.lines)
    }

    /// Distinct menu item ids, in first-seen order.
    pub fn menu_item_ids(&self) -> Vec<MenuItemId> {
        distinct_menu_items(&self.lines)
    }

    /// `(menu item, count)` pairs, one per line.
    pub fn counts(&self) -> impl Iterator<Item = (MenuItemId, u32)> + '_ {
        self.lines.iter().map(|l| (l.menu_item_id, l.count))
    }
}

/// An order and its line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub lines: Vec<LineItem>,
    pub status: OrderStatus,
    /// Σ(unit price × count), rounded to whole currency units.
    pub total: Decimal,
    /// Carries the rejection reason for rejected orders.
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A freshly admitted order in `Open` status.
    pub fn open(
        id: OrderId,
        customer_id: CustomerId,
        lines: Vec<LineItem>,
        total: Decimal,
        at: DateTime<Utc>,
    ) -> (Self, OrderStatusChanged) {
        let order = Self {
            id,
            customer_id,
            lines,
            status: OrderStatus::Open,
            total,
            note: None,
            created_at: at,
            updated_at: at,
        };
        let entry = OrderStatusChanged {
            order_id: id,
            from: None,
            to: OrderStatus::Open,
            occurred_at: at,
        };
        (order, entry)
    }

    /// A submission that never got admitted, recorded directly as `Rejected`.
    pub fn rejected(
        id: OrderId,
        submission: &OrderSubmission,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> (Self, OrderStatusChanged) {
        let order = Self {
            id,
            customer_id: submission.customer_id,
            lines: submission.lines.clone(),
            status: OrderStatus::Rejected,
            total: Decimal::ZERO,
            note: Some(reason.into()),
            created_at: at,
            updated_at: at,
        };
        let entry = OrderStatusChanged {
            order_id: id,
            from: None,
            to: OrderStatus::Rejected,
            occurred_at: at,
        };
        (order, entry)
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    fn ensure_open(&self) -> ServiceResult<()> {
        if !self.is_open() {
            return Err(ServiceError::invalid_input("order is not open"));
        }
        Ok(())
    }

    fn transition(&mut self, next: OrderStatus, at: DateTime<Utc>) -> ServiceResult<OrderStatusChanged> {
        if !self.status.can_transition_to(next) {
            return Err(ServiceError::invalid_input(format!(
                "cannot move order from {} to {next}",
                self.status
            )));
        }
        let entry = OrderStatusChanged {
            order_id: self.id,
            from: Some(self.status),
            to: next,
            occurred_at: at,
        };
        self.status = next;
        self.updated_at = at;
        Ok(entry)
    }

    /// Replace customer, lines and total of an open order (`Open → Open`).
    pub fn revise(
        &mut self,
        customer_id: CustomerId,
        lines: Vec<LineItem>,
        total: Decimal,
        at: DateTime<Utc>,
    ) -> ServiceResult<OrderStatusChanged> {
        self.ensure_open()?;
        let entry = self.transition(OrderStatus::Open, at)?;
        self.customer_id = customer_id;
        self.lines = lines;
        self.total = total;
        Ok(entry)
    }

    /// `Open → Completed`.
    pub fn complete(&mut self, at: DateTime<Utc>) -> ServiceResult<OrderStatusChanged> {
        self.ensure_open()?;
        self.note = None;
        self.transition(OrderStatus::Completed, at)
    }

    /// `Open → Rejected`, keeping `reason` in the note.
    pub fn reject(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> ServiceResult<OrderStatusChanged> {
        self.ensure_open()?;
        let entry = self.transition(OrderStatus::Rejected, at)?;
        self.note = Some(reason.into());
        Ok(entry)
    }

    /// `Open → Cancelled`. Closed orders are immutable.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> ServiceResult<OrderStatusChanged> {
        match self.status {
            OrderStatus::Open => self.transition(OrderStatus::Cancelled, at),
            OrderStatus::Completed => Err(ServiceError::invalid_input(
                "order is already closed and cannot be cancelled",
            )),
            other => Err(ServiceError::invalid_input(format!("order is already {other}"))),
        }
    }
}
