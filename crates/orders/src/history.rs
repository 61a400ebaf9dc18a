use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pantry_core::OrderId;
use pantry_events::Event;

use crate::order::OrderStatus;

/// Status-history record: one per transition, including `open → open` on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    /// `None` for the record written when the order is first persisted.
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

impl Event for OrderStatusChanged {
    fn event_type(&self) -> &'static str {
        match self.to {
            OrderStatus::Open if self.from.is_none() => "order.opened",
            OrderStatus::Open => "order.revised",
            OrderStatus::Completed => "order.completed",
            OrderStatus::Rejected => "order.rejected",
            OrderStatus::Cancelled => "order.cancelled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
