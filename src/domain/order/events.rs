use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::OrderStatus;

// ============================================================================
// Order Events - audit trail, written in the same transaction as the change
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    Cancelled(OrderCancelled),
    StatusChanged(OrderStatusChanged),
    PaymentCompleted(PaymentCompleted),
    PaymentFailed(PaymentDeclined),
}

impl OrderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::Cancelled(_) => "OrderCancelled",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
            OrderEvent::PaymentCompleted(_) => "PaymentCompleted",
            OrderEvent::PaymentFailed(_) => "PaymentFailed",
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Placed(e) => e.at,
            OrderEvent::Cancelled(e) => e.at,
            OrderEvent::StatusChanged(e) => e.at,
            OrderEvent::PaymentCompleted(e) => e.at,
            OrderEvent::PaymentFailed(e) => e.at,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderPlaced {
    pub total: Decimal,
    pub item_count: usize,
    pub at: DateTime<Utc>,
}

/// Stock for every item is restored when this is recorded.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCancelled {
    pub previous_status: OrderStatus,
    pub by_admin: bool,
    pub at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderStatusChanged {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentCompleted {
    pub transaction_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentDeclined {
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// An event as read back from the audit table.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedOrderEvent {
    pub id: i64,
    pub order_id: i64,
    pub event: OrderEvent,
    pub recorded_at: DateTime<Utc>,
}
