use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Order Value Objects
// ============================================================================

/// Structured postal address, stored as a JSON column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Customers may cancel only before the order ships.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Transition table for status changes.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    /// Reserved; nothing transitions here yet.
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a product at purchase time. Never re-read from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i64,
}

impl OrderItem {
    /// `unit_price × quantity`, or `None` when it does not fit in a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart line joined with the live product it references.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i64,
    /// `None` when the product no longer exists.
    pub product: Option<LiveProduct>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveProduct {
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
}

/// Caller-supplied checkout details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ALL_STATUSES: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn test_order_status_serializes_lowercase() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");

        let parsed: PaymentStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, PaymentStatus::Completed);
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let terminal: Vec<_> = ALL_STATUSES
            .iter()
            .filter(|from| ALL_STATUSES.iter().all(|to| !from.can_transition_to(*to)))
            .collect();
        assert_eq!(terminal, vec![&OrderStatus::Delivered, &OrderStatus::Cancelled]);
    }

    #[test]
    fn test_only_pending_and_processing_are_cancellable() {
        let cancellable: Vec<_> = ALL_STATUSES
            .iter()
            .filter(|s| s.is_cancellable())
            .collect();
        assert_eq!(cancellable, vec![&OrderStatus::Pending, &OrderStatus::Processing]);
    }

    #[test]
    fn test_transition_table_moves_forward_only() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));

        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));

        for status in ALL_STATUSES {
            assert!(!OrderStatus::Cancelled.can_transition_to(status));
            assert!(!OrderStatus::Delivered.can_transition_to(status));
        }
    }

    #[test]
    fn test_address_optional_fields_are_omitted() {
        let address = Address {
            name: None,
            street: "1 Market St".to_string(),
            city: "Springfield".to_string(),
            state: "OR".to_string(),
            postal_code: "97477".to_string(),
            country: "US".to_string(),
            phone: None,
        };

        let json = serde_json::to_value(&address).unwrap();
        assert!(json.get("name").is_none());
        assert_eq!(json["postal_code"], "97477");
    }

    #[test]
    fn test_line_total() {
        let item = OrderItem {
            product_id: 1,
            product_name: "Mug".to_string(),
            unit_price: dec!(12.50),
            quantity: 3,
        };
        assert_eq!(item.line_total(), Some(dec!(37.50)));
    }

    #[test]
    fn test_line_total_overflow_is_none() {
        let item = OrderItem {
            product_id: 1,
            product_name: "Everything".to_string(),
            unit_price: Decimal::MAX,
            quantity: 2,
        };
        assert_eq!(item.line_total(), None);
    }
}
