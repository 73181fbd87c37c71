use super::value_objects::OrderStatus;
use crate::utils::IsTransient;

// ============================================================================
// Order Errors
// ============================================================================
//
// Business-rule kinds are reported to the caller as-is and never retried.
// `Storage` wraps infrastructure failures; only some of those are transient.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for {product}")]
    InsufficientStock { product: String },

    /// Also returned when the order belongs to another user.
    #[error("Order not found")]
    NotFound,

    #[error("Order cannot be cancelled in status: {0}")]
    CannotCancel(OrderStatus),

    #[error("Order has already been paid")]
    AlreadyPaid,

    #[error("Payment failed: {reason}")]
    PaymentFailed { reason: String },

    #[error("Order amount is out of range")]
    AmountOverflow,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Stored order data is corrupt: {0}")]
    Corrupt(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl OrderError {
    pub fn is_business_rule(&self) -> bool {
        !matches!(self, OrderError::Corrupt(_) | OrderError::Storage(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::EmptyCart => "empty_cart",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::NotFound => "not_found",
            OrderError::CannotCancel(_) => "cannot_cancel",
            OrderError::AlreadyPaid => "already_paid",
            OrderError::PaymentFailed { .. } => "payment_failed",
            OrderError::AmountOverflow => "amount_overflow",
            OrderError::InvalidStatusTransition { .. } => "invalid_transition",
            OrderError::Corrupt(_) => "corrupt",
            OrderError::Storage(_) => "storage",
        }
    }
}

// SQLite primary result codes for lock contention.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        match self {
            OrderError::Storage(sqlx::Error::PoolTimedOut) => true,
            OrderError::Storage(sqlx::Error::Io(_)) => true,
            OrderError::Storage(sqlx::Error::Database(db)) => {
                // Extended codes (e.g. 517 BUSY_SNAPSHOT) keep the primary code in the low byte.
                let primary = db.code().and_then(|code| code.parse::<i32>().ok()).map(|c| c & 0xff);
                matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
            }
            _ => false,
        }
    }
}
