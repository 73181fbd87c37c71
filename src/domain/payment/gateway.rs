use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::order::Order;

/// Card number that the sentinel gateway always declines.
pub const DECLINE_SENTINEL: &str = "4000000000000002";

/// Card data supplied with a payment attempt. Never persisted.
#[derive(Clone, Default, Deserialize)]
pub struct PaymentDetails {
    pub card_number: Option<String>,
    pub card_holder: Option<String>,
    pub expiry: Option<String>,
    pub cvv: Option<String>,
}

impl PaymentDetails {
    pub fn card(number: impl Into<String>) -> Self {
        Self {
            card_number: Some(number.into()),
            ..Self::default()
        }
    }

    fn masked_number(&self) -> Option<String> {
        self.card_number.as_ref().map(|number| {
            let digits: Vec<char> = number.chars().collect();
            let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
            format!("****{tail}")
        })
    }
}

impl fmt::Debug for PaymentDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentDetails")
            .field("card_number", &self.masked_number())
            .field("card_holder", &self.card_holder)
            .field("expiry", &self.expiry.as_ref().map(|_| "**/**"))
            .field("cvv", &self.cvv.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentDecision {
    Approved,
    Declined { reason: String },
}

/// Authorizes a charge for an order.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(&self, order: &Order, details: &PaymentDetails) -> PaymentDecision;
}

/// Deterministic gateway for development and tests: declines exactly
/// [`DECLINE_SENTINEL`] and approves everything else, including a missing
/// card number.
#[derive(Debug, Default, Clone, Copy)]
pub struct SentinelCardGateway;

#[async_trait]
impl PaymentGateway for SentinelCardGateway {
    async fn authorize(&self, order: &Order, details: &PaymentDetails) -> PaymentDecision {
        if details.card_number.as_deref() == Some(DECLINE_SENTINEL) {
            tracing::debug!(order_id = order.id, "Sentinel card declined");
            return PaymentDecision::Declined {
                reason: "Card declined".to_string(),
            };
        }
        PaymentDecision::Approved
    }
}
