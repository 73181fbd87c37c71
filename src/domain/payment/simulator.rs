use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::gateway::{PaymentDecision, PaymentDetails, PaymentGateway};
use crate::domain::order::ledger::{note_retry, observe, save_changes};
use crate::domain::order::{Order, OrderCommand, OrderError, OrderEvent, PaymentOutcome};
use crate::metrics::Metrics;
use crate::store::{orders, Store};
use crate::utils::{retry_on_transient, Clock, RetryConfig};

// ============================================================================
// Payment Simulator
// ============================================================================
//
// Settles a single order against a `PaymentGateway`. Touches only that
// order's payment state; stock and carts are never involved.
//
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub order: Order,
}

pub struct PaymentSimulator {
    store: Store,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl PaymentSimulator {
    pub fn new(store: Store, gateway: Arc<dyn PaymentGateway>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            gateway,
            clock,
            retry: RetryConfig::default(),
            metrics: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Charge an order owned by `user_id`.
    ///
    /// A declined charge is recorded on the order (payment status `failed`)
    /// before `OrderError::PaymentFailed` is returned, so the attempt stays
    /// visible and can be retried.
    pub async fn process_payment(
        &self,
        user_id: i64,
        order_id: i64,
        details: &PaymentDetails,
    ) -> Result<PaymentReceipt, OrderError> {
        let started = Instant::now();

        let result = retry_on_transient(&self.retry, "process_payment", move |attempt| {
            note_retry(self.metrics.as_deref(), "process_payment", attempt);
            self.try_process_payment(user_id, order_id, details)
        })
        .await
        .into_result();

        let result = result.and_then(|(order, events, outcome)| {
            if let Some(metrics) = &self.metrics {
                metrics.record_order_events(&events);
            }

            match outcome {
                PaymentOutcome::Approved { transaction_id } => {
                    tracing::info!(
                        order_id = order.id,
                        user_id = user_id,
                        transaction_id = %transaction_id,
                        status = %order.status,
                        "Payment completed"
                    );
                    Ok(PaymentReceipt { transaction_id, order })
                }
                PaymentOutcome::Declined { reason } => {
                    tracing::warn!(order_id = order.id, user_id = user_id, reason = %reason, "Payment declined");
                    Err(OrderError::PaymentFailed { reason })
                }
            }
        });

        observe(self.metrics.as_deref(), "process_payment", started, &result);
        result
    }

    async fn try_process_payment(
        &self,
        user_id: i64,
        order_id: i64,
        details: &PaymentDetails,
    ) -> Result<(Order, Vec<OrderEvent>, PaymentOutcome), OrderError> {
        let mut tx = self.store.begin().await?;

        let mut order = orders::find_for_user(&mut *tx, user_id, order_id)
            .await?
            .ok_or(OrderError::NotFound)?;

        // Never consult the gateway for an order that cannot take a charge.
        order.ensure_payable()?;

        let decision = self.gateway.authorize(&order, details).await;
        let now = self.clock.now();

        let outcome = match decision {
            PaymentDecision::Approved => PaymentOutcome::Approved {
                transaction_id: transaction_id(now),
            },
            PaymentDecision::Declined { reason } => PaymentOutcome::Declined { reason },
        };

        let events = order.execute(
            &OrderCommand::RecordPayment {
                outcome: outcome.clone(),
            },
            now,
        )?;
        save_changes(&mut *tx, &order, &events, now).await?;

        tx.commit().await?;
        Ok((order, events, outcome))
    }
}

/// `TXN-<unix millis>-<8 uppercase hex chars>`
fn transaction_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("TXN-{}-{}", now.timestamp_millis(), random[..8].to_uppercase())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Address, CheckoutRequest, OrderLedger, OrderStatus, PaymentStatus};
    use crate::domain::payment::{SentinelCardGateway, DECLINE_SENTINEL};
    use crate::store::{cart, catalog};
    use crate::utils::SystemClock;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixture {
        store: Store,
        ledger: OrderLedger,
        payments: PaymentSimulator,
        product_id: i64,
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(SentinelCardGateway)).await
    }

    async fn fixture_with(gateway: Arc<dyn PaymentGateway>) -> Fixture {
        let store = Store::in_memory().await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = OrderLedger::new(store.clone(), clock.clone());
        let payments = PaymentSimulator::new(store.clone(), gateway, clock);

        let product_id = {
            let mut conn = store.pool().acquire().await.unwrap();
            catalog::insert_product(&mut conn, "Keyboard", dec!(60.00), 20, Utc::now())
                .await
                .unwrap()
                .id
        };

        Fixture {
            store,
            ledger,
            payments,
            product_id,
        }
    }

    impl Fixture {
        async fn order_for(&self, user_id: i64) -> Order {
            {
                let mut conn = self.store.pool().acquire().await.unwrap();
                cart::add_item(&mut conn, user_id, self.product_id, 1, Utc::now())
                    .await
                    .unwrap();
            }

            let address = Address {
                name: None,
                street: "221B Baker Street".to_string(),
                city: "London".to_string(),
                state: "LDN".to_string(),
                postal_code: "NW1 6XE".to_string(),
                country: "UK".to_string(),
                phone: None,
            };
            let request = CheckoutRequest {
                shipping_address: address.clone(),
                billing_address: address,
                payment_method: "credit_card".to_string(),
                notes: None,
            };
            self.ledger.create_order(user_id, &request).await.unwrap()
        }

        async fn stock(&self) -> i64 {
            let mut conn = self.store.pool().acquire().await.unwrap();
            catalog::get_product(&mut conn, self.product_id)
                .await
                .unwrap()
                .unwrap()
                .stock
        }
    }

    struct CountingGateway(AtomicU32);

    #[async_trait]
    impl PaymentGateway for CountingGateway {
        async fn authorize(&self, _order: &Order, _details: &PaymentDetails) -> PaymentDecision {
            self.0.fetch_add(1, Ordering::SeqCst);
            PaymentDecision::Approved
        }
    }

    #[tokio::test]
    async fn test_approved_payment_advances_order() {
        let f = fixture().await;
        let order = f.order_for(1).await;

        let receipt = f
            .payments
            .process_payment(1, order.id, &PaymentDetails::card("4111111111111111"))
            .await
            .unwrap();

        assert!(receipt.transaction_id.starts_with("TXN-"));
        assert_eq!(receipt.order.payment_status, PaymentStatus::Completed);
        assert_eq!(receipt.order.status, OrderStatus::Processing);

        let stored = f.ledger.get_order(1, order.id).await.unwrap();
        assert_eq!(stored, receipt.order);
    }

    #[tokio::test]
    async fn test_missing_card_number_is_approved() {
        let f = fixture().await;
        let order = f.order_for(1).await;

        let receipt = f
            .payments
            .process_payment(1, order.id, &PaymentDetails::default())
            .await
            .unwrap();

        assert_eq!(receipt.order.payment_status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_sentinel_card_is_declined_and_recorded() {
        let f = fixture().await;
        let order = f.order_for(1).await;

        let result = f
            .payments
            .process_payment(1, order.id, &PaymentDetails::card(DECLINE_SENTINEL))
            .await;

        assert!(matches!(result, Err(OrderError::PaymentFailed { .. })));

        let stored = f.ledger.get_order(1, order.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Failed);
        assert_eq!(stored.status, OrderStatus::Pending);
        assert!(stored.updated_at > order.updated_at);

        let history = f.ledger.order_history(1, order.id).await.unwrap();
        assert_eq!(history.last().map(|r| r.event.event_type()), Some("PaymentFailed"));
    }

    #[tokio::test]
    async fn test_failed_payment_can_be_retried() {
        let f = fixture().await;
        let order = f.order_for(1).await;

        let _ = f
            .payments
            .process_payment(1, order.id, &PaymentDetails::card(DECLINE_SENTINEL))
            .await;
        let receipt = f
            .payments
            .process_payment(1, order.id, &PaymentDetails::card("5555555555554444"))
            .await
            .unwrap();

        assert_eq!(receipt.order.payment_status, PaymentStatus::Completed);
        assert_eq!(receipt.order.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_paid_order_is_never_charged_again() {
        let gateway = Arc::new(CountingGateway(AtomicU32::new(0)));
        let f = fixture_with(gateway.clone()).await;
        let order = f.order_for(1).await;

        f.payments
            .process_payment(1, order.id, &PaymentDetails::default())
            .await
            .unwrap();
        let second = f
            .payments
            .process_payment(1, order.id, &PaymentDetails::default())
            .await;

        assert!(matches!(second, Err(OrderError::AlreadyPaid)));
        assert_eq!(gateway.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_foreign_order_is_not_found() {
        let f = fixture().await;
        let order = f.order_for(1).await;

        let result = f
            .payments
            .process_payment(2, order.id, &PaymentDetails::default())
            .await;

        assert!(matches!(result, Err(OrderError::NotFound)));
        let stored = f.ledger.get_order(1, order.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancelled_order_cannot_be_paid() {
        let f = fixture().await;
        let order = f.order_for(1).await;
        f.ledger.cancel_order(1, order.id).await.unwrap();

        let result = f
            .payments
            .process_payment(1, order.id, &PaymentDetails::default())
            .await;

        assert!(matches!(
            result,
            Err(OrderError::InvalidStatusTransition { from: OrderStatus::Cancelled, .. })
        ));
    }

    #[tokio::test]
    async fn test_payment_leaves_stock_alone() {
        let f = fixture().await;
        let order = f.order_for(1).await;
        let before = f.stock().await;

        f.payments
            .process_payment(1, order.id, &PaymentDetails::default())
            .await
            .unwrap();

        assert_eq!(f.stock().await, before);
    }

    #[tokio::test]
    async fn test_transaction_ids_are_unique() {
        let f = fixture().await;

        let mut ids = HashSet::new();
        for user_id in 1..=5 {
            let order = f.order_for(user_id).await;
            let receipt = f
                .payments
                .process_payment(user_id, order.id, &PaymentDetails::default())
                .await
                .unwrap();
            ids.insert(receipt.transaction_id);
        }

        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_transaction_id_format() {
        let now = Utc::now();
        let id = transaction_id(now);

        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TXN");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
