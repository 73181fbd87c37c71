use chrono::{DateTime, Utc};

use super::commands::{OrderCommand, PaymentOutcome};
use super::errors::OrderError;
use super::events::*;
use super::value_objects::{Order, OrderStatus, PaymentStatus};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// Commands are validated against the current state and turned into events;
// events are the only thing that mutates an order. Persistence lives in the
// ledger, which stores the resulting state and the events together.
//
// ============================================================================

impl Order {
    /// Payment is accepted once, and never for a cancelled order.
    pub fn ensure_payable(&self) -> Result<(), OrderError> {
        if self.payment_status == PaymentStatus::Completed {
            return Err(OrderError::AlreadyPaid);
        }
        if self.status == OrderStatus::Cancelled {
            return Err(OrderError::InvalidStatusTransition {
                from: self.status,
                to: OrderStatus::Processing,
            });
        }
        Ok(())
    }

    pub fn handle_command(
        &self,
        command: &OrderCommand,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        match command {
            OrderCommand::Cancel => {
                if !self.status.is_cancellable() {
                    return Err(OrderError::CannotCancel(self.status));
                }

                Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                    previous_status: self.status,
                    by_admin: false,
                    at: now,
                })])
            }

            OrderCommand::SetStatus { status } => {
                let status = *status;

                if status == self.status {
                    return Ok(vec![]); // No change
                }
                if !self.status.can_transition_to(status) {
                    return Err(OrderError::InvalidStatusTransition {
                        from: self.status,
                        to: status,
                    });
                }

                if status == OrderStatus::Cancelled {
                    Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                        previous_status: self.status,
                        by_admin: true,
                        at: now,
                    })])
                } else {
                    Ok(vec![OrderEvent::StatusChanged(OrderStatusChanged {
                        from: self.status,
                        to: status,
                        at: now,
                    })])
                }
            }

            OrderCommand::RecordPayment { outcome } => {
                self.ensure_payable()?;

                match outcome {
                    PaymentOutcome::Approved { transaction_id } => {
                        let mut events = vec![OrderEvent::PaymentCompleted(PaymentCompleted {
                            transaction_id: transaction_id.clone(),
                            at: now,
                        })];

                        if self.status == OrderStatus::Pending {
                            events.push(OrderEvent::StatusChanged(OrderStatusChanged {
                                from: OrderStatus::Pending,
                                to: OrderStatus::Processing,
                                at: now,
                            }));
                        }

                        Ok(events)
                    }
                    PaymentOutcome::Declined { reason } => {
                        Ok(vec![OrderEvent::PaymentFailed(PaymentDeclined {
                            reason: reason.clone(),
                            at: now,
                        })])
                    }
                }
            }
        }
    }

    pub fn apply_event(&mut self, event: &OrderEvent) {
        self.updated_at = event.occurred_at();

        match event {
            OrderEvent::Placed(_) => {
                // Initial state is built at checkout
            }
            OrderEvent::Cancelled(_) => {
                self.status = OrderStatus::Cancelled;
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
            }
            OrderEvent::PaymentCompleted(_) => {
                self.payment_status = PaymentStatus::Completed;
            }
            OrderEvent::PaymentFailed(_) => {
                self.payment_status = PaymentStatus::Failed;
            }
        }
    }

    /// Validate a command and apply the resulting events in one step.
    pub fn execute(
        &mut self,
        command: &OrderCommand,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let events = self.handle_command(command, now)?;
        for event in &events {
            self.apply_event(event);
        }
        Ok(events)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::value_objects::{Address, OrderItem};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn address() -> Address {
        Address {
            name: Some("Ada Lovelace".to_string()),
            street: "12 St James's Square".to_string(),
            city: "London".to_string(),
            state: "LDN".to_string(),
            postal_code: "SW1Y 4JH".to_string(),
            country: "UK".to_string(),
            phone: None,
        }
    }

    fn order_in(status: OrderStatus, payment_status: PaymentStatus) -> Order {
        let created = Utc::now() - Duration::minutes(5);
        Order {
            id: 7,
            user_id: 42,
            status,
            subtotal: dec!(30.00),
            tax: dec!(2.40),
            shipping: dec!(9.99),
            total: dec!(42.39),
            shipping_address: address(),
            billing_address: address(),
            payment_method: "credit_card".to_string(),
            payment_status,
            notes: None,
            items: vec![OrderItem {
                product_id: 1,
                product_name: "Notebook".to_string(),
                unit_price: dec!(30.00),
                quantity: 1,
            }],
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_cancel_pending_order() {
        let mut order = order_in(OrderStatus::Pending, PaymentStatus::Pending);
        let now = Utc::now();

        let events = order.execute(&OrderCommand::Cancel, now).unwrap();

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            OrderEvent::Cancelled(OrderCancelled { previous_status: OrderStatus::Pending, by_admin: false, .. })
        ));
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.updated_at, now);
    }

    #[test]
    fn test_cancel_processing_order() {
        let order = order_in(OrderStatus::Processing, PaymentStatus::Completed);
        assert!(order.handle_command(&OrderCommand::Cancel, Utc::now()).is_ok());
    }

    #[test]
    fn test_cannot_cancel_after_shipping() {
        for status in [OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Cancelled] {
            let mut order = order_in(status, PaymentStatus::Completed);
            let before = order.clone();

            let result = order.execute(&OrderCommand::Cancel, Utc::now());

            assert!(matches!(result, Err(OrderError::CannotCancel(s)) if s == status));
            assert_eq!(order, before);
        }
    }

    #[test]
    fn test_admin_follows_transition_table() {
        let mut order = order_in(OrderStatus::Processing, PaymentStatus::Completed);

        let events = order
            .execute(&OrderCommand::SetStatus { status: OrderStatus::Shipped }, Utc::now())
            .unwrap();
        assert!(matches!(&events[0], OrderEvent::StatusChanged(e) if e.to == OrderStatus::Shipped));

        order
            .execute(&OrderCommand::SetStatus { status: OrderStatus::Delivered }, Utc::now())
            .unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);

        let result = order.execute(&OrderCommand::SetStatus { status: OrderStatus::Pending }, Utc::now());
        assert!(matches!(
            result,
            Err(OrderError::InvalidStatusTransition { from: OrderStatus::Delivered, to: OrderStatus::Pending })
        ));
    }

    #[test]
    fn test_admin_same_status_is_a_no_op() {
        let mut order = order_in(OrderStatus::Shipped, PaymentStatus::Completed);
        let before = order.clone();

        let events = order
            .execute(&OrderCommand::SetStatus { status: OrderStatus::Shipped }, Utc::now())
            .unwrap();

        assert!(events.is_empty());
        assert_eq!(order, before);
    }

    #[test]
    fn test_admin_cancellation_is_marked() {
        let order = order_in(OrderStatus::Pending, PaymentStatus::Pending);
        let events = order
            .handle_command(&OrderCommand::SetStatus { status: OrderStatus::Cancelled }, Utc::now())
            .unwrap();

        assert!(matches!(&events[0], OrderEvent::Cancelled(e) if e.by_admin));
    }

    #[test]
    fn test_approved_payment_advances_pending_order() {
        let mut order = order_in(OrderStatus::Pending, PaymentStatus::Pending);
        let outcome = PaymentOutcome::Approved { transaction_id: "TXN-1-ABCDEF12".to_string() };

        let events = order.execute(&OrderCommand::RecordPayment { outcome }, Utc::now()).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(order.payment_status, PaymentStatus::Completed);
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[test]
    fn test_approved_payment_leaves_other_statuses_alone() {
        let mut order = order_in(OrderStatus::Processing, PaymentStatus::Failed);
        let outcome = PaymentOutcome::Approved { transaction_id: "TXN-2-ABCDEF12".to_string() };

        let events = order.execute(&OrderCommand::RecordPayment { outcome }, Utc::now()).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn test_declined_payment_keeps_order_status() {
        let mut order = order_in(OrderStatus::Pending, PaymentStatus::Pending);
        let outcome = PaymentOutcome::Declined { reason: "card declined".to_string() };

        order.execute(&OrderCommand::RecordPayment { outcome }, Utc::now()).unwrap();

        assert_eq!(order.payment_status, PaymentStatus::Failed);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_completed_payment_cannot_be_recorded_twice() {
        let order = order_in(OrderStatus::Processing, PaymentStatus::Completed);

        for outcome in [
            PaymentOutcome::Approved { transaction_id: "TXN-3-ABCDEF12".to_string() },
            PaymentOutcome::Declined { reason: "card declined".to_string() },
        ] {
            let result = order.handle_command(&OrderCommand::RecordPayment { outcome }, Utc::now());
            assert!(matches!(result, Err(OrderError::AlreadyPaid)));
        }
    }

    #[test]
    fn test_cancelled_order_is_not_payable() {
        let order = order_in(OrderStatus::Cancelled, PaymentStatus::Pending);
        assert!(matches!(order.ensure_payable(), Err(OrderError::InvalidStatusTransition { .. })));
    }
}
