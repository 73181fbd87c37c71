use super::value_objects::OrderStatus;

// ============================================================================
// Order Commands - Represent intent against an existing order
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    /// Customer-initiated cancellation.
    Cancel,
    /// Administrative status change, validated against the transition table.
    SetStatus { status: OrderStatus },
    /// Record the gateway's answer for a payment attempt.
    RecordPayment { outcome: PaymentOutcome },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Approved { transaction_id: String },
    Declined { reason: String },
}
