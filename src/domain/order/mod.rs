// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (Order, OrderItem, Address, OrderStatus, PaymentStatus)
// - Pricing (subtotal, tax, shipping, total)
// - Events (OrderPlaced, OrderCancelled, OrderStatusChanged, ...)
// - Commands (Cancel, SetStatus, RecordPayment)
// - Errors (OrderError enum)
// - Aggregate (command validation and event application)
// - Ledger (OrderLedger: checkout, cancellation, admin updates, listings)
//
// Storage access goes through `crate::store`.
//
// ============================================================================

pub mod value_objects;
pub mod pricing;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod ledger;

// Re-export for convenience
pub use value_objects::*;
pub use pricing::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use ledger::*;
