// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// This module contains domain-specific aggregates and business logic.
// - order: value objects, pricing, events, commands, errors, the aggregate
//   and the ledger that drives checkout and the order lifecycle
// - payment: the gateway seam and the payment simulator
//
// Storage lives in `crate::store`; this layer only talks to it through
// repository functions.
//
// ============================================================================

pub mod order;
pub mod payment;
