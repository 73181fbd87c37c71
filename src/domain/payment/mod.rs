// ============================================================================
// Payment Domain - simulated card payments for orders
// ============================================================================

pub mod gateway;
pub mod simulator;

pub use gateway::*;
pub use simulator::*;
