//! Order checkout and lifecycle core for a single-node storefront.
//!
//! [`domain::order::OrderLedger`] turns carts into orders and drives them
//! through their lifecycle; [`domain::payment::PaymentSimulator`] settles
//! them. Both persist through [`store::Store`] (embedded SQLite).

pub mod config;
pub mod domain;
pub mod metrics;
pub mod store;
pub mod utils;
