//! Payment-processor integration.
//!
//! The processor handles:
//! - Checkout preferences with a marketplace fee and a provider disbursement
//! - OAuth linking of professional accounts
//! - Payment lookups for webhook reconciliation

pub mod client;
pub mod types;

pub use client::MercadoPagoClient;
pub use client::MercadoPagoError;
pub use types::*;
