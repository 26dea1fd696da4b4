//! Teleconsultation payment HTTP API service.
//!
//! This crate provides the HTTP API for consultation payments, including:
//!
//! - Checkout preferences with the platform/provider fee split
//! - Provider account linking (OAuth) and payout aliases
//! - Payment webhooks and reconciliation
//! - The consultation lifecycle, chat and notifications
//! - Realtime subscriptions over websockets
//!
//! # Authentication
//!
//! End-user requests carry an HS256 JWT (`Authorization: Bearer ...`, or the
//! `access_token` query parameter on websocket upgrades). Admin endpoints use the
//! `X-Admin-Key` header. Webhooks are public and optionally signature-verified.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers stay async for a uniform router signature

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod mercadopago;
pub mod pipeline;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use mercadopago::{MercadoPagoClient, MercadoPagoError};
pub use pipeline::{Pipeline, PipelineReport, Step};
pub use routes::create_router;
pub use state::AppState;
