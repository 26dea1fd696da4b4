//! Core types for the teleconsultation payment pipeline.
//!
//! This crate provides the domain model shared by the store and the HTTP service:
//!
//! - **Identifiers**: `UserId`, `ConsultationId`, `NotificationId`, `MessageId`, `TransferId`,
//!   `ExternalTransactionId`
//! - **Consultations**: `Consultation`, `ConsultationStatus`, `PaymentStatus`
//! - **Fees**: `split`, `FeeSplit`, amount conversions
//! - **Payments**: `PaymentRecord`, `TransferRecord`, `TransferStatus`
//! - **Providers**: `ProviderPaymentAccount`, `PayoutProfile`
//! - **Messaging**: `Notification`, `ChatMessage`
//!
//! # Money
//!
//! All amounts are stored as `i64` integer cents. The payment processor speaks in
//! decimal amounts (`1000.00`); conversions happen at the processor boundary only.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod consultation;
pub mod error;
pub mod fees;
pub mod ids;
pub mod messaging;
pub mod payment;
pub mod provider;

pub use consultation::{Consultation, ConsultationStatus, EndOutcome, PaymentStatus};
pub use error::{ConsultError, ErrorKind, Result};
pub use fees::{
    amount_to_cents, cents_to_amount, split, FeeSplit, PLATFORM_FEE_PERCENT,
    PROVIDER_FEE_PERCENT,
};
pub use ids::{
    is_valid_payment_id, ConsultationId, ExternalTransactionId, IdError, MessageId,
    NotificationId, TransferId, UserId,
};
pub use messaging::{ChatDraft, ChatMessage, Notification, NotificationKind};
pub use payment::{PaymentRecord, RecipientType, TransferRecord, TransferStatus};
pub use provider::{PayoutHold, PayoutProfile, ProviderPaymentAccount};
