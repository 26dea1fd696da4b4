//! Storage layer for the teleconsultation payment pipeline.
//!
//! This crate provides persistence for consultations, provider accounts, payout
//! profiles, the payment/transfer ledger, notifications and chat, plus the change
//! feed that drives realtime subscriptions.
//!
//! # Backends
//!
//! - [`PgStore`]: PostgreSQL via `sqlx`, with migrations under `migrations/`
//! - [`MemoryStore`]: in-process maps, used by tests and local runs
//!
//! Both enforce the same uniqueness rules: one payment record and one transfer
//! per external transaction id, and one provider account per professional.
//!
//! # Change feed
//!
//! Wrap any store in [`Observed`] to publish every write to a [`ChangeFeed`].
//!
//! ```no_run
//! use teleconsult_store::{ChangeFeed, MemoryStore, Observed, Store};
//!
//! let feed = ChangeFeed::new(256);
//! let store = Observed::new(MemoryStore::new(), feed.clone());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod feed;
pub mod memory;
pub mod observed;
pub mod postgres;
pub mod schema;

pub use error::{Result, StoreError};
pub use feed::{ChangeEvent, ChangeFeed, ChangeOp, Delivery, Row, Subscription, Table, Topic};
pub use memory::MemoryStore;
pub use observed::Observed;
pub use postgres::PgStore;

use async_trait::async_trait;
use teleconsult_core::{
    ChatDraft, ChatMessage, Consultation, ConsultationId, ExternalTransactionId, Notification,
    NotificationId, PaymentRecord, PayoutProfile, ProviderPaymentAccount, TransferRecord, UserId,
};

/// The storage trait defining all database operations.
///
/// Implementations must be safe to share across request handlers.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Consultations
    // =========================================================================

    /// Insert a new consultation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_consultation(&self, consultation: &Consultation) -> Result<()>;

    /// Get a consultation by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_consultation(&self, id: &ConsultationId) -> Result<Option<Consultation>>;

    /// Overwrite the lifecycle fields of a consultation and return the stored row.
    ///
    /// A stored `paid` payment status is never downgraded, whatever the argument
    /// says, so the returned row can differ from the argument.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the consultation doesn't exist.
    async fn update_consultation(&self, consultation: &Consultation) -> Result<Consultation>;

    /// Mark a consultation paid.
    ///
    /// Conditional on `payment_status` still being `pending`. Returns the updated
    /// consultation when this call changed it, `None` when it was already paid.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the consultation doesn't exist.
    async fn mark_consultation_paid(&self, id: &ConsultationId) -> Result<Option<Consultation>>;

    /// Accepted, unpaid consultations of a patient, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_awaiting_payment(&self, patient_id: &UserId) -> Result<Vec<Consultation>>;

    /// Consultations where the user is patient or professional, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_consultations_for(&self, user_id: &UserId) -> Result<Vec<Consultation>>;

    // =========================================================================
    // Provider accounts and payout profiles
    // =========================================================================

    /// Insert or replace the provider account of a professional.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_provider_account(&self, account: &ProviderPaymentAccount) -> Result<()>;

    /// Get the provider account of a professional (active or not).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_provider_account(
        &self,
        professional_id: &UserId,
    ) -> Result<Option<ProviderPaymentAccount>>;

    /// Deactivate a provider account. Returns `false` if there was none active.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn deactivate_provider_account(&self, professional_id: &UserId) -> Result<bool>;

    /// Insert or replace a payout profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_payout_profile(&self, profile: &PayoutProfile) -> Result<()>;

    /// Get a payout profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_payout_profile(&self, professional_id: &UserId) -> Result<Option<PayoutProfile>>;

    // =========================================================================
    // Payment ledger
    // =========================================================================

    /// Insert a payment record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateTransaction` if a record with the same
    /// transaction id exists. Exactly one of any set of concurrent inserts wins.
    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<()>;

    /// Get a payment record by transaction id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_payment(
        &self,
        transaction_id: &ExternalTransactionId,
    ) -> Result<Option<PaymentRecord>>;

    /// Payment records of a consultation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_payments_for_consultation(
        &self,
        consultation_id: &ConsultationId,
    ) -> Result<Vec<PaymentRecord>>;

    /// Flag a payment's transfers as completed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the payment doesn't exist.
    async fn mark_transfers_completed(&self, transaction_id: &ExternalTransactionId) -> Result<()>;

    /// Insert a transfer attempt.
    ///
    /// Returns `false`, writing nothing, when the payment already has a transfer.
    /// Exactly one of any set of concurrent inserts for a payment wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_transfer(&self, transfer: &TransferRecord) -> Result<bool>;

    /// The transfer recorded for a payment, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_transfer_for_payment(
        &self,
        transaction_id: &ExternalTransactionId,
    ) -> Result<Option<TransferRecord>>;

    /// Transfer attempts of a consultation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_transfers_for_consultation(
        &self,
        consultation_id: &ConsultationId,
    ) -> Result<Vec<TransferRecord>>;

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Insert a notification.
    ///
    /// Returns `false`, writing nothing, when one with the same id exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_notification(&self, notification: &Notification) -> Result<bool>;

    /// Notifications of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_notifications(
        &self,
        user_id: &UserId,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>>;

    /// Mark one of the user's notifications read. `None` if it isn't theirs.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn mark_notification_read(
        &self,
        user_id: &UserId,
        id: &NotificationId,
    ) -> Result<Option<Notification>>;

    // =========================================================================
    // Chat
    // =========================================================================

    /// Append a chat message. The store assigns the id and the timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn append_chat_message(&self, draft: ChatDraft) -> Result<ChatMessage>;

    /// Messages of a consultation in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_chat_messages(&self, consultation_id: &ConsultationId) -> Result<Vec<ChatMessage>>;

    /// Mark every message not sent by `reader` as read. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn mark_chat_read(&self, consultation_id: &ConsultationId, reader: &UserId)
        -> Result<u64>;
}
