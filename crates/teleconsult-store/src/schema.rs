//! Table names.
//!
//! Shared by the PostgreSQL backend and the change feed so that realtime
//! subscribers filter on the same names the database uses.

/// Table names of the relational schema.
pub mod tables {
    /// Consultations, keyed by `id`.
    pub const CONSULTATIONS: &str = "consultations";

    /// Provider accounts, unique on `professional_id`.
    pub const PROVIDER_ACCOUNTS: &str = "provider_payment_accounts";

    /// Payout profiles, keyed by `professional_id`.
    pub const PAYOUT_PROFILES: &str = "payout_profiles";

    /// Confirmed payments, unique on `transaction_id`.
    pub const PAYMENT_RECORDS: &str = "payment_records";

    /// Fund-distribution attempts.
    pub const TRANSFER_RECORDS: &str = "transfer_records";

    /// Notifications.
    pub const NOTIFICATIONS: &str = "notifications";

    /// Chat messages, keyed by ULID.
    pub const CHAT_MESSAGES: &str = "chat_messages";
}

/// Returns all table names.
#[must_use]
pub fn all_tables() -> Vec<&'static str> {
    vec![
        tables::CONSULTATIONS,
        tables::PROVIDER_ACCOUNTS,
        tables::PAYOUT_PROFILES,
        tables::PAYMENT_RECORDS,
        tables::TRANSFER_RECORDS,
        tables::NOTIFICATIONS,
        tables::CHAT_MESSAGES,
    ]
}
