//! Payment and fund-distribution ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fees::FeeSplit;
use crate::ids::{ConsultationId, ExternalTransactionId, TransferId, UserId};
use crate::provider::PayoutProfile;

/// Processor status string of an approved payment.
pub const APPROVED: &str = "approved";

/// A confirmed payment. At most one per external transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Idempotency key derived from the processor payment id.
    pub transaction_id: ExternalTransactionId,
    /// The consultation paid for.
    pub consultation_id: ConsultationId,
    /// Total charged, in cents.
    pub total_amount_cents: i64,
    /// Platform share, in cents.
    pub platform_fee_cents: i64,
    /// Professional share, in cents.
    pub provider_fee_cents: i64,
    /// Processor status at confirmation time.
    pub status: String,
    /// Payment method reported by the processor.
    pub payment_method: Option<String>,
    /// Whether the professional's share has been transferred.
    pub transfers_completed: bool,
    /// When the payment was recorded.
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Build the record for an approved processor payment.
    #[must_use]
    pub fn approved(
        transaction_id: ExternalTransactionId,
        consultation_id: ConsultationId,
        split: &FeeSplit,
        payment_method: Option<String>,
    ) -> Self {
        Self {
            transaction_id,
            consultation_id,
            total_amount_cents: split.total_cents,
            platform_fee_cents: split.platform_fee_cents,
            provider_fee_cents: split.provider_fee_cents,
            status: APPROVED.to_string(),
            payment_method,
            transfers_completed: false,
            created_at: Utc::now(),
        }
    }

    /// Whether the two shares add up to the total (within one cent).
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        (self.platform_fee_cents + self.provider_fee_cents - self.total_amount_cents).abs() <= 1
    }
}

/// Outcome of a fund-distribution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Not settled yet.
    Pending,
    /// Paid out to a verified destination.
    Completed,
    /// Held; see the error message.
    Failed,
}

impl TransferStatus {
    /// Get the status name as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Kind of payout destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    /// Bank alias / account handle.
    Alias,
}

impl RecipientType {
    /// Get the type name as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Alias => "alias",
        }
    }
}

/// One fund-distribution attempt. Written for failures too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Attempt id.
    pub id: TransferId,
    /// The payment being distributed. At most one transfer per payment.
    pub transaction_id: ExternalTransactionId,
    /// The consultation the funds belong to.
    pub consultation_id: ConsultationId,
    /// The professional receiving the funds.
    pub professional_id: UserId,
    /// Amount in cents.
    pub amount_cents: i64,
    /// Destination alias, if one was configured.
    pub recipient_alias: Option<String>,
    /// Destination type.
    pub recipient_type: RecipientType,
    /// Outcome.
    pub status: TransferStatus,
    /// Set iff `status` is `completed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Set iff `status` is `failed`.
    pub error_message: Option<String>,
    /// When the attempt was made.
    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    /// Decide the transfer of a payment's provider share to the professional's
    /// payout profile.
    ///
    /// Completed only when the profile has a non-empty, verified alias; any other
    /// case yields a failed record whose message names the reason.
    #[must_use]
    pub fn attempt(
        payment: &PaymentRecord,
        professional_id: UserId,
        profile: Option<&PayoutProfile>,
    ) -> Self {
        let now = Utc::now();
        let recipient_alias = profile.and_then(|p| p.alias.clone());

        let decision = profile.map_or(Err(crate::provider::PayoutHold::NoAlias), |p| {
            p.destination().map(str::to_string)
        });

        let (status, completed_at, error_message) = match decision {
            Ok(_) => (TransferStatus::Completed, Some(now), None),
            Err(hold) => (TransferStatus::Failed, None, Some(hold.to_string())),
        };

        Self {
            id: TransferId::generate(),
            transaction_id: payment.transaction_id.clone(),
            consultation_id: payment.consultation_id,
            professional_id,
            amount_cents: payment.provider_fee_cents,
            recipient_alias,
            recipient_type: RecipientType::Alias,
            status,
            completed_at,
            error_message,
            created_at: now,
        }
    }

    /// Whether the record satisfies the status/field invariants.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        match self.status {
            TransferStatus::Completed => self.completed_at.is_some() && self.error_message.is_none(),
            TransferStatus::Failed => self.error_message.is_some(),
            TransferStatus::Pending => true,
        }
    }
}
