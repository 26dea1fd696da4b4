//! Consultation record and its two-axis state machine.
//!
//! `status` tracks the lifecycle; `payment_status` is an independent axis that only
//! moves forward. Once `payment_status` is `paid`, `status` is always one of
//! `paid`, `doctor_ready`, `completed`, `finished` or `reviewed`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConsultError, Result};
use crate::ids::{ConsultationId, UserId};

/// Lifecycle status of a consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    /// Requested by the patient, waiting for the professional.
    Pending,
    /// Accepted by the professional, waiting for payment.
    Accepted,
    /// Declined by the professional. Terminal.
    Rejected,
    /// The professional's device check passed.
    DoctorReady,
    /// Payment confirmed.
    Paid,
    /// Session ended normally.
    Completed,
    /// Session ended (legacy teardown path).
    Finished,
    /// The patient reviewed the session.
    Reviewed,
}

impl ConsultationStatus {
    /// Get the status name as stored and serialized.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::DoctorReady => "doctor_ready",
            Self::Paid => "paid",
            Self::Completed => "completed",
            Self::Finished => "finished",
            Self::Reviewed => "reviewed",
        }
    }

    /// Parse a stored status name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => Self::Pending,
            "accepted" => Self::Accepted,
            "rejected" => Self::Rejected,
            "doctor_ready" => Self::DoctorReady,
            "paid" => Self::Paid,
            "completed" => Self::Completed,
            "finished" => Self::Finished,
            "reviewed" => Self::Reviewed,
            _ => return None,
        })
    }

    /// Whether this status is allowed alongside `payment_status = paid`.
    #[must_use]
    pub const fn compatible_with_paid(&self) -> bool {
        matches!(
            self,
            Self::Paid | Self::DoctorReady | Self::Completed | Self::Finished | Self::Reviewed
        )
    }

    /// Whether the session has ended.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        matches!(self, Self::Completed | Self::Finished | Self::Reviewed)
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment axis of a consultation. Only moves from `Pending` to `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No confirmed payment yet.
    Pending,
    /// Payment confirmed by the processor.
    Paid,
}

impl PaymentStatus {
    /// Get the status name as stored and serialized.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }

    /// Parse a stored status name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOutcome {
    /// Normal completion.
    Completed,
    /// Ended through the legacy teardown path.
    Finished,
}

/// A single patient/professional paid session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    /// Consultation id.
    pub id: ConsultationId,
    /// The requesting patient.
    pub patient_id: UserId,
    /// The professional providing the session.
    pub professional_id: UserId,
    /// Fee in cents, as quoted when requested.
    pub fee_cents: i64,
    /// Lifecycle status.
    pub status: ConsultationStatus,
    /// Payment status.
    pub payment_status: PaymentStatus,
    /// When the consultation was requested.
    pub created_at: DateTime<Utc>,
    /// When the consultation was last changed.
    pub updated_at: DateTime<Utc>,
    /// When the session ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Session length in minutes.
    pub duration_minutes: Option<i32>,
}

impl Consultation {
    /// Create a new consultation request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` for a negative fee and `Validation` when the patient
    /// and the professional are the same user.
    pub fn request(patient_id: UserId, professional_id: UserId, fee_cents: i64) -> Result<Self> {
        if fee_cents < 0 {
            return Err(ConsultError::InvalidAmount(format!(
                "fee must not be negative: {fee_cents}"
            )));
        }
        if patient_id == professional_id {
            return Err(ConsultError::Validation(
                "patient and professional must differ".into(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: ConsultationId::generate(),
            patient_id,
            professional_id,
            fee_cents,
            status: ConsultationStatus::Pending,
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
            ended_at: None,
            duration_minutes: None,
        })
    }

    /// Whether the user is the patient or the professional of this consultation.
    #[must_use]
    pub fn is_participant(&self, user_id: &UserId) -> bool {
        self.patient_id == *user_id || self.professional_id == *user_id
    }

    /// Whether the patient still owes payment for an accepted consultation.
    ///
    /// This is the predicate behind the pending-payment alert.
    #[must_use]
    pub fn awaiting_payment(&self) -> bool {
        self.status == ConsultationStatus::Accepted && self.payment_status == PaymentStatus::Pending
    }

    /// Whether payment has been confirmed.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Professional accepts the request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the consultation is `pending`.
    pub fn accept(&mut self) -> Result<()> {
        self.transition(&[ConsultationStatus::Pending], ConsultationStatus::Accepted, "accept")
    }

    /// Professional declines the request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the consultation is `pending`.
    pub fn reject(&mut self) -> Result<()> {
        self.transition(&[ConsultationStatus::Pending], ConsultationStatus::Rejected, "reject")
    }

    /// Professional's device check passed; gate for entering the live session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the consultation is `accepted` or `paid`.
    pub fn mark_doctor_ready(&mut self) -> Result<()> {
        self.transition(
            &[ConsultationStatus::Accepted, ConsultationStatus::Paid],
            ConsultationStatus::DoctorReady,
            "mark_doctor_ready",
        )
    }

    /// Record a confirmed payment.
    ///
    /// Returns `false` when the consultation was already paid, in which case nothing
    /// changes. A `doctor_ready` or ended consultation keeps its status.
    pub fn mark_paid(&mut self) -> bool {
        if self.is_paid() {
            return false;
        }

        self.payment_status = PaymentStatus::Paid;
        if !self.status.compatible_with_paid() {
            self.status = ConsultationStatus::Paid;
        }
        self.updated_at = Utc::now();
        true
    }

    /// Session teardown.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless payment is confirmed and the consultation is
    /// `paid` or `doctor_ready`.
    pub fn end(&mut self, outcome: EndOutcome, duration_minutes: Option<i32>) -> Result<()> {
        if !self.is_paid() {
            return Err(ConsultError::InvalidTransition {
                from: self.status,
                action: "end",
            });
        }

        let target = match outcome {
            EndOutcome::Completed => ConsultationStatus::Completed,
            EndOutcome::Finished => ConsultationStatus::Finished,
        };
        self.transition(
            &[ConsultationStatus::Paid, ConsultationStatus::DoctorReady],
            target,
            "end",
        )?;

        self.ended_at = Some(self.updated_at);
        self.duration_minutes = duration_minutes;
        Ok(())
    }

    /// Patient reviewed the ended session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the consultation is `completed` or `finished`.
    pub fn review(&mut self) -> Result<()> {
        self.transition(
            &[ConsultationStatus::Completed, ConsultationStatus::Finished],
            ConsultationStatus::Reviewed,
            "review",
        )
    }

    fn transition(
        &mut self,
        allowed_from: &[ConsultationStatus],
        to: ConsultationStatus,
        action: &'static str,
    ) -> Result<()> {
        if !allowed_from.contains(&self.status) {
            return Err(ConsultError::InvalidTransition {
                from: self.status,
                action,
            });
        }

        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}
