//! Notifications and consultation chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::fees::cents_to_amount;
use crate::ids::{ConsultationId, ExternalTransactionId, MessageId, NotificationId, UserId};

/// Maximum length of a chat message, in characters.
pub const MAX_CHAT_TEXT_CHARS: usize = 4000;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A patient paid for a consultation.
    PaymentReceived,
    /// A professional accepted a request.
    ConsultationAccepted,
    /// A professional declined a request.
    ConsultationRejected,
    /// A new chat message arrived.
    ChatMessage,
}

impl NotificationKind {
    /// Get the kind name as stored and serialized.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentReceived => "payment_received",
            Self::ConsultationAccepted => "consultation_accepted",
            Self::ConsultationRejected => "consultation_rejected",
            Self::ChatMessage => "chat_message",
        }
    }

    /// Parse a stored kind name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "payment_received" => Some(Self::PaymentReceived),
            "consultation_accepted" => Some(Self::ConsultationAccepted),
            "consultation_rejected" => Some(Self::ConsultationRejected),
            "chat_message" => Some(Self::ChatMessage),
            _ => None,
        }
    }
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification id.
    pub id: NotificationId,
    /// Recipient.
    pub user_id: UserId,
    /// Kind.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Structured payload, e.g. `{"consultationId": "..."}`.
    pub payload: serde_json::Value,
    /// Whether the recipient has read it.
    pub read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build an unread notification.
    #[must_use]
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: NotificationId::generate(),
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            payload,
            read: false,
            created_at: Utc::now(),
        }
    }

    /// Tell a professional that a consultation was paid.
    ///
    /// The id is derived from the transaction, so there is at most one such
    /// notification per payment.
    #[must_use]
    pub fn payment_received(
        professional_id: UserId,
        consultation_id: ConsultationId,
        transaction_id: &ExternalTransactionId,
        amount_cents: i64,
    ) -> Self {
        let mut notification = Self::new(
            professional_id,
            NotificationKind::PaymentReceived,
            "Payment received",
            format!(
                "A patient paid {:.2} for a consultation",
                cents_to_amount(amount_cents)
            ),
            json!({ "consultationId": consultation_id }),
        );
        notification.id = NotificationId::for_payment(transaction_id);
        notification
    }

    /// Tell a patient the professional answered their request.
    #[must_use]
    pub fn request_answered(
        patient_id: UserId,
        consultation_id: ConsultationId,
        accepted: bool,
    ) -> Self {
        let (kind, title, message) = if accepted {
            (
                NotificationKind::ConsultationAccepted,
                "Consultation accepted",
                "Your consultation was accepted. Complete the payment to join.",
            )
        } else {
            (
                NotificationKind::ConsultationRejected,
                "Consultation declined",
                "The professional declined your consultation request.",
            )
        };
        Self::new(
            patient_id,
            kind,
            title,
            message,
            json!({ "consultationId": consultation_id }),
        )
    }
}

/// A chat message before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatDraft {
    /// The consultation the conversation belongs to.
    pub consultation_id: ConsultationId,
    /// Author.
    pub sender_id: UserId,
    /// Text body, trimmed.
    pub text: String,
}

impl ChatDraft {
    /// Validate and build a draft.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for empty or oversized text.
    pub fn new(
        consultation_id: ConsultationId,
        sender_id: UserId,
        text: &str,
    ) -> crate::Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(crate::ConsultError::Validation(
                "message text is required".into(),
            ));
        }
        if text.chars().count() > MAX_CHAT_TEXT_CHARS {
            return Err(crate::ConsultError::Validation(format!(
                "message text exceeds {MAX_CHAT_TEXT_CHARS} characters"
            )));
        }
        Ok(Self {
            consultation_id,
            sender_id,
            text: text.to_string(),
        })
    }
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message id; sorts in append order.
    pub id: MessageId,
    /// The consultation.
    pub consultation_id: ConsultationId,
    /// Author.
    pub sender_id: UserId,
    /// Text body.
    pub text: String,
    /// Whether the other participant has read it.
    pub read: bool,
    /// Append time.
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Stamp a draft with its store-assigned id and time.
    #[must_use]
    pub fn stamped(draft: ChatDraft, id: MessageId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            consultation_id: draft.consultation_id,
            sender_id: draft.sender_id,
            text: draft.text,
            read: false,
            created_at,
        }
    }
}
