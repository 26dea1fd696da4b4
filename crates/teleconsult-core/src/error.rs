//! Error types for the payment pipeline.

use crate::consultation::ConsultationStatus;
use crate::ids::IdError;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ConsultError>;

/// Broad error classes used at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A consultation, provider account or payment does not exist.
    NotFound,
    /// The payment processor answered with a non-2xx status.
    UpstreamFailure,
    /// A required secret is missing. Not retryable.
    Misconfiguration,
    /// The request conflicts with the current state.
    Conflict,
    /// The request payload is malformed or incomplete.
    ValidationFailure,
    /// Storage or other internal failure.
    Internal,
}

/// Errors that can occur in the payment pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ConsultError {
    /// Consultation not found.
    #[error("consultation not found: {consultation_id}")]
    ConsultationNotFound {
        /// The consultation that was not found.
        consultation_id: String,
    },

    /// The professional has no active payout account with an external account id.
    #[error("professional {professional_id} has no linked payment account")]
    ProviderAccountNotLinked {
        /// The professional missing a linked account.
        professional_id: String,
    },

    /// The processor rejected the preference request.
    #[error("preference creation failed: HTTP {status}")]
    PreferenceCreationFailed {
        /// Upstream HTTP status.
        status: u16,
        /// Upstream response body, for logs only.
        body: String,
    },

    /// OAuth client id or secret (or another processor secret) is absent.
    #[error("missing credentials configuration: {0}")]
    MissingCredentialsConfiguration(String),

    /// The processor refused the authorization code.
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The linked account could not be written.
    #[error("account persistence failed: {0}")]
    AccountPersistenceFailed(String),

    /// Webhook payload is missing required fields.
    #[error("malformed webhook: {0}")]
    MalformedWebhook(String),

    /// The payment does not reference a known consultation.
    #[error("unresolved consultation: {0}")]
    UnresolvedConsultation(String),

    /// Other processor failure (payment lookup, transport).
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// The consultation cannot move to the requested state.
    #[error("invalid transition from {from} via {action}")]
    InvalidTransition {
        /// Current status.
        from: ConsultationStatus,
        /// Attempted operation.
        action: &'static str,
    },

    /// Invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Request validation failed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ConsultError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConsultationNotFound { .. } | Self::ProviderAccountNotLinked { .. } => {
                ErrorKind::NotFound
            }
            Self::PreferenceCreationFailed { .. }
            | Self::TokenExchangeFailed(_)
            | Self::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
            Self::MissingCredentialsConfiguration(_) => ErrorKind::Misconfiguration,
            Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::MalformedWebhook(_)
            | Self::UnresolvedConsultation(_)
            | Self::InvalidAmount(_)
            | Self::Validation(_)
            | Self::InvalidId(_) => ErrorKind::ValidationFailure,
            Self::AccountPersistenceFailed(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConsultationNotFound { .. } => "consultation_not_found",
            Self::ProviderAccountNotLinked { .. } => "provider_account_not_linked",
            Self::PreferenceCreationFailed { .. } => "preference_creation_failed",
            Self::MissingCredentialsConfiguration(_) => "missing_credentials_configuration",
            Self::TokenExchangeFailed(_) => "token_exchange_failed",
            Self::AccountPersistenceFailed(_) => "account_persistence_failed",
            Self::MalformedWebhook(_) => "malformed_webhook",
            Self::UnresolvedConsultation(_) => "unresolved_consultation",
            Self::UpstreamFailure(_) => "upstream_failure",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::Validation(_) => "validation_failed",
            Self::InvalidId(_) => "invalid_id",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Message that is safe to show to an end user.
    ///
    /// Upstream bodies and storage details stay in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::PreferenceCreationFailed { .. } => {
                "The payment provider rejected the payment request".to_string()
            }
            Self::TokenExchangeFailed(_) => {
                "The payment provider rejected the authorization code".to_string()
            }
            Self::UpstreamFailure(_) => "The payment provider is unavailable".to_string(),
            Self::AccountPersistenceFailed(_) => {
                "The payment account could not be saved".to_string()
            }
            Self::Storage(_) => "An internal error occurred".to_string(),
            Self::MissingCredentialsConfiguration(_) => {
                "Payments are not configured on this server".to_string()
            }
            other => other.to_string(),
        }
    }
}
