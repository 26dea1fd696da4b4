//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use teleconsult_core::{ConsultError, ErrorKind};
use teleconsult_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Payment pipeline failure, reported with its own code.
    #[error(transparent)]
    Payment(#[from] ConsultError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Self::Payment(err) => {
                let status = match err.kind() {
                    ErrorKind::Conflict => StatusCode::CONFLICT,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                    // Every other payment-core failure is a 400 with a structured code.
                    _ => StatusCode::BAD_REQUEST,
                };
                match err {
                    ConsultError::PreferenceCreationFailed { status, body } => {
                        tracing::error!(upstream_status = status, body = %body, "Preference creation failed");
                    }
                    ConsultError::TokenExchangeFailed(detail)
                    | ConsultError::UpstreamFailure(detail)
                    | ConsultError::AccountPersistenceFailed(detail)
                    | ConsultError::Storage(detail) => {
                        tracing::error!(code = err.code(), error = %detail, "Payment operation failed");
                    }
                    ConsultError::MissingCredentialsConfiguration(name) => {
                        tracing::error!(missing = %name, "Payment credentials not configured");
                    }
                    _ => {}
                }
                (status, err.code(), err.public_message())
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("record not found".into()),
            StoreError::DuplicateTransaction { transaction_id } => {
                Self::Internal(format!("unhandled duplicate transaction {transaction_id}"))
            }
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_errors_map_to_bad_request() {
        let err = ApiError::from(ConsultError::ProviderAccountNotLinked {
            professional_id: "p".into(),
        });
        let (status, code, _) = err.parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "provider_account_not_linked");
    }

    #[test]
    fn invalid_transition_is_conflict() {
        let err = ApiError::from(ConsultError::InvalidTransition {
            from: teleconsult_core::ConsultationStatus::Rejected,
            action: "accept",
        });
        assert_eq!(err.parts().0, StatusCode::CONFLICT);
    }

    #[test]
    fn upstream_body_stays_out_of_response() {
        let err = ApiError::from(ConsultError::PreferenceCreationFailed {
            status: 400,
            body: "secret upstream detail".into(),
        });
        let (_, _, message) = err.parts();
        assert!(!message.contains("secret upstream detail"));
    }
}
