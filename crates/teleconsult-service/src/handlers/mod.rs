//! HTTP request handlers.

pub mod chat;
pub mod consultations;
pub mod health;
pub mod notifications;
pub mod payments;
pub mod preferences;
pub mod provider_accounts;
pub mod realtime;
pub mod webhooks;

use serde::de::DeserializeOwned;

use teleconsult_core::{ConsultError, Consultation, ConsultationId, UserId};
use teleconsult_store::Store;

use crate::error::ApiError;
use crate::state::AppState;

/// Decode a JSON body, reporting failures as validation errors (HTTP 400).
pub(crate) fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body)
        .map_err(|e| ApiError::from(ConsultError::Validation(format!("invalid request body: {e}"))))
}

/// Load a consultation the caller takes part in.
pub(crate) async fn participant_consultation(
    state: &AppState,
    consultation_id: &str,
    user_id: &UserId,
) -> Result<Consultation, ApiError> {
    let id: ConsultationId = consultation_id.parse().map_err(ConsultError::from)?;

    let consultation = state
        .store
        .get_consultation(&id)
        .await?
        .ok_or_else(|| ConsultError::ConsultationNotFound {
            consultation_id: id.to_string(),
        })?;

    if !consultation.is_participant(user_id) {
        return Err(ApiError::Forbidden);
    }

    Ok(consultation)
}
