//! Consultation lifecycle handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use teleconsult_core::{
    amount_to_cents, ConsultError, Consultation, EndOutcome, Notification, UserId,
};
use teleconsult_store::Store;

use super::participant_consultation;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Consultation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConsultationRequest {
    /// The professional asked for the session.
    pub professional_id: String,
    /// Fee in cents.
    #[serde(default)]
    pub fee_cents: Option<i64>,
    /// Fee in currency units, when `feeCents` is absent.
    #[serde(default)]
    pub fee: Option<f64>,
}

/// Request a consultation as the calling patient.
pub async fn create_consultation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateConsultationRequest>,
) -> Result<Json<Consultation>, ApiError> {
    let professional_id: UserId = body
        .professional_id
        .parse()
        .map_err(ConsultError::from)?;

    let fee_cents = match (body.fee_cents, body.fee) {
        (Some(cents), _) => cents,
        (None, Some(fee)) => amount_to_cents(fee)?,
        (None, None) => return Err(ConsultError::Validation("fee is required".into()).into()),
    };

    let consultation = Consultation::request(auth.user_id, professional_id, fee_cents)?;
    state.store.insert_consultation(&consultation).await?;

    tracing::info!(
        consultation_id = %consultation.id,
        patient_id = %consultation.patient_id,
        professional_id = %consultation.professional_id,
        fee_cents = consultation.fee_cents,
        "Consultation requested"
    );

    Ok(Json(consultation))
}

/// List consultations response.
#[derive(Debug, Serialize)]
pub struct ListConsultationsResponse {
    /// Consultations the caller takes part in, newest first.
    pub consultations: Vec<Consultation>,
}

/// List the caller's consultations.
pub async fn list_consultations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListConsultationsResponse>, ApiError> {
    let consultations = state.store.list_consultations_for(&auth.user_id).await?;
    Ok(Json(ListConsultationsResponse { consultations }))
}

/// Pending-payment alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    /// Whether the patient owes payment for an accepted consultation.
    pub pending: bool,
    /// The consultations awaiting payment, newest first.
    pub consultations: Vec<Consultation>,
}

impl PendingPayment {
    /// Evaluate the alert for a patient.
    pub async fn for_patient(store: &dyn Store, patient_id: &UserId) -> Result<Self, ApiError> {
        let consultations = store.find_awaiting_payment(patient_id).await?;
        Ok(Self {
            pending: !consultations.is_empty(),
            consultations,
        })
    }
}

/// Current pending-payment alert for the caller.
pub async fn pending_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<PendingPayment>, ApiError> {
    Ok(Json(
        PendingPayment::for_patient(state.store.as_ref(), &auth.user_id).await?,
    ))
}

/// Get one consultation.
pub async fn get_consultation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(consultation_id): Path<String>,
) -> Result<Json<Consultation>, ApiError> {
    Ok(Json(
        participant_consultation(&state, &consultation_id, &auth.user_id).await?,
    ))
}

/// Who may perform a lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actor {
    Patient,
    Professional,
    Either,
}

/// Load, check the actor, apply `action`, store.
async fn transition<F>(
    state: &AppState,
    consultation_id: &str,
    user_id: &UserId,
    actor: Actor,
    action: F,
) -> Result<Consultation, ApiError>
where
    F: FnOnce(&mut Consultation) -> teleconsult_core::Result<()>,
{
    let mut consultation = participant_consultation(state, consultation_id, user_id).await?;

    let allowed = match actor {
        Actor::Patient => consultation.patient_id == *user_id,
        Actor::Professional => consultation.professional_id == *user_id,
        Actor::Either => true,
    };
    if !allowed {
        return Err(ApiError::Forbidden);
    }

    let from = consultation.status;
    action(&mut consultation)?;
    let stored = state.store.update_consultation(&consultation).await?;

    tracing::info!(
        consultation_id = %stored.id,
        from = %from,
        to = %stored.status,
        "Consultation status changed"
    );

    Ok(stored)
}

async fn answer(
    state: &AppState,
    consultation_id: &str,
    auth: &AuthUser,
    accepted: bool,
) -> Result<Consultation, ApiError> {
    let consultation = transition(
        state,
        consultation_id,
        &auth.user_id,
        Actor::Professional,
        |c| if accepted { c.accept() } else { c.reject() },
    )
    .await?;

    let notification =
        Notification::request_answered(consultation.patient_id, consultation.id, accepted);
    if let Err(e) = state.store.insert_notification(&notification).await {
        tracing::error!(
            consultation_id = %consultation.id,
            error = %e,
            "Failed to notify patient"
        );
    }

    Ok(consultation)
}

/// Professional accepts a request.
pub async fn accept(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(consultation_id): Path<String>,
) -> Result<Json<Consultation>, ApiError> {
    Ok(Json(answer(&state, &consultation_id, &auth, true).await?))
}

/// Professional declines a request.
pub async fn reject(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(consultation_id): Path<String>,
) -> Result<Json<Consultation>, ApiError> {
    Ok(Json(answer(&state, &consultation_id, &auth, false).await?))
}

/// Professional's device check passed.
pub async fn doctor_ready(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(consultation_id): Path<String>,
) -> Result<Json<Consultation>, ApiError> {
    let consultation = transition(
        &state,
        &consultation_id,
        &auth.user_id,
        Actor::Professional,
        Consultation::mark_doctor_ready,
    )
    .await?;
    Ok(Json(consultation))
}

/// Session teardown request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndConsultationRequest {
    /// How the session ended (default `completed`).
    #[serde(default)]
    pub outcome: Option<EndOutcome>,
    /// Session length in minutes.
    #[serde(default)]
    pub duration_minutes: Option<i32>,
}

/// End a paid session.
pub async fn end(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(consultation_id): Path<String>,
    body: Option<Json<EndConsultationRequest>>,
) -> Result<Json<Consultation>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let outcome = body.outcome.unwrap_or(EndOutcome::Completed);

    let consultation = transition(
        &state,
        &consultation_id,
        &auth.user_id,
        Actor::Either,
        |c| c.end(outcome, body.duration_minutes),
    )
    .await?;
    Ok(Json(consultation))
}

/// Patient reviews an ended session.
pub async fn review(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(consultation_id): Path<String>,
) -> Result<Json<Consultation>, ApiError> {
    let consultation = transition(
        &state,
        &consultation_id,
        &auth.user_id,
        Actor::Patient,
        Consultation::review,
    )
    .await?;
    Ok(Json(consultation))
}
