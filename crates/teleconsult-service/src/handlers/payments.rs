//! Return-page confirmation and payment history.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use teleconsult_core::{ConsultError, PaymentRecord, TransferRecord};
use teleconsult_store::Store;

use super::{parse_body, participant_consultation};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::pipeline::reconcile_payment;
use crate::state::AppState;

/// Confirmation request sent by the payment return page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    /// Consultation the patient paid for.
    pub consultation_id: String,
    /// Processor payment id from the return URL.
    pub payment_id: String,
}

/// Confirmation response.
#[derive(Debug, Serialize)]
pub struct ConfirmPaymentResponse {
    /// Whether the consultation is paid.
    pub confirmed: bool,
    /// `processed`, `duplicate`, or the processor status when not confirmed.
    pub status: String,
}

/// Confirm a payment synchronously.
///
/// Runs the same reconciliation as the webhook; an unapproved or foreign payment
/// is a soft failure that changes nothing.
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    body: String,
) -> Result<Json<ConfirmPaymentResponse>, ApiError> {
    let body: ConfirmPaymentRequest = parse_body(&body)?;
    let payment_id = body.payment_id.trim();
    if payment_id.is_empty() {
        return Err(ConsultError::Validation("paymentId is required".into()).into());
    }

    let consultation = participant_consultation(&state, &body.consultation_id, &auth.user_id).await?;

    let outcome = reconcile_payment(&state, payment_id, Some(&consultation.id)).await?;

    tracing::info!(
        consultation_id = %consultation.id,
        payment_id = %payment_id,
        outcome = outcome.label(),
        "Payment confirmation requested"
    );

    Ok(Json(ConfirmPaymentResponse {
        confirmed: outcome.is_confirmed(),
        status: outcome.label().to_string(),
    }))
}

/// Ledger entries for one consultation.
#[derive(Debug, Serialize)]
pub struct ConsultationPaymentsResponse {
    /// Payment records.
    pub payments: Vec<PaymentRecord>,
    /// Transfer attempts.
    pub transfers: Vec<TransferRecord>,
}

/// List payment and transfer records for a consultation.
pub async fn list_consultation_payments(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(consultation_id): Path<String>,
) -> Result<Json<ConsultationPaymentsResponse>, ApiError> {
    let consultation = participant_consultation(&state, &consultation_id, &auth.user_id).await?;

    let payments = state
        .store
        .list_payments_for_consultation(&consultation.id)
        .await?;
    let transfers = state
        .store
        .list_transfers_for_consultation(&consultation.id)
        .await?;

    Ok(Json(ConsultationPaymentsResponse {
        payments,
        transfers,
    }))
}
