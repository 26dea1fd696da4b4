//! Checkout preference creation.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use teleconsult_core::{amount_to_cents, cents_to_amount, split, ConsultError};
use teleconsult_store::Store;

use super::{parse_body, participant_consultation};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::mercadopago::{
    BackUrls, Disbursement, MercadoPagoError, PreferenceItem, PreferenceMetadata,
    PreferenceRequest,
};
use crate::state::AppState;

/// Currency charged for consultations.
pub const CURRENCY_ID: &str = "ARS";

/// Preference creation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePreferenceRequest {
    /// Consultation being paid for.
    pub consultation_id: String,
    /// Item title shown at checkout.
    pub title: String,
    /// Unit price in currency units.
    pub price: f64,
    /// Quantity (default 1).
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// Preference creation response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePreferenceResponse {
    /// Opaque preference handle.
    pub preference_id: String,
    /// Public key for client-side checkout rendering.
    pub public_key: String,
    /// Hosted checkout URL, when the processor returns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_point: Option<String>,
}

/// Create a checkout preference splitting the charge between platform and professional.
///
/// Nothing is persisted; the payment is only recorded when the processor confirms it.
pub async fn create_preference(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    body: String,
) -> Result<Json<CreatePreferenceResponse>, ApiError> {
    let body: CreatePreferenceRequest = parse_body(&body)?;

    if body.title.trim().is_empty() {
        return Err(ConsultError::Validation("title is required".into()).into());
    }
    if body.quantity == 0 {
        return Err(ConsultError::Validation("quantity must be at least 1".into()).into());
    }
    let unit_cents = amount_to_cents(body.price)?;
    if unit_cents == 0 {
        return Err(ConsultError::InvalidAmount("price must be positive".into()).into());
    }

    let consultation = participant_consultation(&state, &body.consultation_id, &auth.user_id).await?;

    let account = state
        .store
        .get_provider_account(&consultation.professional_id)
        .await?;
    let collector_id = account
        .as_ref()
        .and_then(|a| a.linked_account_id())
        .ok_or_else(|| ConsultError::ProviderAccountNotLinked {
            professional_id: consultation.professional_id.to_string(),
        })?
        .to_string();

    let (access_token, public_key) = state.config.platform_credentials()?;

    let total_cents = unit_cents
        .checked_mul(i64::from(body.quantity))
        .ok_or_else(|| ConsultError::InvalidAmount("total too large".into()))?;
    let fees = split(total_cents)?;

    let consultation_id = consultation.id.to_string();
    let request = PreferenceRequest {
        items: vec![PreferenceItem {
            id: consultation_id.clone(),
            title: body.title.trim().to_string(),
            quantity: body.quantity,
            unit_price: cents_to_amount(unit_cents),
            currency_id: CURRENCY_ID.to_string(),
        }],
        back_urls: BackUrls {
            success: state.config.return_url("success", &consultation_id),
            failure: state.config.return_url("failure", &consultation_id),
            pending: state.config.return_url("pending", &consultation_id),
        },
        auto_return: "approved".to_string(),
        notification_url: state.config.notification_url(),
        external_reference: consultation_id.clone(),
        marketplace_fee: fees.platform_fee_amount(),
        disbursement: Disbursement {
            collector_id,
            amount: fees.provider_fee_amount(),
        },
        metadata: PreferenceMetadata {
            consultation_id: consultation_id.clone(),
            professional_id: consultation.professional_id.to_string(),
            platform_fee: fees.platform_fee_amount(),
            provider_fee: fees.provider_fee_amount(),
        },
    };

    let preference = state
        .mercadopago
        .create_preference(access_token, &request)
        .await
        .map_err(|e| match e {
            MercadoPagoError::Api { status, body } => {
                ConsultError::PreferenceCreationFailed { status, body }
            }
            other => ConsultError::UpstreamFailure(other.to_string()),
        })?;

    tracing::info!(
        consultation_id = %consultation_id,
        preference_id = %preference.id,
        total_cents = fees.total_cents,
        platform_fee_cents = fees.platform_fee_cents,
        provider_fee_cents = fees.provider_fee_cents,
        "Checkout preference created"
    );

    Ok(Json(CreatePreferenceResponse {
        preference_id: preference.id,
        public_key: public_key.to_string(),
        init_point: preference.init_point,
    }))
}
