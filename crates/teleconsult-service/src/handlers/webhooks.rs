//! Payment-processor webhook.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use teleconsult_core::ConsultError;

use crate::crypto::verify_webhook_signature;
use crate::error::ApiError;
use crate::mercadopago::WebhookNotification;
use crate::pipeline::reconcile_payment;
use crate::state::AppState;

/// Event type handled; everything else is acknowledged and ignored.
const PAYMENT_EVENT: &str = "payment";

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was received.
    pub received: bool,
    /// `ignored`, `processed`, `duplicate`, or the processor status of an
    /// unapproved payment.
    pub status: String,
}

impl WebhookResponse {
    fn new(status: impl Into<String>) -> Self {
        Self {
            received: true,
            status: status.into(),
        }
    }
}

/// Handle processor payment notifications.
///
/// Accepts the JSON body form and the `?type=payment&data.id=...` query form.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let notification: WebhookNotification = if body.trim().is_empty() {
        WebhookNotification::default()
    } else {
        serde_json::from_str(&body)
            .map_err(|e| ConsultError::MalformedWebhook(format!("invalid JSON body: {e}")))?
    };

    let event_type = notification
        .event_type
        .clone()
        .or_else(|| notification.topic.clone())
        .or_else(|| query.get("type").cloned())
        .or_else(|| query.get("topic").cloned());

    let payment_id = notification
        .data
        .as_ref()
        .and_then(|d| d.id.clone())
        .or_else(|| query.get("data.id").cloned())
        .or_else(|| query.get("id").cloned())
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    if let Some(secret) = &state.config.mp_webhook_secret {
        let signature = headers.get("x-signature").and_then(|v| v.to_str().ok());
        let request_id = headers.get("x-request-id").and_then(|v| v.to_str().ok());

        verify_webhook_signature(secret, signature, payment_id.as_deref(), request_id).map_err(
            |e| {
                tracing::warn!(error = %e, "Invalid payment webhook signature");
                ApiError::BadRequest("Invalid webhook signature".into())
            },
        )?;
    }

    tracing::info!(
        event_type = ?event_type,
        action = ?notification.action,
        payment_id = ?payment_id,
        "Received payment webhook"
    );

    if event_type.as_deref() != Some(PAYMENT_EVENT) {
        tracing::debug!(event_type = ?event_type, "Ignoring non-payment webhook");
        return Ok(Json(WebhookResponse::new("ignored")));
    }

    let payment_id = payment_id
        .ok_or_else(|| ConsultError::MalformedWebhook("missing data.id".into()))?;

    let outcome = reconcile_payment(&state, &payment_id, None).await?;

    Ok(Json(WebhookResponse::new(outcome.label())))
}
