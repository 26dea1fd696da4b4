//! Provider account linking and payout aliases.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use teleconsult_core::{ConsultError, PayoutProfile, ProviderPaymentAccount, UserId};
use teleconsult_store::Store;

use super::parse_body;
use crate::auth::{AdminAuth, AuthUser};
use crate::error::ApiError;
use crate::mercadopago::MercadoPagoError;
use crate::state::AppState;

/// OAuth request, dispatched on `action`.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OAuthRequest {
    /// Build the authorization URL.
    GetAuthUrl {
        /// Professional to link; defaults to the caller.
        #[serde(rename = "professionalId", default)]
        professional_id: Option<String>,
        /// Where the processor redirects after consent.
        #[serde(rename = "redirectUri")]
        redirect_uri: String,
    },
    /// Exchange the one-time code for credentials.
    ExchangeCode {
        /// One-time authorization code.
        code: String,
        /// Redirect URI used for the authorization request.
        #[serde(rename = "redirectUri")]
        redirect_uri: String,
        /// The echoed `state` parameter (the professional id).
        #[serde(default)]
        state: Option<String>,
    },
}

/// OAuth response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OAuthResponse {
    /// Authorization URL.
    AuthUrl {
        /// URL to send the professional to.
        url: String,
    },
    /// Successful exchange.
    Linked {
        /// Always true.
        success: bool,
        /// The professional's account id at the processor.
        #[serde(rename = "externalAccountId")]
        external_account_id: String,
    },
}

/// Provider-account linking entry point.
pub async fn oauth(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    body: String,
) -> Result<Json<OAuthResponse>, ApiError> {
    match parse_body::<OAuthRequest>(&body)? {
        OAuthRequest::GetAuthUrl {
            professional_id,
            redirect_uri,
        } => {
            let professional_id = professional_for(professional_id.as_deref(), &auth)?;
            let url = auth_url(&state, &professional_id, &redirect_uri)?;
            Ok(Json(OAuthResponse::AuthUrl { url }))
        }
        OAuthRequest::ExchangeCode {
            code,
            redirect_uri,
            state: echoed,
        } => {
            let professional_id = professional_for(echoed.as_deref(), &auth)?;
            let account = exchange_code(&state, professional_id, &code, &redirect_uri).await?;
            Ok(Json(OAuthResponse::Linked {
                success: true,
                external_account_id: account.external_account_id.unwrap_or_default(),
            }))
        }
    }
}

/// The professional named in the request, which must be the caller.
fn professional_for(requested: Option<&str>, auth: &AuthUser) -> Result<UserId, ApiError> {
    let Some(requested) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(auth.user_id);
    };

    let professional_id: UserId = requested.parse().map_err(ConsultError::from)?;
    if professional_id != auth.user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(professional_id)
}

fn auth_url(state: &AppState, professional_id: &UserId, redirect_uri: &str) -> Result<String, ApiError> {
    if redirect_uri.trim().is_empty() {
        return Err(ConsultError::Validation("redirectUri is required".into()).into());
    }
    let (client_id, _) = state.config.oauth_credentials()?;

    state
        .mercadopago
        .authorization_url(client_id, &professional_id.to_string(), redirect_uri)
        .map_err(|e| ConsultError::Validation(e.to_string()).into())
}

async fn exchange_code(
    state: &AppState,
    professional_id: UserId,
    code: &str,
    redirect_uri: &str,
) -> Result<ProviderPaymentAccount, ApiError> {
    if code.trim().is_empty() {
        return Err(ConsultError::Validation("code is required".into()).into());
    }
    let (client_id, client_secret) = state.config.oauth_credentials()?;

    let token = state
        .mercadopago
        .exchange_code(client_id, client_secret, code, redirect_uri)
        .await
        .map_err(|e| match e {
            MercadoPagoError::Api { status, body } => {
                tracing::warn!(
                    professional_id = %professional_id,
                    upstream_status = status,
                    body = %body,
                    "Authorization code rejected"
                );
                ConsultError::TokenExchangeFailed(format!("HTTP {status}"))
            }
            other => ConsultError::TokenExchangeFailed(other.to_string()),
        })?;

    let external_account_id = token
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ConsultError::TokenExchangeFailed("no account id in token response".into()))?;

    let account = ProviderPaymentAccount::linked(
        professional_id,
        token.access_token,
        token.refresh_token,
        Some(external_account_id.clone()),
        token.public_key,
    );

    state
        .store
        .upsert_provider_account(&account)
        .await
        .map_err(|e| ConsultError::AccountPersistenceFailed(e.to_string()))?;

    tracing::info!(
        professional_id = %professional_id,
        external_account_id = %external_account_id,
        "Provider account linked"
    );

    Ok(account)
}

/// Linked-account status. Never includes tokens.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAccountStatus {
    /// Whether a usable account is linked.
    pub linked: bool,
    /// Whether the stored link is active.
    pub active: bool,
    /// The processor account id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_account_id: Option<String>,
    /// When the account was linked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Payout alias.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_alias: Option<String>,
    /// Whether the alias was verified.
    pub alias_verified: bool,
}

/// Get the caller's linked account and payout profile.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ProviderAccountStatus>, ApiError> {
    let account = state.store.get_provider_account(&auth.user_id).await?;
    let profile = state.store.get_payout_profile(&auth.user_id).await?;

    Ok(Json(ProviderAccountStatus {
        linked: account
            .as_ref()
            .and_then(ProviderPaymentAccount::linked_account_id)
            .is_some(),
        active: account.as_ref().is_some_and(|a| a.active),
        external_account_id: account.as_ref().and_then(|a| a.external_account_id.clone()),
        connected_at: account.as_ref().map(|a| a.connected_at),
        payout_alias: profile.as_ref().and_then(|p| p.alias.clone()),
        alias_verified: profile.as_ref().is_some_and(|p| p.alias_verified),
    }))
}

/// Disconnect the caller's account. The record is kept, inactive.
pub async fn disconnect_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.deactivate_provider_account(&auth.user_id).await? {
        return Err(ConsultError::ProviderAccountNotLinked {
            professional_id: auth.user_id.to_string(),
        }
        .into());
    }

    tracing::info!(professional_id = %auth.user_id, "Provider account deactivated");

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Payout alias request.
#[derive(Debug, Deserialize)]
pub struct PayoutAliasRequest {
    /// The alias.
    pub alias: String,
}

/// Set the caller's payout alias. A new alias needs verification again.
pub async fn set_payout_alias(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<PayoutAliasRequest>,
) -> Result<Json<PayoutProfile>, ApiError> {
    let alias = body.alias.trim();
    if alias.is_empty() {
        return Err(ConsultError::Validation("alias is required".into()).into());
    }

    let profile = PayoutProfile::with_alias(auth.user_id, alias);
    state.store.upsert_payout_profile(&profile).await?;

    tracing::info!(professional_id = %auth.user_id, "Payout alias updated");

    Ok(Json(profile))
}

/// Mark a professional's payout alias verified (admin only).
pub async fn verify_payout_alias(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(professional_id): Path<String>,
) -> Result<Json<PayoutProfile>, ApiError> {
    let professional_id: UserId = professional_id.parse().map_err(ConsultError::from)?;

    let mut profile = state
        .store
        .get_payout_profile(&professional_id)
        .await?
        .filter(|p| p.alias.as_deref().is_some_and(|a| !a.trim().is_empty()))
        .ok_or_else(|| ApiError::NotFound("No payout alias configured".into()))?;

    profile.verify();
    state.store.upsert_payout_profile(&profile).await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        professional_id = %professional_id,
        "Payout alias verified"
    );

    Ok(Json(profile))
}
