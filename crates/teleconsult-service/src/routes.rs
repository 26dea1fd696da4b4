//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    chat, consultations, health, notifications, payments, preferences, provider_accounts,
    realtime, webhooks,
};
use crate::state::AppState;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Payments (JWT auth)
/// - `POST /v1/payments/preferences` - Create a checkout preference
/// - `POST /v1/payments/confirm` - Confirm a payment from the return page
///
/// ## Provider accounts (JWT auth, admin key for verification)
/// - `POST /v1/provider-accounts/oauth` - `get_auth_url` / `exchange_code`
/// - `GET /v1/provider-accounts/me` - Linked-account status
/// - `DELETE /v1/provider-accounts/me` - Deactivate the linked account
/// - `PUT /v1/provider-accounts/me/payout-alias` - Set the payout alias
/// - `POST /v1/admin/professionals/:id/payout-alias/verify` - Verify an alias
///
/// ## Consultations (JWT auth)
/// - `POST /v1/consultations`, `GET /v1/consultations`
/// - `GET /v1/consultations/pending-payment`
/// - `GET /v1/consultations/:id`
/// - `POST /v1/consultations/:id/{accept,reject,doctor-ready,end,review}`
/// - `GET /v1/consultations/:id/payments`
/// - `GET|POST /v1/consultations/:id/messages`, `POST .../messages/read`
///
/// ## Notifications and realtime (JWT auth)
/// - `GET /v1/notifications`, `POST /v1/notifications/:id/read`
/// - `GET /v1/realtime` - Websocket subscription
///
/// ## Webhooks (optional signature verification)
/// - `POST /webhooks/payments` - Processor payment notifications
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let consultation_routes = Router::new()
        .route(
            "/",
            post(consultations::create_consultation).get(consultations::list_consultations),
        )
        .route("/pending-payment", get(consultations::pending_payment))
        .route("/:id", get(consultations::get_consultation))
        .route("/:id/accept", post(consultations::accept))
        .route("/:id/reject", post(consultations::reject))
        .route("/:id/doctor-ready", post(consultations::doctor_ready))
        .route("/:id/end", post(consultations::end))
        .route("/:id/review", post(consultations::review))
        .route("/:id/payments", get(payments::list_consultation_payments))
        .route(
            "/:id/messages",
            get(chat::list_messages).post(chat::send_message),
        )
        .route("/:id/messages/read", post(chat::mark_read));

    let api_routes = Router::new()
        // Payments
        .route("/payments/preferences", post(preferences::create_preference))
        .route("/payments/confirm", post(payments::confirm_payment))
        // Provider accounts
        .route("/provider-accounts/oauth", post(provider_accounts::oauth))
        .route(
            "/provider-accounts/me",
            get(provider_accounts::get_account).delete(provider_accounts::disconnect_account),
        )
        .route(
            "/provider-accounts/me/payout-alias",
            put(provider_accounts::set_payout_alias),
        )
        .route(
            "/admin/professionals/:id/payout-alias/verify",
            post(provider_accounts::verify_payout_alias),
        )
        // Consultations, chat
        .nest("/consultations", consultation_routes)
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/:id/read", post(notifications::mark_read))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Long-lived sockets stay outside the concurrency limit
        .route("/v1/realtime", get(realtime::realtime))
        // Webhooks (no rate limit - controlled by the processor)
        .route("/webhooks/payments", post(webhooks::payment_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
