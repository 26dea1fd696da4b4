//! Application state.

use std::sync::Arc;

use teleconsult_store::{ChangeFeed, Store};

use crate::config::ServiceConfig;
use crate::mercadopago::MercadoPagoClient;
use crate::pipeline::Pipeline;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend, already wired to publish on `feed`.
    pub store: Arc<dyn Store>,

    /// Change feed backing realtime subscriptions.
    pub feed: ChangeFeed,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Payment-processor client.
    pub mercadopago: Arc<MercadoPagoClient>,

    /// Steps run after a payment is recorded.
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Create a new application state with the default post-payment pipeline.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, feed: ChangeFeed, config: ServiceConfig) -> Self {
        let mercadopago = Arc::new(MercadoPagoClient::new(
            config.mp_api_base_url.clone(),
            config.mp_auth_base_url.clone(),
        ));

        if config.oauth_credentials().is_err() {
            tracing::warn!("OAuth credentials not configured - provider account linking disabled");
        }
        if config.platform_credentials().is_err() {
            tracing::warn!("Platform credentials not configured - checkout preferences disabled");
        }
        if config.mp_webhook_secret.is_none() {
            tracing::warn!("Webhook secret not configured - signatures will not be verified");
        }
        tracing::info!(api_base_url = %config.mp_api_base_url, "Payment processor client ready");

        Self {
            store,
            feed,
            config,
            mercadopago,
            pipeline: Arc::new(Pipeline::post_payment()),
        }
    }

    /// Replace the post-payment pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }
}
