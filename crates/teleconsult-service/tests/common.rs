//! Common test utilities for teleconsult integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use teleconsult_core::{
    Consultation, ConsultationId, PayoutProfile, ProviderPaymentAccount, UserId,
};
use teleconsult_service::{create_router, AppState, ServiceConfig};
use teleconsult_store::{ChangeFeed, MemoryStore, Observed, Store};

/// Server-side access token used for payment lookups.
pub const SERVICE_TOKEN: &str = "APP_USR-service";

/// Platform access token used for checkout preferences.
pub const PLATFORM_TOKEN: &str = "APP_USR-platform";

/// Platform public key returned to the checkout page.
pub const PUBLIC_KEY: &str = "APP_USR-public";

/// Admin key for admin-only endpoints.
pub const ADMIN_KEY: &str = "test-admin-key";

/// Processor account id of the linked professional.
pub const EXTERNAL_ACCOUNT_ID: &str = "123456";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Stand-in for the payment processor API.
    pub processor: MockServer,
    /// Direct store access for seeding and assertions.
    pub store: Arc<dyn Store>,
    /// The patient in seeded consultations.
    pub patient_id: UserId,
    /// The professional in seeded consultations.
    pub professional_id: UserId,
}

impl TestHarness {
    /// Create a harness with every processor credential configured.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a harness, letting the caller adjust the configuration.
    pub async fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let processor = MockServer::start().await;

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            admin_api_key: Some(ADMIN_KEY.into()),
            mp_client_id: Some("8765".into()),
            mp_client_secret: Some("client-secret".into()),
            mp_access_token: Some(SERVICE_TOKEN.into()),
            mp_platform_access_token: Some(PLATFORM_TOKEN.into()),
            mp_platform_public_key: Some(PUBLIC_KEY.into()),
            mp_api_base_url: processor.uri(),
            mp_auth_base_url: "https://auth.test".into(),
            frontend_url: "https://app.test".into(),
            public_base_url: "https://api.test".into(),
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let feed = ChangeFeed::new(config.feed_capacity);
        let store: Arc<dyn Store> = Arc::new(Observed::new(MemoryStore::new(), feed.clone()));

        let state = AppState::new(store.clone(), feed, config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            processor,
            store,
            patient_id: UserId::generate(),
            professional_id: UserId::generate(),
        }
    }

    /// Authorization header value for a user.
    pub fn auth(user_id: &UserId) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer test-token:{user_id}"))
            .expect("valid header value")
    }

    /// The `authorization` header name.
    pub fn authorization() -> HeaderName {
        HeaderName::from_static("authorization")
    }

    /// Authorization header value for the patient.
    pub fn patient_auth(&self) -> HeaderValue {
        Self::auth(&self.patient_id)
    }

    /// Authorization header value for the professional.
    pub fn professional_auth(&self) -> HeaderValue {
        Self::auth(&self.professional_id)
    }

    /// Store an accepted consultation awaiting payment.
    pub async fn seed_consultation(&self, fee_cents: i64) -> Consultation {
        let mut consultation =
            Consultation::request(self.patient_id, self.professional_id, fee_cents)
                .expect("valid consultation");
        consultation.accept().expect("pending consultation accepts");
        self.store
            .insert_consultation(&consultation)
            .await
            .expect("insert consultation");
        consultation
    }

    /// Link the professional's processor account.
    pub async fn link_professional(&self) {
        let account = ProviderPaymentAccount::linked(
            self.professional_id,
            "APP_USR-professional".into(),
            Some("TG-refresh".into()),
            Some(EXTERNAL_ACCOUNT_ID.into()),
            Some("APP_USR-professional-public".into()),
        );
        self.store
            .upsert_provider_account(&account)
            .await
            .expect("link account");
    }

    /// Configure the professional's payout alias.
    pub async fn set_alias(&self, alias: &str, verified: bool) {
        let mut profile = PayoutProfile::with_alias(self.professional_id, alias);
        if verified {
            profile.verify();
        }
        self.store
            .upsert_payout_profile(&profile)
            .await
            .expect("set alias");
    }

    /// Serve a processor payment.
    pub async fn mount_payment(
        &self,
        payment_id: &str,
        status: &str,
        amount: f64,
        consultation_id: &ConsultationId,
    ) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/payments/{payment_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": payment_id.parse::<u64>().map_or_else(|_| json!(payment_id), |n| json!(n)),
                "status": status,
                "transaction_amount": amount,
                "external_reference": consultation_id.to_string(),
                "payment_method_id": "visa",
            })))
            .mount(&self.processor)
            .await;
    }

    /// Current stored copy of a consultation.
    pub async fn reload(&self, consultation_id: &ConsultationId) -> Consultation {
        self.store
            .get_consultation(consultation_id)
            .await
            .expect("read consultation")
            .expect("consultation exists")
    }
}

/// Webhook body for a payment event.
pub fn payment_event(payment_id: &str) -> serde_json::Value {
    json!({
        "type": "payment",
        "action": "payment.updated",
        "data": { "id": payment_id },
    })
}
