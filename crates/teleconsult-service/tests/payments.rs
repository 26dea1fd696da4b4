//! Checkout, webhook and confirmation integration tests.

mod common;

use std::future::IntoFuture;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{payment_event, TestHarness, EXTERNAL_ACCOUNT_ID, PLATFORM_TOKEN, PUBLIC_KEY, SERVICE_TOKEN};
use teleconsult_core::{
    split, ConsultationId, ConsultationStatus, ExternalTransactionId, NotificationKind,
    PaymentRecord, TransferStatus, UserId,
};
use teleconsult_service::crypto::{hmac_sha256_hex, signature_manifest};
use teleconsult_store::Store;

// ============================================================================
// Checkout preferences
// ============================================================================

#[tokio::test]
async fn preference_splits_fee_between_platform_and_professional() {
    let harness = TestHarness::new().await;
    harness.link_professional().await;
    let consultation = harness.seed_consultation(100_000).await;

    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .and(header("authorization", format!("Bearer {PLATFORM_TOKEN}").as_str()))
        .and(body_partial_json(json!({
            "external_reference": consultation.id.to_string(),
            "marketplace_fee": 100.0,
            "disbursement": { "collector_id": EXTERNAL_ACCOUNT_ID, "amount": 900.0 },
            "notification_url": "https://api.test/webhooks/payments",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pref-1",
            "init_point": "https://checkout.test/pref-1",
        })))
        .expect(1)
        .mount(&harness.processor)
        .await;

    let response = harness
        .server
        .post("/v1/payments/preferences")
        .add_header(TestHarness::authorization(), harness.patient_auth())
        .json(&json!({
            "consultationId": consultation.id.to_string(),
            "title": "Consulta clínica",
            "price": 1000.0,
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["preferenceId"], "pref-1");
    assert_eq!(body["publicKey"], PUBLIC_KEY);
    assert_eq!(body["initPoint"], "https://checkout.test/pref-1");

    // Nothing is recorded until the processor confirms.
    assert!(!harness.reload(&consultation.id).await.is_paid());
}

#[tokio::test]
async fn preference_requires_linked_professional() {
    let harness = TestHarness::new().await;
    let consultation = harness.seed_consultation(100_000).await;

    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "never" })))
        .expect(0)
        .mount(&harness.processor)
        .await;

    let response = harness
        .server
        .post("/v1/payments/preferences")
        .add_header(TestHarness::authorization(), harness.patient_auth())
        .json(&json!({
            "consultationId": consultation.id.to_string(),
            "title": "Consulta",
            "price": 1000.0,
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "provider_account_not_linked");
}

#[tokio::test]
async fn preference_rejection_does_not_leak_processor_body() {
    let harness = TestHarness::new().await;
    harness.link_professional().await;
    let consultation = harness.seed_consultation(100_000).await;

    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "invalid collector internal-ref-7781",
        })))
        .mount(&harness.processor)
        .await;

    let response = harness
        .server
        .post("/v1/payments/preferences")
        .add_header(TestHarness::authorization(), harness.patient_auth())
        .json(&json!({
            "consultationId": consultation.id.to_string(),
            "title": "Consulta",
            "price": 1000.0,
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(!response.text().contains("internal-ref-7781"));
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "preference_creation_failed");
}

#[tokio::test]
async fn preference_validates_input() {
    let harness = TestHarness::new().await;
    harness.link_professional().await;
    let consultation = harness.seed_consultation(100_000).await;

    let response = harness
        .server
        .post("/v1/payments/preferences")
        .add_header(TestHarness::authorization(), harness.patient_auth())
        .json(&json!({
            "consultationId": consultation.id.to_string(),
            "title": "Consulta",
            "price": 0.0,
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_amount");

    let response = harness
        .server
        .post("/v1/payments/preferences")
        .add_header(TestHarness::authorization(), harness.patient_auth())
        .text("{not json")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "validation_failed");
}

#[tokio::test]
async fn preference_for_someone_elses_consultation_is_forbidden() {
    let harness = TestHarness::new().await;
    harness.link_professional().await;
    let consultation = harness.seed_consultation(100_000).await;

    let response = harness
        .server
        .post("/v1/payments/preferences")
        .add_header(
            TestHarness::authorization(),
            TestHarness::auth(&UserId::generate()),
        )
        .json(&json!({
            "consultationId": consultation.id.to_string(),
            "title": "Consulta",
            "price": 1000.0,
        }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn preference_without_auth_fails() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/payments/preferences")
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Webhooks
// ============================================================================

#[tokio::test]
async fn approved_webhook_records_payment_and_distributes_funds() {
    let harness = TestHarness::new().await;
    harness.link_professional().await;
    harness.set_alias("dr.garcia.mp", true).await;
    let consultation = harness.seed_consultation(100_000).await;

    Mock::given(method("GET"))
        .and(path("/v1/payments/1001"))
        .and(header("authorization", format!("Bearer {SERVICE_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1001,
            "status": "approved",
            "transaction_amount": 1000.0,
            "external_reference": consultation.id.to_string(),
            "payment_method_id": "visa",
        })))
        .expect(1)
        .mount(&harness.processor)
        .await;

    let response = harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1001"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["received"], true);
    assert_eq!(body["status"], "processed");

    let stored = harness.reload(&consultation.id).await;
    assert!(stored.is_paid());
    assert_eq!(stored.status, ConsultationStatus::Paid);

    let payments = harness
        .store
        .list_payments_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].transaction_id.as_str(), "MP-1001");
    assert_eq!(payments[0].total_amount_cents, 100_000);
    assert_eq!(payments[0].platform_fee_cents, 10_000);
    assert_eq!(payments[0].provider_fee_cents, 90_000);
    assert!(payments[0].transfers_completed);

    let transfers = harness
        .store
        .list_transfers_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].status, TransferStatus::Completed);
    assert_eq!(transfers[0].amount_cents, 90_000);
    assert_eq!(transfers[0].recipient_alias.as_deref(), Some("dr.garcia.mp"));

    let notifications = harness
        .store
        .list_notifications(&harness.professional_id, true, 10)
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::PaymentReceived);
}

#[tokio::test]
async fn duplicate_webhook_is_recorded_once() {
    let harness = TestHarness::new().await;
    harness.set_alias("dr.garcia.mp", true).await;
    let consultation = harness.seed_consultation(100_000).await;
    harness
        .mount_payment("1002", "approved", 1000.0, &consultation.id)
        .await;

    let first = harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1002"))
        .await;
    first.assert_status_ok();
    assert_eq!(first.json::<Value>()["status"], "processed");

    let second = harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1002"))
        .await;
    second.assert_status_ok();
    assert_eq!(second.json::<Value>()["status"], "duplicate");

    let payments = harness
        .store
        .list_payments_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);

    let transfers = harness
        .store
        .list_transfers_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert_eq!(transfers.len(), 1);

    let notifications = harness
        .store
        .list_notifications(&harness.professional_id, false, 10)
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
}

#[tokio::test]
async fn concurrent_deliveries_distribute_once() {
    let harness = TestHarness::new().await;
    harness.set_alias("dr.garcia.mp", true).await;
    let consultation = harness.seed_consultation(100_000).await;
    harness
        .mount_payment("1003", "approved", 1000.0, &consultation.id)
        .await;

    let event = payment_event("1003");
    let (a, b) = tokio::join!(
        harness
            .server
            .post("/webhooks/payments")
            .json(&event)
            .into_future(),
        harness
            .server
            .post("/webhooks/payments")
            .json(&event)
            .into_future(),
    );
    a.assert_status_ok();
    b.assert_status_ok();

    let mut statuses = vec![
        a.json::<Value>()["status"].as_str().unwrap().to_string(),
        b.json::<Value>()["status"].as_str().unwrap().to_string(),
    ];
    statuses.sort();
    assert_eq!(statuses, ["duplicate", "processed"]);

    let transfers = harness
        .store
        .list_transfers_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert_eq!(transfers.len(), 1);

    let notifications = harness
        .store
        .list_notifications(&harness.professional_id, false, 10)
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
}

#[tokio::test]
async fn retried_delivery_completes_interrupted_distribution() {
    let harness = TestHarness::new().await;
    harness.set_alias("dr.garcia.mp", true).await;
    let consultation = harness.seed_consultation(100_000).await;

    // An earlier delivery committed the payment and stopped there.
    let fees = split(100_000).unwrap();
    harness
        .store
        .insert_payment(&PaymentRecord::approved(
            ExternalTransactionId::for_payment("1007"),
            consultation.id,
            &fees,
            Some("visa".into()),
        ))
        .await
        .unwrap();
    assert!(!harness.reload(&consultation.id).await.is_paid());

    harness
        .mount_payment("1007", "approved", 1000.0, &consultation.id)
        .await;

    let response = harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1007"))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "duplicate");

    assert!(harness.reload(&consultation.id).await.is_paid());

    let payments = harness
        .store
        .list_payments_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);
    assert!(payments[0].transfers_completed);

    let transfers = harness
        .store
        .list_transfers_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].status, TransferStatus::Completed);
    assert_eq!(transfers[0].transaction_id.as_str(), "MP-1007");

    let notifications = harness
        .store
        .list_notifications(&harness.professional_id, false, 10)
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::PaymentReceived);

    // A further retry finds everything in place.
    harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1007"))
        .await
        .assert_status_ok();
    let transfers = harness
        .store
        .list_transfers_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert_eq!(transfers.len(), 1);
    let notifications = harness
        .store
        .list_notifications(&harness.professional_id, false, 10)
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
}

#[tokio::test]
async fn unverified_alias_holds_funds_but_payment_succeeds() {
    let harness = TestHarness::new().await;
    harness.set_alias("dr.garcia.mp", false).await;
    let consultation = harness.seed_consultation(100_000).await;
    harness
        .mount_payment("1004", "approved", 1000.0, &consultation.id)
        .await;

    let response = harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1004"))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "processed");

    assert!(harness.reload(&consultation.id).await.is_paid());

    let transfers = harness
        .store
        .list_transfers_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].status, TransferStatus::Failed);
    assert_eq!(transfers[0].error_message.as_deref(), Some("Alias not verified"));

    let payments = harness
        .store
        .list_payments_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert!(!payments[0].transfers_completed);
}

#[tokio::test]
async fn missing_alias_records_failed_transfer() {
    let harness = TestHarness::new().await;
    let consultation = harness.seed_consultation(100_000).await;
    harness
        .mount_payment("1005", "approved", 1000.0, &consultation.id)
        .await;

    harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1005"))
        .await
        .assert_status_ok();

    let transfers = harness
        .store
        .list_transfers_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert_eq!(transfers[0].status, TransferStatus::Failed);
    assert_eq!(transfers[0].error_message.as_deref(), Some("No alias configured"));
    assert!(transfers[0].recipient_alias.is_none());
}

#[tokio::test]
async fn non_payment_events_are_ignored() {
    let harness = TestHarness::new().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&harness.processor)
        .await;

    let response = harness
        .server
        .post("/webhooks/payments")
        .json(&json!({ "type": "merchant_order", "data": { "id": "77" } }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["received"], true);
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn malformed_webhooks_are_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/webhooks/payments")
        .text("definitely not json")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "malformed_webhook");

    let response = harness
        .server
        .post("/webhooks/payments")
        .json(&json!({ "type": "payment", "data": {} }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "malformed_webhook");
}

#[tokio::test]
async fn path_like_payment_ids_never_reach_the_processor() {
    let harness = TestHarness::new().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .expect(0)
        .mount(&harness.processor)
        .await;

    let response = harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("../../users/me"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "validation_failed");

    let response = harness
        .server
        .post("/webhooks/payments")
        .add_query_param("type", "payment")
        .add_query_param("data.id", "1001?access_token=x")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    assert!(harness.processor.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn unapproved_payment_changes_nothing() {
    let harness = TestHarness::new().await;
    let consultation = harness.seed_consultation(100_000).await;
    harness
        .mount_payment("1006", "pending", 1000.0, &consultation.id)
        .await;

    let response = harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1006"))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "pending");

    assert!(!harness.reload(&consultation.id).await.is_paid());
    assert!(harness
        .store
        .list_payments_for_consultation(&consultation.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn payment_for_unknown_consultation_is_unresolved() {
    let harness = TestHarness::new().await;
    harness
        .mount_payment("1007", "approved", 1000.0, &ConsultationId::generate())
        .await;

    let response = harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1007"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["error"]["code"],
        "unresolved_consultation"
    );
}

#[tokio::test]
async fn processor_outage_is_reported_without_its_body() {
    let harness = TestHarness::new().await;

    Mock::given(method("GET"))
        .and(path("/v1/payments/1008"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream stack trace db-node-4"))
        .mount(&harness.processor)
        .await;

    let response = harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1008"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(!response.text().contains("db-node-4"));
    assert_eq!(response.json::<Value>()["error"]["code"], "upstream_failure");
}

#[tokio::test]
async fn query_form_notification_is_processed() {
    let harness = TestHarness::new().await;
    let consultation = harness.seed_consultation(100_000).await;
    harness
        .mount_payment("1009", "approved", 1000.0, &consultation.id)
        .await;

    let response = harness
        .server
        .post("/webhooks/payments")
        .add_query_param("type", "payment")
        .add_query_param("data.id", "1009")
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "processed");
    assert!(harness.reload(&consultation.id).await.is_paid());
}

#[tokio::test]
async fn charged_amount_wins_over_consultation_fee() {
    let harness = TestHarness::new().await;
    let consultation = harness.seed_consultation(100_000).await;
    harness
        .mount_payment("1010", "approved", 500.0, &consultation.id)
        .await;

    harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1010"))
        .await
        .assert_status_ok();

    let payments = harness
        .store
        .list_payments_for_consultation(&consultation.id)
        .await
        .unwrap();
    assert_eq!(payments[0].total_amount_cents, 50_000);
    assert_eq!(payments[0].platform_fee_cents, 5_000);
    assert_eq!(payments[0].provider_fee_cents, 45_000);
}

#[tokio::test]
async fn signed_webhooks_require_a_valid_signature() {
    let secret = "whsec-test";
    let harness = TestHarness::with_config(|config| {
        config.mp_webhook_secret = Some(secret.into());
    })
    .await;
    let consultation = harness.seed_consultation(100_000).await;
    harness
        .mount_payment("1011", "approved", 1000.0, &consultation.id)
        .await;

    let unsigned = harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("1011"))
        .await;
    unsigned.assert_status(StatusCode::BAD_REQUEST);
    assert!(!harness.reload(&consultation.id).await.is_paid());

    let ts = "1700000000";
    let v1 = hmac_sha256_hex(secret, &signature_manifest(Some("1011"), Some("req-1"), ts)).unwrap();
    let signed = harness
        .server
        .post("/webhooks/payments")
        .add_header(
            HeaderName::from_static("x-signature"),
            HeaderValue::from_str(&format!("ts={ts},v1={v1}")).unwrap(),
        )
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("req-1"),
        )
        .json(&payment_event("1011"))
        .await;

    signed.assert_status_ok();
    assert_eq!(signed.json::<Value>()["status"], "processed");
}

// ============================================================================
// Return-page confirmation
// ============================================================================

#[tokio::test]
async fn confirm_records_payment_once() {
    let harness = TestHarness::new().await;
    let consultation = harness.seed_consultation(100_000).await;
    harness
        .mount_payment("2001", "approved", 1000.0, &consultation.id)
        .await;

    let body = json!({
        "consultationId": consultation.id.to_string(),
        "paymentId": "2001",
    });

    let response = harness
        .server
        .post("/v1/payments/confirm")
        .add_header(TestHarness::authorization(), harness.patient_auth())
        .json(&body)
        .await;
    response.assert_status_ok();
    let first: Value = response.json();
    assert_eq!(first["confirmed"], true);
    assert_eq!(first["status"], "processed");

    // The webhook arriving later is a duplicate.
    let response = harness
        .server
        .post("/webhooks/payments")
        .json(&payment_event("2001"))
        .await;
    assert_eq!(response.json::<Value>()["status"], "duplicate");

    let response = harness
        .server
        .get(&format!("/v1/consultations/{}/payments", consultation.id))
        .add_header(TestHarness::authorization(), harness.professional_auth())
        .await;
    response.assert_status_ok();
    let ledger: Value = response.json();
    assert_eq!(ledger["payments"].as_array().unwrap().len(), 1);
    assert_eq!(ledger["payments"][0]["transaction_id"], "MP-2001");
    assert_eq!(ledger["transfers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn confirm_soft_fails_for_unapproved_payment() {
    let harness = TestHarness::new().await;
    let consultation = harness.seed_consultation(100_000).await;
    harness
        .mount_payment("2002", "in_process", 1000.0, &consultation.id)
        .await;

    let response = harness
        .server
        .post("/v1/payments/confirm")
        .add_header(TestHarness::authorization(), harness.patient_auth())
        .json(&json!({
            "consultationId": consultation.id.to_string(),
            "paymentId": "2002",
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["confirmed"], false);
    assert_eq!(body["status"], "in_process");
    assert!(!harness.reload(&consultation.id).await.is_paid());
}

#[tokio::test]
async fn confirm_ignores_payment_for_another_consultation() {
    let harness = TestHarness::new().await;
    let mine = harness.seed_consultation(100_000).await;
    let other = harness.seed_consultation(100_000).await;
    harness
        .mount_payment("2003", "approved", 1000.0, &other.id)
        .await;

    let response = harness
        .server
        .post("/v1/payments/confirm")
        .add_header(TestHarness::authorization(), harness.patient_auth())
        .json(&json!({
            "consultationId": mine.id.to_string(),
            "paymentId": "2003",
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["confirmed"], false);
    assert!(!harness.reload(&mine.id).await.is_paid());
    assert!(!harness.reload(&other.id).await.is_paid());
}

#[tokio::test]
async fn confirm_rejects_path_like_payment_id() {
    let harness = TestHarness::new().await;
    let consultation = harness.seed_consultation(100_000).await;

    let response = harness
        .server
        .post("/v1/payments/confirm")
        .add_header(TestHarness::authorization(), harness.patient_auth())
        .json(&json!({
            "consultationId": consultation.id.to_string(),
            "paymentId": "../../users/me",
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "validation_failed");
    assert!(harness.processor.received_requests().await.unwrap().is_empty());
    assert!(!harness.reload(&consultation.id).await.is_paid());
}

#[tokio::test]
async fn payment_lookup_requires_server_credentials() {
    let harness = TestHarness::with_config(|config| {
        config.mp_access_token = None;
        config.mp_platform_access_token = None;
    })
    .await;
    let consultation = harness.seed_consultation(100_000).await;

    let response = harness
        .server
        .post("/v1/payments/confirm")
        .add_header(TestHarness::authorization(), harness.patient_auth())
        .json(&json!({
            "consultationId": consultation.id.to_string(),
            "paymentId": "2004",
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["error"]["code"],
        "missing_credentials_configuration"
    );
}
