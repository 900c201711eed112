use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use chrono::{Duration, Utc};
use donation_engine::{
    db_types::Donation,
    events::EventProducers,
    traits::{ApplyEventResult, DonationStoreError},
    WebhookApi,
};
use serde_json::{json, Value};

use super::helpers::{decryptor, donation, send_request, webhook_body};
use crate::{endpoint_tests::mocks::MockDonationDb, routes::TgbWebhookRoute};

fn configure(db: MockDonationDb) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = WebhookApi::new(db, decryptor(), EventProducers::default());
        cfg.service(TgbWebhookRoute::<MockDonationDb>::new()).app_data(web::Data::new(api));
    }
}

fn post(body: impl Into<String>) -> TestRequest {
    TestRequest::post().uri("/tgb").insert_header(("Content-Type", "application/json")).set_payload(body.into())
}

fn deposit(eid: &str, pledge_id: &str) -> Value {
    json!({
        "eid": eid,
        "pledgeId": pledge_id,
        "transactionHash": "0xabc123",
        "valueAtDonationTimeUSD": "250.00",
        "eventTimestamp": Utc::now().timestamp_millis(),
    })
}

fn json_body(body: &str) -> Value {
    serde_json::from_str(body).expect("Response body is not JSON")
}

#[actix_web::test]
async fn malformed_envelope() {
    let _ = env_logger::try_init().ok();
    let (status, body) = send_request(post("{\"payload\": 42}"), configure(MockDonationDb::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_body(&body)["error"].as_str().unwrap().starts_with("Could not read request body"));
}

#[actix_web::test]
async fn payload_that_does_not_decrypt() {
    let _ = env_logger::try_init().ok();
    let body = json!({ "eventType": "DEPOSIT_TRANSACTION", "payload": "not hex at all" }).to_string();
    let (status, body) = send_request(post(body), configure(MockDonationDb::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body), json!({ "error": "Failed to decrypt payload" }));
}

#[actix_web::test]
async fn decryption_failures_are_indistinguishable() {
    let _ = env_logger::try_init().ok();
    // Decrypts with valid padding to something that is not JSON
    let not_json = decryptor().encrypt("hello");
    let mut bad_padding = not_json[..not_json.len() - 2].to_string();
    bad_padding.push_str("00");
    let mut responses = Vec::new();
    for payload in [not_json, bad_padding] {
        let body = json!({ "eventType": "DEPOSIT_TRANSACTION", "payload": payload }).to_string();
        responses.push(send_request(post(body), configure(MockDonationDb::new())).await);
    }
    assert_eq!(responses[0].0, StatusCode::BAD_REQUEST);
    assert_eq!(responses[0], responses[1]);
}

#[actix_web::test]
async fn stale_event_is_rejected() {
    let _ = env_logger::try_init().ok();
    let mut payload = deposit("evt-1", "p-1");
    payload["eventTimestamp"] = json!((Utc::now() - Duration::hours(2)).timestamp_millis());
    // The store must not be touched
    let db = MockDonationDb::new();
    let (status, body) = send_request(post(webhook_body("DEPOSIT_TRANSACTION", payload)), configure(db)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Outdated event"));
}

#[actix_web::test]
async fn missing_event_timestamp_is_rejected() {
    let _ = env_logger::try_init().ok();
    let payload = json!({ "eid": "evt-1", "pledgeId": "p-1" });
    let (status, body) =
        send_request(post(webhook_body("DEPOSIT_TRANSACTION", payload)), configure(MockDonationDb::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body), json!({ "error": "Invalid eventTimestamp: missing" }));
}

#[actix_web::test]
async fn duplicate_delivery_is_acknowledged() {
    let _ = env_logger::try_init().ok();
    let mut db = MockDonationDb::new();
    db.expect_has_webhook_event().withf(|eid| eid == "evt-1").times(1).returning(|_| Ok(true));
    db.expect_apply_donation_event().never();
    let (status, body) =
        send_request(post(webhook_body("DEPOSIT_TRANSACTION", deposit("evt-1", "p-1"))), configure(db)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({ "message": "Webhook processed successfully" }));
}

#[actix_web::test]
async fn deposit_is_applied_to_its_donation() {
    let _ = env_logger::try_init().ok();
    let mut db = MockDonationDb::new();
    db.expect_has_webhook_event().returning(|_| Ok(false));
    db.expect_fetch_donation_by_pledge_id()
        .withf(|id| id == "p-1")
        .returning(|_| Ok(Some(donation(7, "p-1", "clean-water", "100"))));
    db.expect_apply_donation_event()
        .withf(|id, update, event| {
            *id == 7 &&
                update.transaction_hash.as_deref() == Some("0xabc123") &&
                update.eid.as_deref() == Some("evt-2") &&
                event.eid == "evt-2" &&
                event.event_type == "DEPOSIT_TRANSACTION"
        })
        .times(1)
        .returning(|id, _, _| {
            let mut updated: Donation = donation(id, "p-1", "clean-water", "250");
            updated.eid = Some("evt-2".into());
            Ok(ApplyEventResult::Applied(Box::new(updated)))
        });
    let (status, body) =
        send_request(post(webhook_body("DEPOSIT_TRANSACTION", deposit("evt-2", "p-1"))), configure(db)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({ "message": "Webhook processed successfully" }));
}

#[actix_web::test]
async fn unknown_donation_is_a_server_error() {
    let _ = env_logger::try_init().ok();
    let mut db = MockDonationDb::new();
    db.expect_has_webhook_event().returning(|_| Ok(false));
    db.expect_fetch_donation_by_pledge_id().returning(|_| Ok(None));
    let (status, body) =
        send_request(post(webhook_body("DEPOSIT_TRANSACTION", deposit("evt-3", "p-404"))), configure(db)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&body), json!({ "error": "Internal Server Error" }));
}

#[actix_web::test]
async fn missing_identifiers_are_a_server_error() {
    let _ = env_logger::try_init().ok();
    let payload = json!({ "pledgeId": "p-1", "eventTimestamp": Utc::now().timestamp_millis() });
    let (status, body) =
        send_request(post(webhook_body("DEPOSIT_TRANSACTION", payload)), configure(MockDonationDb::new())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&body), json!({ "error": "Internal Server Error" }));
}

#[actix_web::test]
async fn store_failures_are_a_server_error() {
    let _ = env_logger::try_init().ok();
    let mut db = MockDonationDb::new();
    db.expect_has_webhook_event().returning(|_| Err(DonationStoreError::DatabaseError("database is locked".into())));
    let (status, _) =
        send_request(post(webhook_body("DEPOSIT_TRANSACTION", deposit("evt-4", "p-1"))), configure(db)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_web::test]
async fn unhandled_event_types_never_fail() {
    let _ = env_logger::try_init().ok();
    let mut db = MockDonationDb::new();
    db.expect_has_webhook_event().returning(|_| Ok(false));
    db.expect_fetch_donation_by_pledge_id().returning(|_| Ok(None));
    db.expect_fetch_donation_by_donation_uuid().never();
    let payload = json!({ "eid": "evt-5", "pledgeId": "p-9", "eventTimestamp": Utc::now().timestamp_millis() });
    let (status, _) = send_request(post(webhook_body("PLEDGE_REFUNDED", payload)), configure(db)).await;
    assert_eq!(status, StatusCode::OK);
}
