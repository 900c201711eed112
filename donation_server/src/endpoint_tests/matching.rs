use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use donation_engine::{traits::DonorMatchTotal, MatchingApi};
use serde_json::{json, Value};

use super::helpers::{donation, donor, money, send_request};
use crate::{
    endpoint_tests::mocks::{MockDonationDb, MockDonorDirectory},
    errors::INVALID_MIN_DATE,
    routes::{DonorsByProjectRoute, PreviewMatchingRoute, ProcessMatchingRoute},
};

fn configure(db: MockDonationDb, directory: MockDonorDirectory) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = MatchingApi::new(db, directory);
        cfg.service(ProcessMatchingRoute::<MockDonationDb, MockDonorDirectory>::new())
            .service(PreviewMatchingRoute::<MockDonationDb, MockDonorDirectory>::new())
            .service(DonorsByProjectRoute::<MockDonationDb, MockDonorDirectory>::new())
            .app_data(web::Data::new(api));
    }
}

fn json_body(body: &str) -> Value {
    serde_json::from_str(body).expect("Response body is not JSON")
}

/// One unprocessed $100 donation to `clean-water`, and one donor with $50 left to give.
fn one_donation_one_donor(db: &mut MockDonationDb, directory: &mut MockDonorDirectory) {
    db.expect_fetch_unprocessed_donations().returning(|_| Ok(vec![donation(1, "p-1", "clean-water", "100")]));
    db.expect_sum_matched_by_donor().returning(|_| Ok(Default::default()));
    directory.expect_fetch_active_matching_donors().returning(|_| Ok(vec![donor("d1", "50", "1")]));
}

#[actix_web::test]
async fn invalid_min_date() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::post().uri("/matching/process").set_json(json!({ "minDate": "last tuesday" }));
    let (status, body) = send_request(req, configure(MockDonationDb::new(), MockDonorDirectory::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body), json!({ "error": INVALID_MIN_DATE }));
}

#[actix_web::test]
async fn empty_body_runs_live_over_everything() {
    let _ = env_logger::try_init().ok();
    let mut db = MockDonationDb::new();
    db.expect_fetch_unprocessed_donations().withf(|min_date| min_date.is_none()).returning(|_| Ok(vec![]));
    let req = TestRequest::post().uri("/matching/process");
    let (status, body) = send_request(req, configure(db, MockDonorDirectory::new())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body),
        json!({
            "success": true,
            "dryRun": false,
            "processed": 0,
            "matched": 0,
            "totalMatchedAmount": 0.0,
            "errors": []
        })
    );
}

#[actix_web::test]
async fn live_run_records_matches() {
    let _ = env_logger::try_init().ok();
    let mut db = MockDonationDb::new();
    let mut directory = MockDonorDirectory::new();
    one_donation_one_donor(&mut db, &mut directory);
    db.expect_record_matches()
        .withf(|id, entries| {
            *id == 1 &&
                entries.len() == 1 &&
                entries[0].donor_id == "d1" &&
                entries[0].matched_amount == money("50") &&
                entries[0].project_slug == "clean-water"
        })
        .times(1)
        .returning(|_, _| Ok(vec![]));
    let req = TestRequest::post().uri("/matching/process").set_json(json!({ "dryRun": false }));
    let (status, body) = send_request(req, configure(db, directory)).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["dryRun"], json!(false));
    assert_eq!(body["processed"], json!(1));
    assert_eq!(body["matched"], json!(1));
    assert_eq!(body["totalMatchedAmount"], json!(50.0));
}

#[actix_web::test]
async fn get_is_a_dry_run_by_default() {
    let _ = env_logger::try_init().ok();
    let mut db = MockDonationDb::new();
    let mut directory = MockDonorDirectory::new();
    one_donation_one_donor(&mut db, &mut directory);
    db.expect_record_matches().never();
    db.expect_mark_donation_processed().never();
    let req = TestRequest::get().uri("/matching/process");
    let (status, body) = send_request(req, configure(db, directory)).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["dryRun"], json!(true));
    assert_eq!(body["matched"], json!(1));
    assert_eq!(body["totalMatchedAmount"], json!(50.0));
}

#[actix_web::test]
async fn get_with_min_date() {
    let _ = env_logger::try_init().ok();
    let mut db = MockDonationDb::new();
    db.expect_fetch_unprocessed_donations()
        .withf(|min_date| min_date.map(|d| d.to_rfc3339()) == Some("2025-01-01T00:00:00+00:00".to_string()))
        .times(1)
        .returning(|_| Ok(vec![]));
    let req = TestRequest::get().uri("/matching/process?minDate=2025-01-01T00:00:00Z");
    let (status, _) = send_request(req, configure(db, MockDonorDirectory::new())).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn donors_by_project_needs_a_slug() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::get().uri("/matching/donors-by-project");
    let (status, body) = send_request(req, configure(MockDonationDb::new(), MockDonorDirectory::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body), json!({ "error": "The slug query parameter is required" }));
}

#[actix_web::test]
async fn donors_by_project_report() {
    let _ = env_logger::try_init().ok();
    let mut db = MockDonationDb::new();
    db.expect_matched_totals_for_project().withf(|slug| slug == "clean-water").returning(|_| {
        Ok(vec![
            DonorMatchTotal { donor_id: "d1".into(), total_matched_amount: money("40") },
            DonorMatchTotal { donor_id: "retired".into(), total_matched_amount: money("12.5") },
        ])
    });
    let mut directory = MockDonorDirectory::new();
    directory.expect_fetch_matching_donors().returning(|_| Ok(vec![donor("d1", "100", "1")]));
    let req = TestRequest::get().uri("/matching/donors-by-project?slug=clean-water");
    let (status, body) = send_request(req, configure(db, directory)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body),
        json!({
            "projectSlug": "clean-water",
            "donors": [
                { "donorId": "d1", "donorName": "Donor d1", "totalMatchedAmount": 40.0 },
                { "donorId": "retired", "donorName": "Unknown Donor", "totalMatchedAmount": 12.5 }
            ]
        })
    );
}
