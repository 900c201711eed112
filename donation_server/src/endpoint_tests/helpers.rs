use std::str::FromStr;

use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web::ServiceConfig,
    App,
};
use chrono::{Duration, TimeZone, Utc};
use donation_engine::{
    db_types::{Donation, DonationType, DonorStatus, EventData, MatchingDonor, MatchingType},
    PayloadDecryptor,
};
use dpg_common::Money;
use log::debug;
use rust_decimal::Decimal;
use serde_json::{json, Value};

// Test key material. DO NOT re-use these keys anywhere.
pub const AES_KEY: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
pub const AES_IV: &str = "0102030405060708090a0b0c0d0e0f10";

pub fn decryptor() -> PayloadDecryptor {
    PayloadDecryptor::from_hex(AES_KEY, AES_IV).expect("Test key material is valid")
}

/// A webhook body for `payload`, encrypted the way the provider does it.
pub fn webhook_body(event_type: &str, payload: Value) -> String {
    json!({ "eventType": event_type, "payload": decryptor().encrypt_json(&payload) }).to_string()
}

pub fn money(s: &str) -> Money {
    Money::from_str(s).expect("Not a valid amount")
}

pub fn donation(id: i64, pledge_id: &str, slug: &str, value: &str) -> Donation {
    let created_at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    Donation {
        id,
        pledge_id: Some(pledge_id.to_string()),
        donation_uuid: None,
        project_slug: slug.to_string(),
        donation_type: DonationType::Crypto,
        amount: None,
        currency: None,
        value_at_donation_time_usd: Some(money(value)),
        status: None,
        processed: false,
        event_data: EventData::default(),
        transaction_hash: None,
        payout_amount: None,
        payout_currency: None,
        external_id: None,
        campaign_id: None,
        timestampms: None,
        eid: None,
        payment_method: None,
        converted_at: None,
        net_value_amount: None,
        gross_amount: None,
        net_value_currency: None,
        created_at,
        updated_at: created_at,
    }
}

pub fn donor(id: &str, budget: &str, multiplier: &str) -> MatchingDonor {
    let now = Utc::now();
    MatchingDonor {
        id: id.to_string(),
        name: format!("Donor {id}"),
        matching_type: MatchingType::AllProjects,
        total_matching_amount: money(budget),
        multiplier: Decimal::from_str(multiplier).expect("Not a valid multiplier"),
        supported_project_slugs: vec![],
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(1),
        status: DonorStatus::Active,
    }
}

/// Sends `req` to an app configured by `configure` and returns the status and body, whether the request succeeded or
/// was turned into an error response.
pub async fn send_request<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("🚀️ Making request");
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let (_, res) = res.into_parts();
            let status = res.status();
            let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
            (status, body)
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
            (status, body)
        },
    }
}
