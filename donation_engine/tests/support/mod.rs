#![allow(dead_code)]
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use donation_engine::{
    db_types::{Donation, DonationType, DonorStatus, MatchingDonor, MatchingType, NewDonation},
    events::EventProducers,
    test_utils::prepare_env::new_test_database,
    webhook_objects::WebhookEnvelope,
    DonationStore,
    PayloadDecryptor,
    SqliteDatabase,
    WebhookApi,
};
use dpg_common::Money;
use rust_decimal::Decimal;
use serde_json::Value;

pub const AES_KEY: &str = "6b1f0c5e2d4a39870e7f1a2b3c4d5e6f8091a2b3c4d5e6f708192a3b4c5d6e7f";
pub const AES_IV: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f0";

pub fn decryptor() -> PayloadDecryptor {
    PayloadDecryptor::from_hex(AES_KEY, AES_IV).expect("Test key material is valid")
}

pub fn envelope(event_type: &str, payload: &Value) -> WebhookEnvelope {
    WebhookEnvelope { event_type: event_type.to_string(), payload: decryptor().encrypt_json(payload) }
}

pub fn money(s: &str) -> Money {
    Money::from_str(s).expect("Not a valid amount")
}

pub async fn setup_db() -> (String, SqliteDatabase) {
    new_test_database().await
}

pub async fn webhook_api(db: SqliteDatabase, producers: EventProducers) -> WebhookApi<SqliteDatabase> {
    WebhookApi::new(db, decryptor(), producers)
}

pub async fn crypto_donation(db: &SqliteDatabase, pledge_id: &str, slug: &str, value: Option<&str>) -> Donation {
    let mut donation = NewDonation::new(slug, DonationType::Crypto).with_pledge_id(pledge_id);
    donation.value_at_donation_time_usd = value.map(money);
    db.insert_donation(donation).await.expect("Error inserting donation")
}

pub async fn donation_at(db: &SqliteDatabase, slug: &str, value: &str, created_at: DateTime<Utc>) -> Donation {
    let donation = NewDonation::new(slug, DonationType::Fiat).with_value_usd(money(value)).with_created_at(created_at);
    db.insert_donation(donation).await.expect("Error inserting donation")
}

pub fn all_projects_donor(id: &str, budget: &str, multiplier: &str) -> MatchingDonor {
    let now = Utc::now();
    MatchingDonor {
        id: id.to_string(),
        name: format!("Donor {id}"),
        matching_type: MatchingType::AllProjects,
        total_matching_amount: money(budget),
        multiplier: Decimal::from_str(multiplier).expect("Not a valid multiplier"),
        supported_project_slugs: vec![],
        start_date: now - Duration::days(30),
        end_date: now + Duration::days(30),
        status: DonorStatus::Active,
    }
}

pub fn project_donor(id: &str, budget: &str, multiplier: &str, slugs: &[&str]) -> MatchingDonor {
    let mut donor = all_projects_donor(id, budget, multiplier);
    donor.matching_type = MatchingType::PerProject;
    donor.supported_project_slugs = slugs.iter().map(|s| s.to_string()).collect();
    donor
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
