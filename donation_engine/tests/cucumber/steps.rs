use std::str::FromStr;

use chrono::{Duration, Utc};
use cucumber::{given, then, when};
use donation_engine::{
    db_types::{DonationType, DonorStatus, MatchingDonor, MatchingType, NewDonation},
    matching_objects::MatchingOptions,
    DonationStore,
};
use dpg_common::Money;
use rust_decimal::Decimal;

use crate::cucumber::MatchingWorld;

fn money(s: &str) -> Money {
    Money::from_str(s).expect("Not a valid amount")
}

async fn add_donor(world: &mut MatchingWorld, donor: MatchingDonor) {
    world.donors.retain(|d| d.id != donor.id);
    world.donors.push(donor);
    world.db().sync_matching_donors(&world.donors).await.expect("Error syncing donors");
}

fn donor(id: String, budget: &str, multiplier: &str) -> MatchingDonor {
    let now = Utc::now();
    MatchingDonor {
        name: format!("Donor {id}"),
        id,
        matching_type: MatchingType::AllProjects,
        total_matching_amount: money(budget),
        multiplier: Decimal::from_str(multiplier).expect("Not a valid multiplier"),
        supported_project_slugs: vec![],
        start_date: now - Duration::days(7),
        end_date: now + Duration::days(7),
        status: DonorStatus::Active,
    }
}

async fn modify_donor<F: FnOnce(&mut MatchingDonor)>(world: &mut MatchingWorld, id: &str, f: F) {
    let donor = world.donors.iter_mut().find(|d| d.id == id).expect("No such donor");
    f(donor);
    world.db().sync_matching_donors(&world.donors).await.expect("Error syncing donors");
}

#[given(expr = "an all-projects matching donor '{word}' with a budget of ${word} and a multiplier of {word}")]
async fn all_projects_donor(world: &mut MatchingWorld, id: String, budget: String, multiplier: String) {
    add_donor(world, donor(id, &budget, &multiplier)).await;
}

#[given(expr = "a matching donor '{word}' for projects {string} with a budget of ${word} and a multiplier of {word}")]
async fn per_project_donor(world: &mut MatchingWorld, id: String, slugs: String, budget: String, multiplier: String) {
    let mut donor = donor(id, &budget, &multiplier);
    donor.matching_type = MatchingType::PerProject;
    donor.supported_project_slugs = slugs.split(',').map(|s| s.trim().to_string()).collect();
    add_donor(world, donor).await;
}

#[given(expr = "matching donor '{word}' is inactive")]
async fn donor_is_inactive(world: &mut MatchingWorld, id: String) {
    modify_donor(world, &id, |d| d.status = DonorStatus::Inactive).await;
}

#[given(expr = "matching donor '{word}' ended yesterday")]
async fn donor_has_ended(world: &mut MatchingWorld, id: String) {
    modify_donor(world, &id, |d| d.end_date = Utc::now() - Duration::days(1)).await;
}

#[given(expr = "a donation '{word}' of ${word} to project '{word}'")]
async fn donation(world: &mut MatchingWorld, label: String, value: String, slug: String) {
    let new_donation = NewDonation::new(slug, DonationType::Crypto).with_pledge_id(label.clone()).with_value_usd(money(&value));
    let donation = world.db().insert_donation(new_donation).await.expect("Error inserting donation");
    world.donations.insert(label, donation.id);
}

#[given(expr = "a donation '{word}' to project '{word}' with no USD value")]
async fn donation_without_value(world: &mut MatchingWorld, label: String, slug: String) {
    let new_donation = NewDonation::new(slug, DonationType::Crypto).with_pledge_id(label.clone());
    let donation = world.db().insert_donation(new_donation).await.expect("Error inserting donation");
    world.donations.insert(label, donation.id);
}

#[when("the matching engine runs")]
async fn run_matching(world: &mut MatchingWorld) {
    let result = world.api().run(MatchingOptions::live()).await.expect("Matching run failed");
    world.last_result = Some(result);
}

#[when("the matching engine runs in dry-run mode")]
async fn run_matching_dry(world: &mut MatchingWorld) {
    let result = world.api().run(MatchingOptions::dry_run()).await.expect("Matching run failed");
    world.last_result = Some(result);
}

#[then(expr = "the run processed {int} donation(s), made {int} match(es) and matched ${word}")]
async fn check_result(world: &mut MatchingWorld, processed: usize, matched: usize, total: String) {
    let result = world.result();
    assert_eq!(result.processed, processed, "Processed count is incorrect");
    assert_eq!(result.matched, matched, "Match count is incorrect");
    assert_eq!(result.total_matched_amount, money(&total), "Total matched amount is incorrect");
    assert!(result.errors.is_empty(), "Run reported errors: {:?}", result.errors);
}

#[then(expr = "donation '{word}' is processed")]
async fn check_processed(world: &mut MatchingWorld, label: String) {
    let id = world.donation_id(&label);
    let donation = world.db().fetch_donation(id).await.expect("Error fetching donation").expect("Donation not found");
    assert!(donation.processed, "Donation {label} is not processed");
}

#[then(expr = "donation '{word}' is not processed")]
async fn check_not_processed(world: &mut MatchingWorld, label: String) {
    let id = world.donation_id(&label);
    let donation = world.db().fetch_donation(id).await.expect("Error fetching donation").expect("Donation not found");
    assert!(!donation.processed, "Donation {label} is processed");
}

#[then(expr = "donation '{word}' has {int} ledger entry/entries")]
async fn check_entry_count(world: &mut MatchingWorld, label: String, count: usize) {
    let id = world.donation_id(&label);
    let entries = world.db().fetch_matching_log_for_donation(id).await.expect("Error fetching ledger");
    assert_eq!(entries.len(), count, "Ledger entry count is incorrect");
}

#[then(expr = "donor '{word}' matched ${word} of donation '{word}'")]
async fn check_entry(world: &mut MatchingWorld, donor_id: String, amount: String, label: String) {
    let id = world.donation_id(&label);
    let entries = world.db().fetch_matching_log_for_donation(id).await.expect("Error fetching ledger");
    let entry = entries.iter().find(|e| e.donor_id == donor_id).expect("Donor has no entry for this donation");
    assert_eq!(entry.matched_amount, money(&amount));
}

#[then(expr = "donor '{word}' has matched ${word} in total")]
async fn check_donor_total(world: &mut MatchingWorld, donor_id: String, amount: String) {
    let totals = world.db().sum_matched_by_donor(&[donor_id.clone()]).await.expect("Error summing ledger");
    let total = totals.get(&donor_id).copied().unwrap_or_default();
    assert_eq!(total, money(&amount), "Total for donor {donor_id} is incorrect");
}

#[then(expr = "project '{word}' reports donor '{word}' named {string} with ${word} matched")]
async fn check_project_report(world: &mut MatchingWorld, slug: String, donor_id: String, name: String, amount: String) {
    let report = world.api().matched_donors_for_project(&slug).await.expect("Error fetching report");
    let row = report.iter().find(|r| r.donor_id == donor_id).expect("Donor is not in the report");
    assert_eq!(row.donor_name, name);
    assert_eq!(row.total_matched_amount, money(&amount));
}
