use std::collections::HashMap;

use cucumber::World;
use donation_engine::{
    db_types::{DonationId, MatchingDonor},
    matching_objects::MatchingResult,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    MatchingApi,
    SqliteDatabase,
};
use log::*;

#[derive(Default, Debug, World)]
pub struct MatchingWorld {
    pub system: Option<MatchingSystem>,
    /// Donations created by the scenario, keyed by the label the feature file gives them
    pub donations: HashMap<String, DonationId>,
    /// The directory as the scenario has described it so far, in listing order
    pub donors: Vec<MatchingDonor>,
    pub last_result: Option<MatchingResult>,
}

#[derive(Debug)]
pub struct MatchingSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub api: MatchingApi<SqliteDatabase, SqliteDatabase>,
}

impl MatchingWorld {
    pub fn system(&self) -> &MatchingSystem {
        self.system.as_ref().expect("Matching system not initialised")
    }

    pub fn db(&self) -> &SqliteDatabase {
        &self.system().db
    }

    pub fn api(&self) -> &MatchingApi<SqliteDatabase, SqliteDatabase> {
        &self.system().api
    }

    pub fn donation_id(&self, label: &str) -> DonationId {
        *self.donations.get(label).unwrap_or_else(|| panic!("No donation labelled {label}"))
    }

    pub fn result(&self) -> &MatchingResult {
        self.last_result.as_ref().expect("The matching engine has not been run")
    }
}

impl MatchingSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {url}");
        let api = MatchingApi::new(db.clone(), db.clone());
        Self { db_path: url, db, api }
    }
}
