//! The arithmetic of a matching run, kept free of I/O.
use std::collections::HashMap;

use dpg_common::Money;
use log::*;
use rust_decimal::Decimal;

use crate::{db_types::MatchingDonor, dme_api::matching_objects::DonorOrdering};

/// A match the engine intends to make for one donation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedMatch {
    pub donor_id: String,
    /// The part of the donation this donor covers
    pub match_amount: Money,
    /// What it costs the donor: `match_amount * multiplier`
    pub matched_value: Money,
}

/// Consumed budget per donor for the duration of a run.
#[derive(Debug, Clone, Default)]
pub(crate) struct BudgetBook {
    consumed: HashMap<String, Money>,
}

impl BudgetBook {
    pub fn new(consumed: HashMap<String, Money>) -> Self {
        Self { consumed }
    }

    pub fn consumed(&self, donor_id: &str) -> Money {
        self.consumed.get(donor_id).copied().unwrap_or_default()
    }

    pub fn remaining(&self, donor: &MatchingDonor) -> Money {
        donor.total_matching_amount - self.consumed(&donor.id)
    }

    pub fn apply(&mut self, plan: &[PlannedMatch]) {
        for m in plan {
            *self.consumed.entry(m.donor_id.clone()).or_default() += m.matched_value;
        }
    }
}

/// Stable sort of the run's donors according to `ordering`.
pub(crate) fn order_donors(
    mut donors: Vec<MatchingDonor>,
    ordering: DonorOrdering,
    book: &BudgetBook,
) -> Vec<MatchingDonor> {
    match ordering {
        DonorOrdering::Listing => {},
        DonorOrdering::RemainingBudgetAsc => donors.sort_by_key(|d| book.remaining(d)),
        DonorOrdering::RemainingBudgetDesc => donors.sort_by(|a, b| book.remaining(b).cmp(&book.remaining(a))),
        DonorOrdering::EndingSoonest => donors.sort_by_key(|d| d.end_date),
    }
    donors
}

/// Splits `donation_amount` across `donors`, in the order given, without exceeding any donor's remaining budget.
pub(crate) fn plan_matches(donation_amount: Money, donors: &[&MatchingDonor], book: &BudgetBook) -> Vec<PlannedMatch> {
    let mut remaining_donation = donation_amount;
    let mut plan = Vec::new();
    for donor in donors {
        if !remaining_donation.is_positive() {
            break;
        }
        let remaining_budget = book.remaining(donor);
        if !remaining_budget.is_positive() {
            trace!("⚖️ Donor {} has no budget left", donor.id);
            continue;
        }
        if donor.multiplier <= Decimal::ZERO {
            warn!("⚖️ Donor {} has a multiplier of {}. Skipping.", donor.id, donor.multiplier);
            continue;
        }
        let max_matchable_donation = remaining_budget / donor.multiplier;
        let match_amount = remaining_donation.min(max_matchable_donation);
        if !match_amount.is_positive() {
            continue;
        }
        // Division rounds at 28 digits, so the product can overshoot the budget in the last place
        let matched_value = (match_amount * donor.multiplier).min(remaining_budget);
        trace!("⚖️ Donor {} matches {match_amount} for {matched_value}", donor.id);
        plan.push(PlannedMatch { donor_id: donor.id.clone(), match_amount, matched_value });
        remaining_donation -= match_amount;
    }
    plan
}
