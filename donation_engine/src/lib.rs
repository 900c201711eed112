//! Donation Reconciliation & Matching Engine
//!
//! Donors pledge through an external payment processor, which confirms each pledge asynchronously with encrypted
//! webhook callbacks. Confirmed donations are then topped up ("matched") by sponsoring matching donors, each with a
//! finite budget, a multiplier, and a set of projects they support.
//!
//! This library contains the core logic for both halves of that flow. It is transport-agnostic.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`traits`] and [`SqliteDatabase`]). The engine talks to its store and to the matching donor directory
//!    only through the [`DonationStore`] and [`MatchingDonorDirectory`] traits. The data types that cross that boundary
//!    are defined in [`db_types`] and are public.
//! 2. The engine public API ([`mod@dme_api`]): the [`WebhookApi`] reconciler and the [`MatchingApi`] allocation engine.
//!
//! The engine also emits events ([`events`]) that can be subscribed to. The webhook reconciler hands off to the matching
//! engine this way, through a [`MatchingRequested`](events::MatchingRequested) event.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

mod dme_api;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use dme_api::{
    errors::{MatchingError, WebhookError},
    matching_api::MatchingApi,
    matching_objects,
    webhook_api::WebhookApi,
    webhook_objects,
};
pub use helpers::PayloadDecryptor;
#[cfg(feature = "sqlite")]
pub use sqlite::{db as sqlite_db, SqliteDatabase};
pub use traits::{DonationStore, DonationStoreError, MatchingDonorDirectory};
