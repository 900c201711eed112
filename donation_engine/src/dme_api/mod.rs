//! # Donation matching engine public API
//!
//! The `dme_api` module exposes the two halves of the engine:
//!
//! * [`webhook_api`] reconciles payment provider webhooks with donations. It decrypts the payload, rejects stale
//!   events, applies each event at most once, and queues a matching request.
//! * [`matching_api`] runs the matching allocation over unprocessed donations and reports per-project matching totals.
//!
//! # API usage
//!
//! An API instance is created by supplying backends that implement the traits it needs.
//!
//! ```rust,ignore
//! use donation_engine::{MatchingApi, MatchingOptions, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! // SqliteDatabase is both the DonationStore and the MatchingDonorDirectory
//! let api = MatchingApi::new(db.clone(), db);
//! let preview = api.run(MatchingOptions::dry_run()).await?;
//! ```
mod allocation;
pub mod errors;
pub mod matching_api;
pub mod matching_objects;
pub mod webhook_api;
pub mod webhook_objects;
