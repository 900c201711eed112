//! #  Storage and directory contracts.
//!
//! This module defines the interfaces that the donation engine expects its collaborators to provide.
//!
//! * [`DonationStore`] is the persistent home of donations, the matching ledger and the record of processed webhook
//!   events. Every mutation the engine performs goes through it.
//! * [`MatchingDonorDirectory`] is the read-only source of matching donor definitions. In production it is populated
//!   from the CMS; the engine takes one snapshot of it per matching run.
//!
//! [`SqliteDatabase`](crate::SqliteDatabase) implements both.
mod data_objects;
mod donation_store;
mod matching_donor_directory;

pub use data_objects::{ApplyEventResult, DonorMatchTotal};
pub use donation_store::{DonationStore, DonationStoreError};
pub use matching_donor_directory::{DirectoryError, MatchingDonorDirectory};
