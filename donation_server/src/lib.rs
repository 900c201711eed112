//! # Donation server
//! This crate hosts the HTTP server for the donation reconciliation and matching engine. It is responsible for:
//! * Listening for encrypted webhook callbacks from the payment provider and handing them to the reconciler.
//! * Running the matching engine in the background, whenever a webhook has been handled and on a periodic sweep.
//! * Exposing operator routes to run the matching engine by hand and to report on matched donations.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook/tgb`: The webhook route for the payment provider.
//! * `/api/matching/process`: `POST` starts a matching run, `GET` previews one.
//! * `/api/matching/donors-by-project`: Matched totals per donor for a project.
//! * `/api/matching/status`: Counters of the background matching worker.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;

pub mod helpers;
pub mod matching_worker;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
