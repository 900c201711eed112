//! Runs the matching engine in the background.
//!
//! Matching is requested in two ways. The webhook reconciler queues a `MatchingRequested` event after every webhook it
//! handles, and a periodic sweep runs regardless, so a request lost to a restart or a full queue is still picked up on
//! the next tick.
//!
//! A queued request that fails is retried with exponential backoff. Every attempt, failure and abandoned request is
//! counted in [`MatchingWorkerStatus`], which the `/api/matching/status` route exposes.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use donation_engine::{
    events::{EventHooks, MatchingRequested, MatchingTrigger},
    matching_objects::{MatchingOptions, MatchingResult},
    MatchingApi,
    SqliteDatabase,
};
use log::*;
use serde::Serialize;
use tokio::{sync::RwLock, task::JoinHandle};

use crate::config::MatchingConfig;

pub type SqliteMatchingApi = MatchingApi<SqliteDatabase, SqliteDatabase>;

#[derive(Debug, Default)]
pub struct MatchingWorkerStatus {
    requests: AtomicU64,
    runs: AtomicU64,
    failed_attempts: AtomicU64,
    abandoned_requests: AtomicU64,
    sweeps: AtomicU64,
    last: RwLock<LastRun>,
}

#[derive(Debug, Clone, Default)]
struct LastRun {
    run_at: Option<DateTime<Utc>>,
    matched: usize,
    error: Option<String>,
    error_at: Option<DateTime<Utc>>,
}

/// A point-in-time copy of the worker counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingWorkerSnapshot {
    /// Matching requests received from the event queue
    pub requests: u64,
    /// Successful runs, from any source
    pub runs: u64,
    pub failed_attempts: u64,
    /// Requests that were given up on after exhausting their retries
    pub abandoned_requests: u64,
    pub sweeps: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_matched: usize,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl MatchingWorkerStatus {
    pub async fn snapshot(&self) -> MatchingWorkerSnapshot {
        let last = self.last.read().await.clone();
        MatchingWorkerSnapshot {
            requests: self.requests.load(Ordering::SeqCst),
            runs: self.runs.load(Ordering::SeqCst),
            failed_attempts: self.failed_attempts.load(Ordering::SeqCst),
            abandoned_requests: self.abandoned_requests.load(Ordering::SeqCst),
            sweeps: self.sweeps.load(Ordering::SeqCst),
            last_run_at: last.run_at,
            last_run_matched: last.matched,
            last_error: last.error,
            last_error_at: last.error_at,
        }
    }

    async fn record_success(&self, result: &MatchingResult) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.write().await;
        last.run_at = Some(Utc::now());
        last.matched = result.matched;
    }

    async fn record_failure(&self, error: String) {
        self.failed_attempts.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.write().await;
        last.error = Some(error);
        last.error_at = Some(Utc::now());
    }
}

#[derive(Clone)]
pub struct MatchingWorker {
    api: SqliteMatchingApi,
    config: MatchingConfig,
    status: Arc<MatchingWorkerStatus>,
}

impl MatchingWorker {
    pub fn new(api: SqliteMatchingApi, config: MatchingConfig) -> Self {
        Self { api, config, status: Arc::new(MatchingWorkerStatus::default()) }
    }

    pub fn status(&self) -> Arc<MatchingWorkerStatus> {
        Arc::clone(&self.status)
    }

    /// Event hooks that feed queued matching requests into this worker.
    pub fn hooks(&self) -> EventHooks {
        let mut hooks = EventHooks::default();
        let worker = self.clone();
        hooks.on_matching_requested(move |ev: MatchingRequested| {
            let worker = worker.clone();
            Box::pin(async move {
                worker.status.requests.fetch_add(1, Ordering::SeqCst);
                trace!("🕰️ Matching requested by {:?} at {}", ev.trigger, ev.requested_at);
                worker.run_with_retries(&ev.trigger).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        hooks
    }

    /// Runs the engine once. Failures are counted and logged, never propagated.
    pub async fn run_once(&self, trigger: &MatchingTrigger) -> bool {
        match self.api.run(MatchingOptions::live()).await {
            Ok(result) => {
                if result.matched > 0 || !result.errors.is_empty() {
                    info!(
                        "🕰️ Matching run ({trigger:?}) matched {} times for {}. {} errors.",
                        result.matched,
                        result.total_matched_amount,
                        result.errors.len()
                    );
                }
                for e in &result.errors {
                    warn!("🕰️ {e}");
                }
                self.status.record_success(&result).await;
                true
            },
            Err(e) => {
                warn!("🕰️ Matching run ({trigger:?}) failed. {e}");
                self.status.record_failure(e.to_string()).await;
                false
            },
        }
    }

    /// Runs the engine, retrying failed runs up to `max_retries` times with a doubling delay.
    pub async fn run_with_retries(&self, trigger: &MatchingTrigger) -> bool {
        let mut delay = self.config.retry_backoff;
        for attempt in 0..=self.config.max_retries {
            if self.run_once(trigger).await {
                return true;
            }
            if attempt < self.config.max_retries {
                debug!("🕰️ Retrying matching run in {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }
        self.status.abandoned_requests.fetch_add(1, Ordering::SeqCst);
        error!(
            "🕰️ Giving up on matching request ({trigger:?}) after {} attempts. The next sweep will try again.",
            self.config.max_retries + 1
        );
        false
    }

    /// Starts the periodic sweep. Do not await the returned JoinHandle, as it will run indefinitely.
    pub fn start_sweep(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.sweep_interval.max(Duration::from_secs(1));
            let mut timer = tokio::time::interval(period);
            info!("🕰️ Matching sweep started. Running every {}s", period.as_secs());
            loop {
                timer.tick().await;
                trace!("🕰️ Running matching sweep");
                self.status.sweeps.fetch_add(1, Ordering::SeqCst);
                self.run_once(&MatchingTrigger::Sweep).await;
            }
        })
    }
}
