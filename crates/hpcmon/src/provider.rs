//! Background polling engine.
//!
//! One provider owns one scheduler backend and publishes immutable
//! [`Snapshot`] values through a `tokio::sync::watch` channel. Refreshes
//! are single-flight: a refresh requested while one is in progress is
//! coalesced into the running one instead of queueing a second query.

use chrono::{DateTime, Utc};
use hpcmon_core::{JobFilter, JobInfo, Scheduler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// One published view of the cluster. Replaced wholesale on every
/// successful refresh; never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub jobs: Arc<Vec<JobInfo>>,
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Set when the last refresh failed; `jobs` then still holds the
    /// previous listing.
    pub last_error: Option<String>,
    /// The filter this listing was taken under. A subscriber that
    /// changed the filter mid-refresh can tell stale snapshots apart.
    pub filter: JobFilter,
}

pub struct JobProvider<S> {
    scheduler: Arc<S>,
    filter: Mutex<JobFilter>,
    refreshing: AtomicBool,
    tx: watch::Sender<Snapshot>,
}

impl<S: Scheduler> JobProvider<S> {
    pub fn new(scheduler: S, filter: JobFilter) -> Arc<Self> {
        let (tx, _) = watch::channel(Snapshot::default());
        Arc::new(Self {
            scheduler: Arc::new(scheduler),
            filter: Mutex::new(filter),
            refreshing: AtomicBool::new(false),
            tx,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Query the backend once and publish the result.
    ///
    /// Returns `false` without querying when another refresh is already
    /// in flight. A failed query republishes the previous jobs with
    /// `last_error` set.
    pub async fn refresh(&self) -> bool {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let filter = self.filter.lock().expect("filter lock poisoned").clone();
        let snapshot = match self.scheduler.list_active_jobs(&filter).await {
            Ok(jobs) => Snapshot {
                jobs: Arc::new(jobs),
                refreshed_at: Some(Utc::now()),
                last_error: None,
                filter,
            },
            Err(e) => {
                tracing::warn!("poll failed: {e}");
                let previous = self.tx.borrow().clone();
                Snapshot {
                    jobs: previous.jobs,
                    refreshed_at: previous.refreshed_at,
                    last_error: Some(e.to_string()),
                    filter,
                }
            }
        };
        self.tx.send_replace(snapshot);

        self.refreshing.store(false, Ordering::Release);
        true
    }

    /// Replace the active-job filter and refresh under it.
    pub async fn set_filter(&self, filter: JobFilter) -> bool {
        *self.filter.lock().expect("filter lock poisoned") = filter;
        self.refresh().await
    }

    /// Drive periodic refreshes until the task is dropped. Ticks that
    /// land while a refresh is still running are skipped, not queued.
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; callers refresh before
        // spawning this loop, so skip it.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.refresh().await;
        }
    }
}
