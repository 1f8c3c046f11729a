//! Background Session Reaper
//!
//! Expired sessions are never read again by the middleware, so nothing would
//! remove them without a background pass. The reaper runs one on a fixed
//! interval.
//!
//! ## One Tick
//!
//! ```text
//! Idle ──tick──> Sweeping ──done──> Idle
//!                   │
//!                   ├─ 1. window = [EPOCH_FLOOR, now]
//!                   ├─ 2. range query on expire_bin
//!                   ├─ 3. decode + dedup ids
//!                   └─ 4. per id: re-confirm, delete
//! ```
//!
//! ## Failure Policy
//!
//! Sweeps are best effort. A failed query ends the tick; the next tick
//! starts over with a fresh window. A failed delete is logged and the rest of
//! the batch carries on; the id comes back in the next query if it is still
//! there. Nothing here ever reaches the request path.
//!
//! ## Re-confirmation
//!
//! Between the query and the delete a live request may refresh a session to
//! a later expiration. Before deleting, the reaper re-reads the record's
//! current index entry and only deletes when it still falls inside the
//! window. What remains is the gap between that read and the delete, which
//! the storage engine's own write ordering resolves.
//!
//! ## Concurrency
//!
//! Ids are reaped independently, at most [`DEFAULT_CONCURRENCY`] at a time
//! unless set with [`Reaper::with_concurrency`]. A large backlog is worked
//! off without flooding the engine.

use crate::config::saturating_millis;
use crate::reaper::election::ElectionGuard;
use crate::session::codec::{self, EPOCH_FLOOR, EXPIRE_INDEX};
use crate::session::SessionRepository;
use crate::storage::{StorageClient, StorageError};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Default number of ids re-confirmed and deleted at the same time.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Errors from a reaper tick. These are logged, never returned to requests.
#[derive(Debug, Error)]
pub enum ReapError {
    /// The index range query failed; the whole tick was abandoned
    #[error("expiration index query failed: {0}")]
    Query(#[source] StorageError),

    /// Re-confirming or deleting one session failed
    #[error("failed to reap session {id}: {source}")]
    Delete {
        id: String,
        #[source]
        source: StorageError,
    },
}

/// The bounds of one reaping query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepWindow {
    end: DateTime<Utc>,
    end_key: String,
}

impl SweepWindow {
    /// A window from [`EPOCH_FLOOR`] up to and including `end`.
    pub fn ending_at(end: DateTime<Utc>) -> Self {
        Self {
            end,
            end_key: codec::format_index_key(&end),
        }
    }

    /// A window ending now.
    pub fn now() -> Self {
        Self::ending_at(Utc::now())
    }

    pub fn start_key(&self) -> &str {
        EPOCH_FLOOR
    }

    pub fn end_key(&self) -> &str {
        &self.end_key
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns `true` if an index key falls inside the window, using the same
    /// ordering as the engine's range scan.
    pub fn contains_key(&self, index_key: &str) -> bool {
        EPOCH_FLOOR <= index_key && index_key <= self.end_key.as_str()
    }
}

/// Counters for one completed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapStats {
    /// Distinct ids returned by the index query
    pub found: u64,
    /// Sessions deleted
    pub deleted: u64,
    /// Ids left alone because they were gone or no longer expired
    pub skipped: u64,
    /// Ids whose re-confirmation or delete failed
    pub failed: u64,
}

/// Where the reaper task currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaperState {
    Idle,
    Sweeping,
    Stopped,
}

enum Outcome {
    Deleted,
    Skipped,
}

/// Finds and removes expired sessions.
#[derive(Clone)]
pub struct Reaper {
    client: Arc<dyn StorageClient>,
    bucket: String,
    guard: Arc<dyn ElectionGuard>,
    concurrency: usize,
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper")
            .field("bucket", &self.bucket)
            .field("guard", &self.guard)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Reaper {
    pub fn new(
        client: Arc<dyn StorageClient>,
        bucket: impl Into<String>,
        guard: Arc<dyn ElectionGuard>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            guard,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets how many ids are reaped at the same time (at least one).
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// A reaper sharing a repository's client and bucket.
    pub fn for_repository(repository: &SessionRepository, guard: Arc<dyn ElectionGuard>) -> Self {
        Self::new(repository.client(), repository.bucket(), guard)
    }

    pub fn is_eligible(&self) -> bool {
        self.guard.is_eligible()
    }

    /// Runs one tick with a window ending now.
    pub async fn sweep(&self) -> Result<ReapStats, ReapError> {
        self.sweep_window(&SweepWindow::now()).await
    }

    /// Runs one tick over `window`.
    ///
    /// Only a query failure is returned as an error; per-id failures are
    /// logged and counted in [`ReapStats::failed`].
    pub async fn sweep_window(&self, window: &SweepWindow) -> Result<ReapStats, ReapError> {
        let raw = self
            .client
            .index_range_query(&self.bucket, EXPIRE_INDEX, window.start_key(), window.end_key())
            .await
            .map_err(ReapError::Query)?;

        let expired = codec::decode_index_result(&raw);
        let mut stats = ReapStats {
            found: expired.len() as u64,
            ..Default::default()
        };

        if expired.is_empty() {
            trace!(bucket = %self.bucket, "No expired sessions");
            return Ok(stats);
        }

        let reaps: Vec<_> = expired.iter().map(|id| self.reap_one(id, window)).collect();
        let outcomes: Vec<_> = stream::iter(reaps)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(Outcome::Deleted) => stats.deleted += 1,
                Ok(Outcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    warn!(error = %e, "Failed to reap session");
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn reap_one(&self, id: &str, window: &SweepWindow) -> Result<Outcome, ReapError> {
        let object = match self.client.get(&self.bucket, id).await {
            Ok(object) => object,
            Err(e) if e.is_not_found() => {
                trace!(session = id, "Expired session already gone");
                return Ok(Outcome::Skipped);
            }
            Err(source) => {
                return Err(ReapError::Delete {
                    id: id.to_string(),
                    source,
                })
            }
        };

        match object.index(EXPIRE_INDEX) {
            Some(key) if window.contains_key(key) => {}
            current => {
                debug!(
                    session = id,
                    expires = current.unwrap_or("none"),
                    "Session refreshed since query, keeping it"
                );
                return Ok(Outcome::Skipped);
            }
        }

        self.client
            .delete(&self.bucket, id)
            .await
            .map_err(|source| ReapError::Delete {
                id: id.to_string(),
                source,
            })?;

        trace!(session = id, "Reaped expired session");
        Ok(Outcome::Deleted)
    }

    /// Starts the timer task if this process is eligible.
    ///
    /// Returns `None` without spawning anything when the election guard says
    /// no or `period` is zero. Must be called inside a Tokio runtime.
    pub fn start(self, period: Duration) -> Option<ReaperHandle> {
        if period.is_zero() {
            debug!("Reap interval is zero, reaper disabled");
            return None;
        }
        if !self.guard.is_eligible() {
            info!(guard = ?self.guard, "Process not eligible to reap, reaper not armed");
            return None;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ReaperState::Idle);
        let sweeps = Arc::new(AtomicU64::new(0));

        info!(
            bucket = %self.bucket,
            interval_ms = saturating_millis(period),
            "Session reaper started"
        );

        tokio::spawn(reaper_loop(self, period, shutdown_rx, state_tx, Arc::clone(&sweeps)));

        Some(ReaperHandle {
            shutdown_tx,
            state_rx,
            sweeps,
        })
    }
}

/// A handle to the running reaper task.
///
/// When this handle is dropped, the reaper task will be stopped.
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<ReaperState>,
    sweeps: Arc<AtomicU64>,
}

impl ReaperHandle {
    /// Stops the reaper. An in-flight sweep finishes first.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!("Session reaper stopped");
        }
    }

    pub fn state(&self) -> ReaperState {
        *self.state_rx.borrow()
    }

    /// Number of ticks that ran a sweep, successful or not.
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn reaper_loop(
    reaper: Reaper,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<ReaperState>,
    sweeps: Arc<AtomicU64>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Session reaper received shutdown signal");
                    break;
                }
                continue;
            }
        }

        if !reaper.is_eligible() {
            debug!("Process no longer eligible to reap, skipping tick");
            continue;
        }

        let _ = state_tx.send(ReaperState::Sweeping);

        match reaper.sweep().await {
            Ok(stats) if stats.found > 0 => {
                info!(
                    found = stats.found,
                    deleted = stats.deleted,
                    skipped = stats.skipped,
                    failed = stats.failed,
                    "Session sweep completed"
                );
            }
            Ok(_) => {
                debug!("Session sweep: no expired sessions");
            }
            Err(e) => {
                warn!(error = %e, "Session sweep aborted");
            }
        }

        sweeps.fetch_add(1, Ordering::Relaxed);
        let _ = state_tx.send(ReaperState::Idle);
    }

    let _ = state_tx.send(ReaperState::Stopped);
}
