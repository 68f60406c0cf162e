//! In-memory reassign scheduler: tracked jobs in a map, one polling worker.

use chrono::{DateTime, Utc};
use dispatch_engine::{env_or, LightningDispatcher};
use dispatch_types::{new_dispatch_id, DispatchError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;

const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl SchedulerConfig {
    /// Reads `DISPATCH_POLL_INTERVAL_MS`.
    pub fn from_env() -> Self {
        let ms = env_or("DISPATCH_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS).max(1);
        Self {
            poll_interval: Duration::from_millis(ms),
        }
    }
}

/// A job the worker keeps re-checking until it is accepted or nobody is left to ask.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedJob {
    pub job_id: String,
    pub tracked_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Rounds this scheduler started for the job.
    pub rounds_triggered: u32,
}

/// Counts from one pass over the tracked jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub reassigned: usize,
    pub untracked: usize,
}

struct Inner {
    dispatcher: Arc<LightningDispatcher>,
    jobs: RwLock<HashMap<String, TrackedJob>>,
}

#[derive(Clone, Copy)]
enum Verdict {
    Keep,
    Reassigned,
    Done(&'static str),
}

impl Inner {
    async fn check(&self, job_id: &str) -> Verdict {
        match self.dispatcher.has_accepted_assignment(job_id).await {
            Ok(true) => return Verdict::Done("accepted"),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(job_id, error = %e, "reassign check failed, will retry");
                return Verdict::Keep;
            }
        }
        let dispatch_id = new_dispatch_id();
        match self
            .dispatcher
            .try_check_and_auto_reassign(job_id, &dispatch_id)
            .await
        {
            Ok(Some(_)) => Verdict::Reassigned,
            Ok(None) => Verdict::Keep,
            Err(DispatchError::Exhausted(_)) => Verdict::Done("exhausted"),
            Err(DispatchError::Conflict) => Verdict::Done("accepted"),
            Err(DispatchError::JobNotFound(_)) => Verdict::Done("job not found"),
            Err(e) => {
                tracing::warn!(job_id, error = %e, "reassign check failed, will retry");
                Verdict::Keep
            }
        }
    }

    async fn sweep(&self) -> SweepReport {
        let ids: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        let mut report = SweepReport::default();
        for job_id in ids {
            report.checked += 1;
            let verdict = self.check(&job_id).await;
            let mut guard = self.jobs.write().await;
            match verdict {
                Verdict::Done(reason) => {
                    if guard.remove(&job_id).is_some() {
                        report.untracked += 1;
                        tracing::info!(job_id = %job_id, reason, "stopped tracking job");
                    }
                }
                Verdict::Reassigned | Verdict::Keep => {
                    if let Some(t) = guard.get_mut(&job_id) {
                        t.last_checked_at = Some(Utc::now());
                        if matches!(verdict, Verdict::Reassigned) {
                            t.rounds_triggered += 1;
                            report.reassigned += 1;
                        }
                    }
                }
            }
        }
        report
    }
}

/// Polls tracked jobs every `poll_interval` and calls
/// [`LightningDispatcher::check_and_auto_reassign`] for each.
///
/// The worker is spawned on construction (so a Tokio runtime must be running) and aborted on
/// [`shutdown`](Self::shutdown) or drop.
pub struct ReassignScheduler {
    inner: Arc<Inner>,
    worker: AbortHandle,
}

impl ReassignScheduler {
    pub fn new(dispatcher: Arc<LightningDispatcher>, config: SchedulerConfig) -> Self {
        let inner = Arc::new(Inner {
            dispatcher,
            jobs: RwLock::new(HashMap::new()),
        });

        let worker_inner = Arc::clone(&inner);
        let poll_interval = config.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval fires immediately; the first real sweep is one period out
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = worker_inner.sweep().await;
                if report.checked > 0 {
                    tracing::debug!(
                        checked = report.checked,
                        reassigned = report.reassigned,
                        untracked = report.untracked,
                        "reassign sweep"
                    );
                }
            }
        });
        tracing::info!(poll_interval_ms = poll_interval.as_millis() as u64, "reassign scheduler started");

        Self {
            inner,
            worker: handle.abort_handle(),
        }
    }

    /// Start tracking a job. Tracking an already tracked job is a no-op.
    pub async fn track(&self, job_id: &str) {
        let mut guard = self.inner.jobs.write().await;
        guard.entry(job_id.to_string()).or_insert_with(|| TrackedJob {
            job_id: job_id.to_string(),
            tracked_at: Utc::now(),
            last_checked_at: None,
            rounds_triggered: 0,
        });
    }

    /// Returns true when the job was tracked.
    pub async fn untrack(&self, job_id: &str) -> bool {
        self.inner.jobs.write().await.remove(job_id).is_some()
    }

    pub async fn is_tracked(&self, job_id: &str) -> bool {
        self.inner.jobs.read().await.contains_key(job_id)
    }

    /// Snapshot of tracked jobs, ordered by job id.
    pub async fn tracked(&self) -> Vec<TrackedJob> {
        let mut out: Vec<TrackedJob> = self.inner.jobs.read().await.values().cloned().collect();
        out.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        out
    }

    /// Run one pass now, independent of the worker's timer.
    pub async fn sweep_once(&self) -> SweepReport {
        self.inner.sweep().await
    }

    pub fn shutdown(&self) {
        self.worker.abort();
    }
}

impl Drop for ReassignScheduler {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
