//! Bounded-concurrency job queue with staleness eviction.
//!
//! `drain()` is the only scheduler: it evicts stale entries, starts jobs
//! while slots are free, and is re-invoked from every completion path. The
//! result is a self-sustaining pull-based scheduler with no polling loop.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use verity_common::{Job, JobStatus, LogLevel};

use crate::health::HealthTracker;
use crate::store::JobStore;

/// Runs one job to completion. Implementations report everything through
/// the status sink and never propagate errors — a failing job must not
/// poison the queue.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: Job);
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_concurrency: usize,
    /// Queued entries older than this are evicted as failed.
    pub queue_timeout_secs: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            queue_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedJob {
    job_id: Uuid,
    enqueued_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<QueuedJob>,
    running: HashSet<Uuid>,
}

pub struct RunnerQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    store: Arc<dyn JobStore>,
    health: Arc<HealthTracker>,
    executor: Arc<dyn JobExecutor>,
}

impl RunnerQueue {
    pub fn new(
        config: QueueConfig,
        store: Arc<dyn JobStore>,
        health: Arc<HealthTracker>,
        executor: Arc<dyn JobExecutor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(QueueState::default()),
            store,
            health,
            executor,
        })
    }

    /// Enqueue a job unless it is already queued or running. Returns
    /// whether the submission was accepted.
    pub fn submit(&self, job_id: Uuid) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.running.contains(&job_id) || state.queue.iter().any(|j| j.job_id == job_id) {
            debug!(job_id = %job_id, "Submit: already queued or running");
            return false;
        }
        state.queue.push_back(QueuedJob {
            job_id,
            enqueued_at: Utc::now(),
        });
        true
    }

    pub fn queued_len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn running_len(&self) -> usize {
        self.state.lock().unwrap().running.len()
    }

    /// Fire a drain on its own task. Completion paths use this so the next
    /// queued job starts without the completing task waiting on it.
    pub fn spawn_drain(self: Arc<Self>) {
        tokio::spawn(async move {
            self.drain().await;
        });
    }

    /// Evict stale queue entries, then start jobs while slots are free.
    /// Re-entrant: all shared-state mutation happens synchronously under
    /// the lock, so concurrent drains interleave safely.
    pub async fn drain(self: Arc<Self>) {
        self.evict_stale().await;

        loop {
            if self.health.is_paused() {
                debug!("Drain: system paused, not starting new jobs");
                break;
            }

            let next = {
                let mut state = self.state.lock().unwrap();
                if state.running.len() >= self.config.max_concurrency {
                    None
                } else {
                    state.queue.pop_front().map(|j| {
                        state.running.insert(j.job_id);
                        j.job_id
                    })
                }
            };
            let Some(job_id) = next else { break };

            // Double-check the authoritative store: a retried trigger may
            // have enqueued a job that already ran (or is running) under
            // another process lifetime.
            let job = match self.store.fetch(job_id).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Drain: job fetch failed, releasing slot");
                    self.release(job_id);
                    continue;
                }
            };
            if matches!(job.status, JobStatus::Running | JobStatus::Succeeded) {
                info!(job_id = %job_id, "Drain: job already progressed elsewhere, skipping");
                self.release(job_id);
                continue;
            }

            if let Err(e) = self
                .store
                .set_status(job_id, JobStatus::Running, 0, LogLevel::Info, "analysis started")
                .await
            {
                warn!(job_id = %job_id, error = %e, "Drain: failed to report running status");
            }

            let me = Arc::clone(&self);
            tokio::spawn(async move {
                me.executor.execute(job).await;
                // Slot release always runs: execute() contains its own
                // error reporting and returns normally on failure.
                me.release(job_id);
                Arc::clone(&me).spawn_drain();
            });
        }
    }

    async fn evict_stale(&self) {
        let cutoff = Utc::now() - Duration::seconds(self.config.queue_timeout_secs);
        let stale: Vec<QueuedJob> = {
            let mut state = self.state.lock().unwrap();
            let (stale, keep): (Vec<_>, Vec<_>) = state
                .queue
                .drain(..)
                .partition(|j| j.enqueued_at < cutoff);
            state.queue = keep.into();
            stale
        };

        for job in stale {
            warn!(job_id = %job.job_id, "Evicting job: exceeded queue timeout");
            let message = format!(
                "queue timeout: waited longer than {}s for a concurrency slot",
                self.config.queue_timeout_secs
            );
            if let Err(e) = self
                .store
                .set_status(job.job_id, JobStatus::Failed, 0, LogLevel::Error, &message)
                .await
            {
                warn!(job_id = %job.job_id, error = %e, "Failed to report queue-timeout eviction");
            }
        }
    }

    fn release(&self, job_id: Uuid) {
        self.state.lock().unwrap().running.remove(&job_id);
    }
}
