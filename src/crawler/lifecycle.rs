//! Lifecycle controller for a single crawl job
//!
//! The controller is the only writer of a job's status. Every accepted
//! transition is applied under the job lock, persisted, published on a
//! `watch` channel for the job task and broadcast to observers. Pause and
//! stop are cooperative: the job task observes them at its next
//! [`LifecycleController::checkpoint`], between two URLs.

use crate::crawler::journal::JobJournal;
use crate::events::{LogKind, LogLevel};
use crate::state::{lock_job, CrawlJob, JobSnapshot, JobStatus, SharedJob};
use crate::storage::{lock_store, JobPatch, SharedStore};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// What the job task should do at a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Keep crawling
    Proceed,
    /// Leave the crawl loop; the job is terminal
    Halt,
}

pub struct LifecycleController {
    job: SharedJob,
    store: SharedStore,
    journal: Arc<JobJournal>,
    signal: watch::Sender<JobStatus>,
    cleaned_up: AtomicBool,
}

impl LifecycleController {
    pub fn new(job: SharedJob, store: SharedStore, journal: Arc<JobJournal>) -> Self {
        let status = lock_job(&job).status();
        let (signal, _) = watch::channel(status);

        Self {
            job,
            store,
            journal,
            signal,
            cleaned_up: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> JobStatus {
        lock_job(&self.job).status()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        lock_job(&self.job).snapshot()
    }

    /// pending -> running; seeds the frontier with the root URL
    pub fn start(&self) -> bool {
        self.transition(JobStatus::Running, |job| {
            let root = job.root_url.clone();
            job.frontier.seed(root);
        })
    }

    /// running -> paused; takes effect once the in-flight URL finishes
    pub fn pause(&self) -> bool {
        self.transition(JobStatus::Paused, |_| {})
    }

    /// paused -> running with frontier and visited set untouched
    pub fn resume(&self) -> bool {
        self.transition(JobStatus::Running, |_| {})
    }

    /// Moves any non-terminal job to stopped
    ///
    /// Always reports success: stopping a job that already reached a
    /// terminal state leaves it as it is.
    pub fn stop(&self) -> bool {
        if !self.transition(JobStatus::Stopped, |_| {}) {
            tracing::debug!(
                job_id = %self.journal.job_id(),
                "Stop on a terminal job, nothing to do"
            );
        }
        true
    }

    /// running -> completed; the frontier is exhausted
    pub fn complete(&self) -> bool {
        self.transition(JobStatus::Completed, |_| {})
    }

    /// running | paused -> failed
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.transition(JobStatus::Failed, |job| job.failure_reason = Some(reason))
    }

    /// Waits until the job may process its next URL
    ///
    /// Returns immediately while running, blocks while paused and reports
    /// [`Checkpoint::Halt`] once the job is terminal.
    pub async fn checkpoint(&self) -> Checkpoint {
        let mut rx = self.signal.subscribe();
        loop {
            let status = *rx.borrow_and_update();
            match status {
                JobStatus::Running => return Checkpoint::Proceed,
                JobStatus::Paused | JobStatus::Pending => {
                    if rx.changed().await.is_err() {
                        return Checkpoint::Halt;
                    }
                }
                JobStatus::Stopped | JobStatus::Completed | JobStatus::Failed => {
                    return Checkpoint::Halt
                }
            }
        }
    }

    /// Resolves once the job is terminal
    pub async fn halted(&self) {
        let mut rx = self.signal.subscribe();
        loop {
            if rx.borrow_and_update().is_terminal() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Claims the right to release the job's resources
    ///
    /// Returns `true` exactly once per job, no matter how many terminal
    /// paths race to clean up.
    pub fn begin_cleanup(&self) -> bool {
        !self.cleaned_up.swap(true, Ordering::AcqRel)
    }

    fn transition<F>(&self, to: JobStatus, on_enter: F) -> bool
    where
        F: FnOnce(&mut CrawlJob),
    {
        let mut job = lock_job(&self.job);
        let from = job.status();
        if !from.can_transition_to(to) {
            return false;
        }

        job.set_status(to, Utc::now());
        on_enter(&mut *job);
        let snapshot = job.snapshot();

        // Persisted while the job lock is held so snapshots reach the store
        // in transition order
        if let Err(e) = lock_store(&self.store).update(snapshot.id, &JobPatch::from_snapshot(&snapshot))
        {
            tracing::error!(
                job_id = %snapshot.id,
                "Failed to persist transition {} -> {}: {}",
                from,
                to,
                e
            );
        }

        self.signal.send_replace(to);
        self.journal.status(&snapshot);

        let message = match &snapshot.failure_reason {
            Some(reason) if to == JobStatus::Failed => format!("Job failed: {}", reason),
            _ => format!("Job {} -> {}", from, to),
        };
        let level = if to == JobStatus::Failed {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        self.journal.log(level, LogKind::Lifecycle, message, None);

        true
    }
}
