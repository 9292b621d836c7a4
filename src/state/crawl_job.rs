//! The crawl job record and its serializable snapshot

use crate::config::JobOptions;
use crate::crawler::{FrontierEntry, FrontierScheduler};
use crate::recognition::RecognitionOutcome;
use crate::state::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;
use uuid::Uuid;

/// Opaque crawl job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A failure recorded against one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub url: String,
    /// Pipeline stage that failed (navigate, screenshot, ...)
    pub stage: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Persisted outcome of capturing one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub url: String,
    pub depth: u32,
    pub title: Option<String>,
    /// File name of the screenshot inside the job's screenshot directory
    pub screenshot_ref: String,
    pub screenshot_sha256: String,
    pub recognition: Option<RecognitionOutcome>,
    pub keywords: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounters {
    pub pages_processed: u64,
    pub screenshot_count: u64,
    pub error_count: u64,
}

/// When each lifecycle transition last happened
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTimestamps {
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub resumed_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl JobTimestamps {
    /// Records the time at which `status` was entered
    pub fn stamp(&mut self, status: JobStatus, at: DateTime<Utc>) {
        match status {
            JobStatus::Pending => self.created_at = Some(at),
            JobStatus::Running if self.started_at.is_none() => self.started_at = Some(at),
            JobStatus::Running => self.resumed_at = Some(at),
            JobStatus::Paused => self.paused_at = Some(at),
            JobStatus::Stopped => self.stopped_at = Some(at),
            JobStatus::Completed => self.completed_at = Some(at),
            JobStatus::Failed => self.failed_at = Some(at),
        }
    }

    /// Time of the terminal transition, if any
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at.or(self.completed_at).or(self.failed_at)
    }
}

/// A crawl job
///
/// The live job is owned by its registry entry behind a [`SharedJob`]. Its
/// status is only ever written by the lifecycle controller; every other
/// component reads it.
#[derive(Debug)]
pub struct CrawlJob {
    pub id: JobId,
    pub root_url: Url,
    pub max_depth: u32,
    pub options: JobOptions,
    status: JobStatus,
    pub frontier: FrontierScheduler,
    pub errors: Vec<ErrorRecord>,
    pub artifacts: Vec<ArtifactRecord>,
    pub counters: JobCounters,
    pub timestamps: JobTimestamps,
    pub failure_reason: Option<String>,
}

impl CrawlJob {
    pub fn new(root_url: Url, max_depth: u32, options: JobOptions) -> Self {
        let mut timestamps = JobTimestamps::default();
        timestamps.stamp(JobStatus::Pending, Utc::now());

        Self {
            id: JobId::new(),
            root_url,
            max_depth,
            options,
            status: JobStatus::Pending,
            frontier: FrontierScheduler::new(max_depth),
            errors: Vec::new(),
            artifacts: Vec::new(),
            counters: JobCounters::default(),
            timestamps,
            failure_reason: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Writes the status; reserved to the lifecycle controller
    pub(crate) fn set_status(&mut self, status: JobStatus, at: DateTime<Utc>) {
        self.status = status;
        self.timestamps.stamp(status, at);
    }

    /// Records a URL-level failure and bumps the error counter
    pub fn record_error(&mut self, error: ErrorRecord) {
        self.counters.error_count += 1;
        self.errors.push(error);
    }

    /// Folds a captured artifact into the job
    pub fn record_artifact(&mut self, artifact: ArtifactRecord) {
        self.counters.pages_processed += 1;
        self.counters.screenshot_count += 1;
        self.artifacts.push(artifact);
    }

    /// Builds the plain record persisted to the store
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            root_url: self.root_url.to_string(),
            max_depth: self.max_depth,
            options: self.options.clone(),
            status: self.status,
            counters: self.counters,
            frontier: self.frontier.pending().cloned().collect(),
            visited_count: self.frontier.visited_count() as u64,
            timestamps: self.timestamps,
            failure_reason: self.failure_reason.clone(),
        }
    }
}

/// Shared handle to a live job
pub type SharedJob = Arc<Mutex<CrawlJob>>;

/// Locks a shared job, recovering the data if a holder panicked
pub fn lock_job(job: &SharedJob) -> MutexGuard<'_, CrawlJob> {
    job.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serializable copy of a job's canonical fields
///
/// Derived values are computed from these fields on demand and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub root_url: String,
    pub max_depth: u32,
    pub options: JobOptions,
    pub status: JobStatus,
    pub counters: JobCounters,
    pub frontier: Vec<FrontierEntry>,
    pub visited_count: u64,
    pub timestamps: JobTimestamps,
    pub failure_reason: Option<String>,
}

impl JobSnapshot {
    /// Elapsed crawl time: from start to the terminal transition, or to `now`
    pub fn duration_at(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let started = self.timestamps.started_at?;
        let end = self.timestamps.finished_at().unwrap_or(now);
        Some((end - started).max(chrono::Duration::zero()))
    }

    /// Share of known pages already visited, in [0, 1]
    pub fn progress(&self) -> f64 {
        let known = self.visited_count + self.frontier.len() as u64;
        if known == 0 {
            return 0.0;
        }
        self.visited_count as f64 / known as f64
    }

    /// Projection served to status queries
    pub fn status_view(&self, now: DateTime<Utc>) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            url: self.root_url.clone(),
            status: self.status,
            pages_processed: self.counters.pages_processed,
            screenshot_count: self.counters.screenshot_count,
            error_count: self.counters.error_count,
            started_at: self.timestamps.started_at,
            duration_ms: self
                .duration_at(now)
                .map(|d| d.num_milliseconds().max(0) as u64),
            progress: self.progress(),
            failure_reason: self.failure_reason.clone(),
        }
    }
}

/// Status projection returned by `status(jobId)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: JobId,
    pub url: String,
    pub status: JobStatus,
    pub pages_processed: u64,
    pub screenshot_count: u64,
    pub error_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub progress: f64,
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> CrawlJob {
        CrawlJob::new(
            Url::parse("https://example.com/").unwrap(),
            2,
            JobOptions::default(),
        )
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = job();
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(job.timestamps.created_at.is_some());
        assert!(job.timestamps.started_at.is_none());
        assert_eq!(job.counters, JobCounters::default());
    }

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_timestamps_distinguish_start_and_resume() {
        let mut ts = JobTimestamps::default();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(5);

        ts.stamp(JobStatus::Running, t0);
        ts.stamp(JobStatus::Running, t1);

        assert_eq!(ts.started_at, Some(t0));
        assert_eq!(ts.resumed_at, Some(t1));
    }

    #[test]
    fn test_counters_follow_records() {
        let mut job = job();
        job.record_error(ErrorRecord {
            url: "https://example.com/a".to_string(),
            stage: "navigate".to_string(),
            message: "timeout".to_string(),
            occurred_at: Utc::now(),
        });
        job.record_artifact(ArtifactRecord {
            url: "https://example.com/".to_string(),
            depth: 0,
            title: None,
            screenshot_ref: "000001.png".to_string(),
            screenshot_sha256: String::new(),
            recognition: None,
            keywords: vec![],
            captured_at: Utc::now(),
        });

        assert_eq!(job.counters.error_count, 1);
        assert_eq!(job.counters.pages_processed, 1);
        assert_eq!(job.counters.screenshot_count, 1);
    }

    #[test]
    fn test_snapshot_derived_values() {
        let mut job = job();
        let start = Utc::now();
        job.set_status(JobStatus::Running, start);
        job.frontier.seed(job.root_url.clone());

        let snapshot = job.snapshot();
        assert_eq!(snapshot.progress(), 0.0);
        assert_eq!(snapshot.frontier.len(), 1);

        let later = start + chrono::Duration::seconds(3);
        let view = snapshot.status_view(later);
        assert_eq!(view.duration_ms, Some(3000));
        assert_eq!(view.status, JobStatus::Running);
    }

    #[test]
    fn test_duration_stops_at_terminal_transition() {
        let mut job = job();
        let start = Utc::now();
        job.set_status(JobStatus::Running, start);
        job.set_status(JobStatus::Stopped, start + chrono::Duration::seconds(10));

        let snapshot = job.snapshot();
        let much_later = start + chrono::Duration::hours(1);
        assert_eq!(
            snapshot.duration_at(much_later),
            Some(chrono::Duration::seconds(10))
        );
    }
}
