//! Storage traits and error types
//!
//! This module defines the trait interface for the durable job store and
//! associated error types.

use crate::events::LogEntry;
use crate::state::{ArtifactRecord, ErrorRecord, JobId, JobSnapshot};
use crate::storage::JobPatch;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job already exists: {0}")]
    DuplicateJob(JobId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for durable job store implementations
///
/// Every method is an independent, non-transactional update. Readers may
/// observe a job between two updates.
pub trait JobStore {
    // ===== Job Records =====

    /// Persists the first snapshot of a new job
    fn create(&mut self, snapshot: &JobSnapshot) -> StorageResult<()>;

    /// Applies the fields set in `patch` to a stored job
    fn update(&mut self, job_id: JobId, patch: &JobPatch) -> StorageResult<()>;

    /// Loads the stored snapshot of a job
    fn find_by_id(&self, job_id: JobId) -> StorageResult<Option<JobSnapshot>>;

    /// Lists stored jobs, most recently created first
    fn list_jobs(&self, limit: usize) -> StorageResult<Vec<JobSnapshot>>;

    // ===== Append-only Collections =====

    /// Records that a URL was dequeued by a job
    fn append_visited_url(
        &mut self,
        job_id: JobId,
        url: &str,
        visited_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Records a URL-level failure
    fn append_error(&mut self, job_id: JobId, error: &ErrorRecord) -> StorageResult<()>;

    /// Records a captured artifact
    fn append_artifact(&mut self, job_id: JobId, artifact: &ArtifactRecord) -> StorageResult<()>;

    /// Records a job log entry
    fn append_log(&mut self, entry: &LogEntry) -> StorageResult<()>;

    // ===== Projections =====

    /// Gets all URLs visited by a job
    fn visited_urls(&self, job_id: JobId) -> StorageResult<Vec<String>>;

    /// Gets all recorded errors of a job, oldest first
    fn errors(&self, job_id: JobId) -> StorageResult<Vec<ErrorRecord>>;

    /// Gets all artifacts of a job, oldest first
    fn artifacts(&self, job_id: JobId) -> StorageResult<Vec<ArtifactRecord>>;

    /// Gets the most recent artifact of a job
    fn latest_artifact(&self, job_id: JobId) -> StorageResult<Option<ArtifactRecord>>;

    /// Gets a page of log entries, newest first
    fn logs(&self, job_id: JobId, limit: usize, offset: usize) -> StorageResult<Vec<LogEntry>>;
}
