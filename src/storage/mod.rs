//! Storage module for persisting crawl jobs
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Job snapshots updated after every state change
//! - Append-only visited URLs, errors, artifacts and log entries

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{JobStore, StorageError, StorageResult};

use crate::config::JobOptions;
use crate::crawler::FrontierEntry;
use crate::state::{JobCounters, JobSnapshot, JobStatus, JobTimestamps};
use crate::CrawlError;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Store shared by the registry and every job task
pub type SharedStore = Arc<Mutex<dyn JobStore + Send>>;

/// Wraps a store for sharing across tasks
pub fn share<S: JobStore + Send + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Locks the shared store, recovering it if a holder panicked
pub fn lock_store(store: &SharedStore) -> MutexGuard<'_, dyn JobStore + Send + 'static> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CrawlError> {
    Ok(SqliteStorage::new(path)?)
}

/// Partial update of a stored job; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub options: Option<JobOptions>,
    pub counters: Option<JobCounters>,
    pub frontier: Option<Vec<FrontierEntry>>,
    pub visited_count: Option<u64>,
    pub timestamps: Option<JobTimestamps>,
    pub failure_reason: Option<String>,
}

impl JobPatch {
    /// Patch overwriting every mutable field with the snapshot's values
    pub fn from_snapshot(snapshot: &JobSnapshot) -> Self {
        Self {
            status: Some(snapshot.status),
            options: Some(snapshot.options.clone()),
            counters: Some(snapshot.counters),
            frontier: Some(snapshot.frontier.clone()),
            visited_count: Some(snapshot.visited_count),
            timestamps: Some(snapshot.timestamps),
            failure_reason: snapshot.failure_reason.clone(),
        }
    }

    /// Patch carrying only progress fields
    pub fn progress(snapshot: &JobSnapshot) -> Self {
        Self {
            counters: Some(snapshot.counters),
            frontier: Some(snapshot.frontier.clone()),
            visited_count: Some(snapshot.visited_count),
            ..Self::default()
        }
    }
}
