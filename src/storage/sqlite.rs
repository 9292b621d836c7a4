//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the JobStore trait.
//! Structured fields (options, frontier, timestamps, recognition outcomes)
//! are stored as JSON text columns.

use crate::events::{LogEntry, LogKind, LogLevel};
use crate::state::{ArtifactRecord, ErrorRecord, JobCounters, JobId, JobSnapshot, JobStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobStore, StorageError, StorageResult};
use crate::storage::JobPatch;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const JOB_COLUMNS: &str = "id, root_url, max_depth, status, options, pages_processed, \
     screenshot_count, error_count, frontier, visited_count, timestamps, failure_reason";

const ARTIFACT_COLUMNS: &str =
    "url, depth, title, screenshot_ref, screenshot_sha256, recognition, keywords, captured_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl JobStore for SqliteStorage {
    // ===== Job Records =====

    fn create(&mut self, snapshot: &JobSnapshot) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO jobs (id, root_url, max_depth, status, options, pages_processed,
             screenshot_count, error_count, frontier, visited_count, timestamps, failure_reason,
             created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                snapshot.id.to_string(),
                snapshot.root_url,
                snapshot.max_depth,
                snapshot.status.to_db_string(),
                serde_json::to_string(&snapshot.options)?,
                snapshot.counters.pages_processed as i64,
                snapshot.counters.screenshot_count as i64,
                snapshot.counters.error_count as i64,
                serde_json::to_string(&snapshot.frontier)?,
                snapshot.visited_count as i64,
                serde_json::to_string(&snapshot.timestamps)?,
                snapshot.failure_reason,
                now,
            ],
        )?;

        if inserted == 0 {
            return Err(StorageError::DuplicateJob(snapshot.id));
        }
        Ok(())
    }

    fn update(&mut self, job_id: JobId, patch: &JobPatch) -> StorageResult<()> {
        let options = patch.options.as_ref().map(serde_json::to_string).transpose()?;
        let frontier = patch.frontier.as_ref().map(serde_json::to_string).transpose()?;
        let timestamps = patch
            .timestamps
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let counters = patch.counters;

        // NULL parameters keep the stored value
        let updated = self.conn.execute(
            "UPDATE jobs SET
                status = COALESCE(?1, status),
                options = COALESCE(?2, options),
                pages_processed = COALESCE(?3, pages_processed),
                screenshot_count = COALESCE(?4, screenshot_count),
                error_count = COALESCE(?5, error_count),
                frontier = COALESCE(?6, frontier),
                visited_count = COALESCE(?7, visited_count),
                timestamps = COALESCE(?8, timestamps),
                failure_reason = COALESCE(?9, failure_reason)
             WHERE id = ?10",
            params![
                patch.status.map(|s| s.to_db_string()),
                options,
                counters.map(|c| c.pages_processed as i64),
                counters.map(|c| c.screenshot_count as i64),
                counters.map(|c| c.error_count as i64),
                frontier,
                patch.visited_count.map(|v| v as i64),
                timestamps,
                patch.failure_reason,
                job_id.to_string(),
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::JobNotFound(job_id));
        }
        Ok(())
    }

    fn find_by_id(&self, job_id: JobId) -> StorageResult<Option<JobSnapshot>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![job_id.to_string()],
                RawJob::from_row,
            )
            .optional()?;

        raw.map(RawJob::into_snapshot).transpose()
    }

    fn list_jobs(&self, limit: usize) -> StorageResult<Vec<JobSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            JOB_COLUMNS
        ))?;

        let raws = stmt
            .query_map(params![limit as i64], RawJob::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(RawJob::into_snapshot).collect()
    }

    // ===== Append-only Collections =====

    fn append_visited_url(
        &mut self,
        job_id: JobId,
        url: &str,
        visited_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO visited_urls (job_id, url, visited_at) VALUES (?1, ?2, ?3)",
            params![job_id.to_string(), url, visited_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn append_error(&mut self, job_id: JobId, error: &ErrorRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO job_errors (job_id, url, stage, message, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job_id.to_string(),
                error.url,
                error.stage,
                error.message,
                error.occurred_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn append_artifact(&mut self, job_id: JobId, artifact: &ArtifactRecord) -> StorageResult<()> {
        let recognition = artifact
            .recognition
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            "INSERT INTO artifacts (job_id, url, depth, title, screenshot_ref, screenshot_sha256,
             recognition, keywords, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                job_id.to_string(),
                artifact.url,
                artifact.depth,
                artifact.title,
                artifact.screenshot_ref,
                artifact.screenshot_sha256,
                recognition,
                serde_json::to_string(&artifact.keywords)?,
                artifact.captured_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn append_log(&mut self, entry: &LogEntry) -> StorageResult<()> {
        let data = entry.data.as_ref().map(serde_json::to_string).transpose()?;

        self.conn.execute(
            "INSERT INTO job_logs (job_id, level, kind, message, data, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.job_id.to_string(),
                entry.level.as_str(),
                entry.kind.as_str(),
                entry.message,
                data,
                entry.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ===== Projections =====

    fn visited_urls(&self, job_id: JobId) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM visited_urls WHERE job_id = ?1 ORDER BY id ASC")?;

        let urls = stmt
            .query_map(params![job_id.to_string()], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(urls)
    }

    fn errors(&self, job_id: JobId) -> StorageResult<Vec<ErrorRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, stage, message, occurred_at FROM job_errors
             WHERE job_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map(params![job_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(url, stage, message, occurred_at)| {
                Ok(ErrorRecord {
                    url,
                    stage,
                    message,
                    occurred_at: parse_time(&occurred_at)?,
                })
            })
            .collect()
    }

    fn artifacts(&self, job_id: JobId) -> StorageResult<Vec<ArtifactRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM artifacts WHERE job_id = ?1 ORDER BY id ASC",
            ARTIFACT_COLUMNS
        ))?;

        let raws = stmt
            .query_map(params![job_id.to_string()], RawArtifact::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(RawArtifact::into_record).collect()
    }

    fn latest_artifact(&self, job_id: JobId) -> StorageResult<Option<ArtifactRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM artifacts WHERE job_id = ?1 ORDER BY id DESC LIMIT 1",
                    ARTIFACT_COLUMNS
                ),
                params![job_id.to_string()],
                RawArtifact::from_row,
            )
            .optional()?;

        raw.map(RawArtifact::into_record).transpose()
    }

    fn logs(&self, job_id: JobId, limit: usize, offset: usize) -> StorageResult<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT level, kind, message, data, timestamp FROM job_logs
             WHERE job_id = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;

        // Out-of-range values saturate; a negative LIMIT would mean "no limit"
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(
                params![job_id.to_string(), limit, offset],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(level, kind, message, data, timestamp)| {
                Ok(LogEntry {
                    job_id,
                    level: LogLevel::parse(&level)
                        .ok_or_else(|| StorageError::Corrupt(format!("log level '{}'", level)))?,
                    kind: LogKind::parse(&kind)
                        .ok_or_else(|| StorageError::Corrupt(format!("log type '{}'", kind)))?,
                    message,
                    data: data.map(|d| serde_json::from_str(&d)).transpose()?,
                    timestamp: parse_time(&timestamp)?,
                })
            })
            .collect()
    }
}

/// Job row as read from SQLite, before JSON columns are decoded
struct RawJob {
    id: String,
    root_url: String,
    max_depth: u32,
    status: String,
    options: String,
    pages_processed: i64,
    screenshot_count: i64,
    error_count: i64,
    frontier: String,
    visited_count: i64,
    timestamps: String,
    failure_reason: Option<String>,
}

impl RawJob {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            root_url: row.get(1)?,
            max_depth: row.get(2)?,
            status: row.get(3)?,
            options: row.get(4)?,
            pages_processed: row.get(5)?,
            screenshot_count: row.get(6)?,
            error_count: row.get(7)?,
            frontier: row.get(8)?,
            visited_count: row.get(9)?,
            timestamps: row.get(10)?,
            failure_reason: row.get(11)?,
        })
    }

    fn into_snapshot(self) -> StorageResult<JobSnapshot> {
        let id = self
            .id
            .parse::<JobId>()
            .map_err(|e| StorageError::Corrupt(format!("job id '{}': {}", self.id, e)))?;
        let status = JobStatus::from_db_string(&self.status)
            .ok_or_else(|| StorageError::Corrupt(format!("job status '{}'", self.status)))?;

        Ok(JobSnapshot {
            id,
            root_url: self.root_url,
            max_depth: self.max_depth,
            options: serde_json::from_str(&self.options)?,
            status,
            counters: JobCounters {
                pages_processed: self.pages_processed.max(0) as u64,
                screenshot_count: self.screenshot_count.max(0) as u64,
                error_count: self.error_count.max(0) as u64,
            },
            frontier: serde_json::from_str(&self.frontier)?,
            visited_count: self.visited_count.max(0) as u64,
            timestamps: serde_json::from_str(&self.timestamps)?,
            failure_reason: self.failure_reason,
        })
    }
}

struct RawArtifact {
    url: String,
    depth: u32,
    title: Option<String>,
    screenshot_ref: String,
    screenshot_sha256: String,
    recognition: Option<String>,
    keywords: String,
    captured_at: String,
}

impl RawArtifact {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            depth: row.get(1)?,
            title: row.get(2)?,
            screenshot_ref: row.get(3)?,
            screenshot_sha256: row.get(4)?,
            recognition: row.get(5)?,
            keywords: row.get(6)?,
            captured_at: row.get(7)?,
        })
    }

    fn into_record(self) -> StorageResult<ArtifactRecord> {
        Ok(ArtifactRecord {
            url: self.url,
            depth: self.depth,
            title: self.title,
            screenshot_ref: self.screenshot_ref,
            screenshot_sha256: self.screenshot_sha256,
            recognition: self
                .recognition
                .map(|r| serde_json::from_str(&r))
                .transpose()?,
            keywords: serde_json::from_str(&self.keywords)?,
            captured_at: parse_time(&self.captured_at)?,
        })
    }
}

fn parse_time(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}
