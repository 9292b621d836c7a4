//! Job-scoped logging
//!
//! Every journal entry goes three ways: a `tracing` event for the process
//! log, a row in the store for the `logs` projection and a `logEntry` event
//! for live observers.

use crate::events::{
    CrawlEvent, EventSink, LogEntry, LogKind, LogLevel, ScreenshotUpdate, StatusUpdate,
};
use crate::state::{JobId, JobSnapshot};
use crate::storage::{lock_store, SharedStore};
use chrono::Utc;
use serde_json::Value;

pub struct JobJournal {
    job_id: JobId,
    store: SharedStore,
    sink: EventSink,
}

impl JobJournal {
    pub fn new(job_id: JobId, store: SharedStore, sink: EventSink) -> Self {
        Self {
            job_id,
            store,
            sink,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Records a log entry
    ///
    /// A store failure is reported through `tracing` only; logging never
    /// fails the job.
    pub fn log(
        &self,
        level: LogLevel,
        kind: LogKind,
        message: impl Into<String>,
        data: Option<Value>,
    ) {
        let entry = LogEntry {
            job_id: self.job_id,
            level,
            kind,
            message: message.into(),
            data,
            timestamp: Utc::now(),
        };

        let kind_str = kind.as_str();
        match level {
            LogLevel::Debug => {
                tracing::debug!(job_id = %self.job_id, kind = kind_str, "{}", entry.message)
            }
            LogLevel::Info => {
                tracing::info!(job_id = %self.job_id, kind = kind_str, "{}", entry.message)
            }
            LogLevel::Warn => {
                tracing::warn!(job_id = %self.job_id, kind = kind_str, "{}", entry.message)
            }
            LogLevel::Error => {
                tracing::error!(job_id = %self.job_id, kind = kind_str, "{}", entry.message)
            }
        }

        if let Err(e) = lock_store(&self.store).append_log(&entry) {
            tracing::warn!(job_id = %self.job_id, "Failed to persist log entry: {}", e);
        }

        self.sink.publish(CrawlEvent::LogEntry(entry));
    }

    pub fn info(&self, kind: LogKind, message: impl Into<String>) {
        self.log(LogLevel::Info, kind, message, None);
    }

    pub fn warn(&self, kind: LogKind, message: impl Into<String>) {
        self.log(LogLevel::Warn, kind, message, None);
    }

    /// Publishes a `statusUpdate` event
    pub fn status(&self, snapshot: &JobSnapshot) {
        self.sink.publish(CrawlEvent::StatusUpdate(StatusUpdate {
            job_id: self.job_id,
            status: snapshot.status,
            pages_processed: snapshot.counters.pages_processed,
            timestamp: Utc::now(),
        }));
    }

    /// Publishes a `screenshotUpdate` event
    pub fn screenshot(&self, url: &str, screenshot_ref: &str) {
        self.sink.publish(CrawlEvent::ScreenshotUpdate(ScreenshotUpdate {
            job_id: self.job_id,
            url: url.to_string(),
            screenshot_ref: screenshot_ref.to_string(),
            timestamp: Utc::now(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobOptions;
    use crate::state::CrawlJob;
    use crate::storage::{share, JobStore, SqliteStorage};
    use url::Url;

    #[test]
    fn test_log_goes_to_store_and_feed() {
        let job = CrawlJob::new(
            Url::parse("https://example.com/").unwrap(),
            1,
            JobOptions::default(),
        );
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.create(&job.snapshot()).unwrap();
        let store = share(storage);
        let (sink, mut rx) = EventSink::channel();

        let journal = JobJournal::new(job.id, store.clone(), sink);
        journal.log(
            LogLevel::Warn,
            LogKind::Recognition,
            "OCR failed",
            Some(serde_json::json!({ "url": "https://example.com/" })),
        );
        journal.status(&job.snapshot());

        let stored = lock_store(&store).logs(job.id, 10, 0).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, LogKind::Recognition);

        assert!(matches!(rx.try_recv(), Ok(CrawlEvent::LogEntry(e)) if e.message == "OCR failed"));
        assert!(matches!(rx.try_recv(), Ok(CrawlEvent::StatusUpdate(_))));
    }
}
