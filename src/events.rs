//! Real-time event feed
//!
//! Crawl jobs write [`CrawlEvent`]s into an [`EventSink`], an unbounded queue
//! that never blocks the job loop. A separate fan-out task drains the queue and
//! republishes every event on a broadcast channel. Subscribers that fall
//! behind lose events instead of slowing the crawl down.

use crate::state::{JobId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Severity of a job log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What part of the crawl a log entry is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    System,
    Lifecycle,
    Navigation,
    Scroll,
    Screenshot,
    Recognition,
    Links,
    Advisory,
    Keywords,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Lifecycle => "lifecycle",
            Self::Navigation => "navigation",
            Self::Scroll => "scroll",
            Self::Screenshot => "screenshot",
            Self::Recognition => "recognition",
            Self::Links => "links",
            Self::Advisory => "advisory",
            Self::Keywords => "keywords",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "lifecycle" => Some(Self::Lifecycle),
            "navigation" => Some(Self::Navigation),
            "scroll" => Some(Self::Scroll),
            "screenshot" => Some(Self::Screenshot),
            "recognition" => Some(Self::Recognition),
            "links" => Some(Self::Links),
            "advisory" => Some(Self::Advisory),
            "keywords" => Some(Self::Keywords),
            _ => None,
        }
    }
}

/// One job-scoped log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub job_id: JobId,
    pub level: LogLevel,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub job_id: JobId,
    pub status: JobStatus,
    pub pages_processed: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotUpdate {
    pub job_id: JobId,
    pub url: String,
    pub screenshot_ref: String,
    pub timestamp: DateTime<Utc>,
}

/// Event pushed to observers; delivery is fire-and-forget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CrawlEvent {
    StatusUpdate(StatusUpdate),
    LogEntry(LogEntry),
    ScreenshotUpdate(ScreenshotUpdate),
}

impl CrawlEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::StatusUpdate(e) => e.job_id,
            Self::LogEntry(e) => e.job_id,
            Self::ScreenshotUpdate(e) => e.job_id,
        }
    }
}

/// Write side of the event feed
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<CrawlEvent>,
}

impl EventSink {
    /// Creates a sink together with its raw receiving end
    ///
    /// Useful when the caller wants to consume events itself instead of going
    /// through an [`EventBroadcaster`].
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CrawlEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues an event; silently dropped once the feed is shut down
    pub fn publish(&self, event: CrawlEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event feed closed, dropping event");
        }
    }
}

/// Read side of the event feed: fans every event out to all subscribers
pub struct EventBroadcaster {
    tx: broadcast::Sender<CrawlEvent>,
    fan_out: JoinHandle<()>,
}

impl EventBroadcaster {
    /// Starts the fan-out task
    ///
    /// `capacity` bounds how far a subscriber may lag before it starts losing
    /// events. Must be called from within a tokio runtime.
    pub fn start(capacity: usize) -> (EventSink, Self) {
        let (sink, mut rx) = EventSink::channel();
        let (tx, _) = broadcast::channel(capacity.max(1));

        let fan_tx = tx.clone();
        let fan_out = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                // No subscriber is not an error
                let _ = fan_tx.send(event);
            }
            tracing::debug!("Event feed drained, fan-out task exiting");
        });

        (sink, Self { tx, fan_out })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Drop for EventBroadcaster {
    fn drop(&mut self) {
        self.fan_out.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event(job_id: JobId, pages: u64) -> CrawlEvent {
        CrawlEvent::StatusUpdate(StatusUpdate {
            job_id,
            status: JobStatus::Running,
            pages_processed: pages,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let (sink, broadcaster) = EventBroadcaster::start(16);
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        let job_id = JobId::new();
        sink.publish(status_event(job_id, 1));

        assert_eq!(rx1.recv().await.unwrap().job_id(), job_id);
        assert_eq!(rx2.recv().await.unwrap().job_id(), job_id);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_block() {
        let (sink, _broadcaster) = EventBroadcaster::start(1);
        let job_id = JobId::new();
        for i in 0..1000 {
            sink.publish(status_event(job_id, i));
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let (sink, broadcaster) = EventBroadcaster::start(2);
        let mut rx = broadcaster.subscribe();
        let job_id = JobId::new();

        for i in 0..10 {
            sink.publish(status_event(job_id, i));
        }
        // Let the fan-out task drain the queue
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn test_event_json_shape() {
        let job_id = JobId::new();
        let event = CrawlEvent::LogEntry(LogEntry {
            job_id,
            level: LogLevel::Warn,
            kind: LogKind::Recognition,
            message: "OCR failed".to_string(),
            data: None,
            timestamp: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "logEntry");
        assert_eq!(json["type"], "recognition");
        assert_eq!(json["level"], "warn");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_level_and_kind_strings() {
        for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            assert_eq!(LogLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(LogKind::parse("links"), Some(LogKind::Links));
        assert_eq!(LogKind::parse("nope"), None);
    }
}
