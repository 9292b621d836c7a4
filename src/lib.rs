//! Crawl-Lens: a visual website explorer
//!
//! This crate drives a browser through a website breadth-first, captures a
//! screenshot of every page once infinite scrolling has settled, runs the
//! screenshot through an OCR service and derives keywords from the text. Each
//! crawl is a long-running job that can be paused, resumed and stopped while
//! observers follow it through a live event feed.

pub mod advisory;
pub mod capture;
pub mod commands;
pub mod config;
pub mod crawler;
pub mod events;
pub mod keywords;
pub mod recognition;
pub mod screenshots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Crawl-Lens operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Capture error: {0}")]
    Capture(#[from] capture::CaptureError),

    #[error("Screenshot store error: {0}")]
    Screenshots(#[from] screenshots::ScreenshotError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition {
        from: state::JobStatus,
        to: state::JobStatus,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Crawl-Lens operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, JobOptions};
pub use crawler::{CommandOutcome, JobCommand, JobRegistry};
pub use events::{CrawlEvent, EventBroadcaster, EventSink};
pub use state::{CrawlJob, JobId, JobStatus};
pub use url::{normalize_url, same_origin};
