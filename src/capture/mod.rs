//! Browser capture abstraction
//!
//! A [`CaptureClient`] opens one [`CaptureSession`] per crawl job. The session
//! is a single browser tab owned exclusively by the job task: it navigates,
//! measures and scrolls the page, takes screenshots and reads links back from
//! the rendered DOM.

pub mod links;
mod webdriver;

pub use webdriver::{WebDriverClient, WebDriverSession};

use crate::config::JobOptions;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors from capture backends
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error {error}: {message}")]
    WebDriver { error: String, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Invalid screenshot payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Session already closed")]
    SessionClosed,
}

/// Opens browser sessions
#[async_trait]
pub trait CaptureClient: Send + Sync {
    /// Starts a session configured for one job (viewport, user agent)
    async fn open_session(
        &self,
        options: &JobOptions,
    ) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

/// One browser tab driven by a single job
#[async_trait]
pub trait CaptureSession: Send {
    /// Loads `url` and waits for it, giving up after `timeout`
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<(), CaptureError>;

    /// Current scrollable height of the document in pixels
    async fn content_extent(&mut self) -> Result<u64, CaptureError>;

    async fn scroll_to_bottom(&mut self) -> Result<(), CaptureError>;

    async fn scroll_to_top(&mut self) -> Result<(), CaptureError>;

    /// PNG of the current viewport
    async fn screenshot(&mut self) -> Result<Vec<u8>, CaptureError>;

    /// Absolute, normalized links on the same origin as `base`
    async fn extract_links(&mut self, base: &Url) -> Result<Vec<Url>, CaptureError>;

    async fn title(&mut self) -> Result<Option<String>, CaptureError>;

    /// Releases the browser tab
    async fn close(&mut self) -> Result<(), CaptureError>;
}
