use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for Crawl-Lens
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub advisory: AdvisoryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Job options applied when a start request does not override them
    #[serde(default)]
    pub defaults: JobOptions,
}

/// Browser automation endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Base URL of the W3C WebDriver server (chromedriver, geckodriver, ...)
    #[serde(rename = "webdriver-url", default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Run the browser without a visible window
    #[serde(default = "default_true")]
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: true,
        }
    }
}

/// OCR service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    /// Endpoint receiving PNG bytes and answering with recognized text
    #[serde(default = "default_recognition_endpoint")]
    pub endpoint: String,

    /// Recognition language hint (e.g. "eng")
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(rename = "timeout-ms", default = "default_service_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_recognition_endpoint(),
            language: default_language(),
            timeout_ms: default_service_timeout_ms(),
        }
    }
}

/// Advisory service configuration; without an endpoint advice is disabled
#[derive(Debug, Clone, Deserialize)]
pub struct AdvisoryConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(rename = "timeout-ms", default = "default_service_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_service_timeout_ms(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Directory where screenshots are written, one subdirectory per job
    #[serde(rename = "screenshot-dir", default = "default_screenshot_dir")]
    pub screenshot_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            screenshot_dir: default_screenshot_dir(),
        }
    }
}

/// Job registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Maximum number of jobs running at the same time
    #[serde(rename = "max-active-jobs", default = "default_max_active_jobs")]
    pub max_active_jobs: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_active_jobs: default_max_active_jobs(),
        }
    }
}

/// Browser viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Per-job crawl options
///
/// Every recognized option is enumerated here with its default. Options are
/// validated once, when the job is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct JobOptions {
    /// Delay between two consecutive URLs of the same job
    pub rate_limit_ms: u64,
    /// Upper bound on scroll attempts per page
    pub max_scrolls: u32,
    /// Upper bound on the whole scroll phase of a page
    pub scroll_timeout_ms: u64,
    /// Wait after each scroll before measuring the page again
    pub scroll_settle_ms: u64,
    pub navigation_timeout_ms: u64,
    pub ocr_enabled: bool,
    pub advisory_enabled: bool,
    pub user_agent: Option<String>,
    pub viewport: Viewport,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            rate_limit_ms: 1000,
            max_scrolls: 10,
            scroll_timeout_ms: 30_000,
            scroll_settle_ms: 1000,
            navigation_timeout_ms: 30_000,
            ocr_enabled: true,
            advisory_enabled: false,
            user_agent: None,
            viewport: Viewport::default(),
        }
    }
}

impl JobOptions {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn scroll_timeout(&self) -> Duration {
        Duration::from_millis(self.scroll_timeout_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_recognition_endpoint() -> String {
    "http://localhost:8884/recognize".to_string()
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_service_timeout_ms() -> u64 {
    60_000
}

fn default_database_path() -> String {
    "./crawl-lens.db".to_string()
}

fn default_screenshot_dir() -> String {
    "./screenshots".to_string()
}

fn default_max_active_jobs() -> usize {
    8
}
