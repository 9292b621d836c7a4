//! In-process collaborators for driving a registry without a browser

use async_trait::async_trait;
use crawl_lens::advisory::{
    AdvisoryClient, AdvisoryError, JobSummary, PageAnalysis, PageInfo, Reflection, StrategyPlan,
};
use crawl_lens::capture::{CaptureClient, CaptureError, CaptureSession};
use crawl_lens::config::JobOptions;
use crawl_lens::crawler::CrawlServices;
use crawl_lens::recognition::{RecognitionClient, RecognitionError, RecognizedText};
use crawl_lens::screenshots::ScreenshotStore;
use crawl_lens::state::{JobId, JobStatus, JobStatusView};
use crawl_lens::storage::{share, SharedStore, SqliteStorage};
use crawl_lens::{EventSink, JobRegistry};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

/// Bytes handed out as screenshots
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// One page of the fake site
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: Option<String>,
    /// Raw hrefs, resolved against the page URL
    pub links: Vec<String>,
    /// Successive content extents reported while scrolling
    pub extents: Vec<u64>,
    pub unreachable: bool,
}

impl FakePage {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn with_links(mut self, links: &[&str]) -> Self {
        self.links = links.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }
}

/// Browser stand-in serving pages from a map
#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, FakePage>,
    /// Delay applied to every navigation
    pub latency: Duration,
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: Arc<AtomicUsize>,
    pub navigations: Arc<Mutex<Vec<String>>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn closed(&self) -> usize {
        self.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CaptureClient for FakeSite {
    async fn open_session(
        &self,
        _options: &JobOptions,
    ) -> Result<Box<dyn CaptureSession>, CaptureError> {
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            pages: self.pages.clone(),
            latency: self.latency,
            closed: Arc::clone(&self.sessions_closed),
            navigations: Arc::clone(&self.navigations),
            current: None,
            measurements: 0,
        }))
    }
}

struct FakeSession {
    pages: HashMap<String, FakePage>,
    latency: Duration,
    closed: Arc<AtomicUsize>,
    navigations: Arc<Mutex<Vec<String>>>,
    current: Option<FakePage>,
    measurements: usize,
}

impl FakeSession {
    fn current(&self) -> Result<&FakePage, CaptureError> {
        self.current
            .as_ref()
            .ok_or_else(|| CaptureError::Protocol("no page loaded".to_string()))
    }
}

#[async_trait]
impl CaptureSession for FakeSession {
    async fn navigate(&mut self, url: &Url, _timeout: Duration) -> Result<(), CaptureError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.navigations.lock().unwrap().push(url.to_string());

        match self.pages.get(url.as_str()) {
            Some(page) if !page.unreachable => {
                self.current = Some(page.clone());
                self.measurements = 0;
                Ok(())
            }
            _ => Err(CaptureError::WebDriver {
                error: "unknown error".to_string(),
                message: format!("net::ERR_NAME_NOT_RESOLVED at {}", url),
            }),
        }
    }

    async fn content_extent(&mut self) -> Result<u64, CaptureError> {
        let extents = &self.current()?.extents;
        let extent = match extents.len() {
            0 => 1000,
            n => extents[self.measurements.min(n - 1)],
        };
        self.measurements += 1;
        Ok(extent)
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn scroll_to_top(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, CaptureError> {
        self.current()?;
        Ok(FAKE_PNG.to_vec())
    }

    async fn extract_links(&mut self, base: &Url) -> Result<Vec<Url>, CaptureError> {
        let resolved: Vec<String> = self
            .current()?
            .links
            .iter()
            .filter_map(|href| base.join(href).ok())
            .map(String::from)
            .collect();
        Ok(crawl_lens::url::filter_same_origin(
            base,
            resolved.iter().map(String::as_str),
        ))
    }

    async fn title(&mut self) -> Result<Option<String>, CaptureError> {
        Ok(self.current()?.title.clone())
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// OCR stand-in returning fixed text, or failing every call
pub struct FakeRecognizer {
    text: Option<String>,
    pub calls: AtomicUsize,
}

impl FakeRecognizer {
    pub fn reading(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn broken() -> Self {
        Self {
            text: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecognitionClient for FakeRecognizer {
    async fn recognize(
        &self,
        _image: &[u8],
        _language: &str,
    ) -> Result<RecognizedText, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.text {
            Some(text) => Ok(RecognizedText { text: text.clone() }),
            None => Err(RecognitionError::Service("engine crashed".to_string())),
        }
    }
}

/// Advisor with scripted answers
#[derive(Default)]
pub struct ScriptedAdvisor {
    pub plan: StrategyPlan,
    /// Priority URLs returned for the page at the given URL
    pub analyses: HashMap<String, Vec<String>>,
    pub suggestions: Vec<String>,
}

#[async_trait]
impl AdvisoryClient for ScriptedAdvisor {
    async fn plan_strategy(&self, _root_url: &str) -> Result<StrategyPlan, AdvisoryError> {
        Ok(self.plan.clone())
    }

    async fn analyze_page(&self, page: &PageInfo) -> Result<PageAnalysis, AdvisoryError> {
        Ok(PageAnalysis {
            priority_urls: self.analyses.get(&page.url).cloned().unwrap_or_default(),
            relevance_score: None,
        })
    }

    async fn reflect(&self, _summary: &JobSummary) -> Result<Reflection, AdvisoryError> {
        Ok(Reflection {
            suggestions: self.suggestions.clone(),
        })
    }
}

/// A registry wired to fakes, with its store and screenshot directory
pub struct Harness {
    pub registry: JobRegistry,
    pub store: SharedStore,
    pub site: Arc<FakeSite>,
    _screenshots: TempDir,
}

pub struct HarnessBuilder {
    site: FakeSite,
    recognizer: Arc<dyn RecognitionClient>,
    advisor: Arc<dyn AdvisoryClient>,
    max_active_jobs: usize,
}

impl HarnessBuilder {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            recognizer: Arc::new(FakeRecognizer::reading("Welcome to the example domain")),
            advisor: Arc::new(crawl_lens::advisory::NoopAdvisor),
            max_active_jobs: 8,
        }
    }

    pub fn recognizer(mut self, recognizer: impl RecognitionClient + 'static) -> Self {
        self.recognizer = Arc::new(recognizer);
        self
    }

    pub fn advisor(mut self, advisor: impl AdvisoryClient + 'static) -> Self {
        self.advisor = Arc::new(advisor);
        self
    }

    pub fn max_active_jobs(mut self, limit: usize) -> Self {
        self.max_active_jobs = limit;
        self
    }

    pub fn build(self) -> Harness {
        let screenshots = TempDir::new().unwrap();
        let store = share(SqliteStorage::new_in_memory().unwrap());
        let site = Arc::new(self.site);
        // Events are not under test here; nobody drains the queue
        let (events, _rx) = EventSink::channel();

        let services = CrawlServices {
            capture: site.clone(),
            recognition: self.recognizer,
            advisory: self.advisor,
            store: Arc::clone(&store),
            screenshots: ScreenshotStore::new(screenshots.path()),
            events,
            recognition_language: "eng".to_string(),
        };

        Harness {
            registry: JobRegistry::new(services, self.max_active_jobs),
            store,
            site,
            _screenshots: screenshots,
        }
    }
}

/// Options that keep tests fast
pub fn fast_options() -> JobOptions {
    JobOptions {
        rate_limit_ms: 0,
        scroll_timeout_ms: 1_000,
        scroll_settle_ms: 0,
        navigation_timeout_ms: 1_000,
        ..JobOptions::default()
    }
}

/// Polls a condition until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Waits for a job and returns its final status view
pub async fn finish(harness: &Harness, job_id: JobId) -> JobStatusView {
    tokio::time::timeout(Duration::from_secs(5), harness.registry.wait(job_id))
        .await
        .expect("job did not finish in time");
    harness
        .registry
        .status(job_id)
        .unwrap()
        .expect("finished job has a stored status")
}

pub fn status_of(harness: &Harness, job_id: JobId) -> JobStatus {
    harness.registry.status(job_id).unwrap().unwrap().status
}
