//! Crawl-Lens main entry point
//!
//! This is the command-line interface for the Crawl-Lens visual explorer.

use anyhow::Context;
use clap::Parser;
use crawl_lens::advisory::{AdvisoryClient, HttpAdvisoryClient, NoopAdvisor};
use crawl_lens::capture::WebDriverClient;
use crawl_lens::commands::{self, StartRequest, DEFAULT_LOG_LIMIT, MAX_LOG_LIMIT};
use crawl_lens::config::{load_config_with_hash, validate, Config};
use crawl_lens::crawler::CrawlServices;
use crawl_lens::events::CrawlEvent;
use crawl_lens::recognition::HttpRecognitionClient;
use crawl_lens::screenshots::ScreenshotStore;
use crawl_lens::state::JobStatusView;
use crawl_lens::storage::{open_storage, share, JobStore};
use crawl_lens::{EventBroadcaster, JobRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// How far the console printer may lag behind the event feed
const EVENT_FEED_CAPACITY: usize = 1024;

/// Crawl-Lens: a visual website explorer
///
/// Crawl-Lens drives a browser breadth-first through a website, screenshots
/// every page once it has finished loading more content, and extracts text
/// and keywords from the screenshots with an OCR service.
#[derive(Parser, Debug)]
#[command(name = "crawl-lens")]
#[command(version = "1.0.0")]
#[command(about = "A visual website explorer", long_about = None)]
struct Cli {
    /// Root URL to crawl
    #[arg(value_name = "URL", required_unless_present_any = ["status", "logs", "dry_run"])]
    url: Option<String>,

    /// Maximum link depth from the root (1-10)
    #[arg(short, long, default_value_t = 1)]
    depth: i64,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print the stored status of a job and exit
    #[arg(long, value_name = "JOB_ID", conflicts_with_all = ["logs", "dry_run"])]
    status: Option<String>,

    /// Print the stored log of a job, newest first, and exit
    #[arg(long, value_name = "JOB_ID", conflicts_with_all = ["status", "dry_run"])]
    logs: Option<String>,

    /// Number of log entries to print
    #[arg(long, default_value_t = DEFAULT_LOG_LIMIT)]
    limit: usize,

    /// Number of newest log entries to skip
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["status", "logs"])]
    dry_run: bool,

    /// Print every live event as a JSON line on stdout
    #[arg(long)]
    json_events: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load_configuration(cli.config.as_deref())?;

    // Handle different modes
    if let Some(job_id) = &cli.status {
        handle_status(&config, job_id)
    } else if let Some(job_id) = &cli.logs {
        handle_logs(&config, job_id, cli.limit, cli.offset)
    } else if cli.dry_run {
        handle_dry_run(&config, cli.url.as_deref(), cli.depth)
    } else {
        let url = cli.url.context("a URL is required to start a crawl")?;
        handle_crawl(config, url, cli.depth, cli.json_events).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_lens=info,warn"),
            1 => EnvFilter::new("crawl_lens=debug,info"),
            2 => EnvFilter::new("crawl_lens=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the configuration file, or the defaults when none is given
fn load_configuration(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::info!("No configuration file given, using defaults");
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok(config)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, url: Option<&str>, depth: i64) -> anyhow::Result<()> {
    println!("=== Crawl-Lens Dry Run ===\n");

    println!("Browser:");
    println!("  WebDriver: {}", config.browser.webdriver_url);
    println!("  Headless: {}", config.browser.headless);

    println!("\nRecognition:");
    println!("  Endpoint: {}", config.recognition.endpoint);
    println!("  Language: {}", config.recognition.language);
    println!("  Timeout: {}ms", config.recognition.timeout_ms);

    println!("\nAdvisory:");
    match &config.advisory.endpoint {
        Some(endpoint) => println!("  Endpoint: {}", endpoint),
        None => println!("  Disabled (no endpoint)"),
    }

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Screenshots: {}", config.storage.screenshot_dir);

    let defaults = &config.defaults;
    println!("\nJob defaults:");
    println!("  Rate limit: {}ms", defaults.rate_limit_ms);
    println!("  Max scrolls: {}", defaults.max_scrolls);
    println!("  Scroll timeout: {}ms", defaults.scroll_timeout_ms);
    println!("  Navigation timeout: {}ms", defaults.navigation_timeout_ms);
    println!("  OCR: {}", defaults.ocr_enabled);
    println!(
        "  Viewport: {}x{}",
        defaults.viewport.width, defaults.viewport.height
    );
    println!("  Max active jobs: {}", config.registry.max_active_jobs);

    println!("\n✓ Configuration is valid");
    if let Some(url) = url {
        let root = crawl_lens::url::parse_start_url(url)?;
        println!("✓ Would crawl {} to depth {}", root, depth);
    }

    Ok(())
}

/// Handles the --status mode: prints the stored status of a job
fn handle_status(config: &Config, raw_id: &str) -> anyhow::Result<()> {
    let job_id = commands::parse_job_id(raw_id)?;
    let storage = open_storage(Path::new(&config.storage.database_path))?;

    let snapshot = storage
        .find_by_id(job_id)?
        .with_context(|| format!("no job with id {}", job_id))?;
    print_status(&snapshot.status_view(chrono::Utc::now()));
    Ok(())
}

/// Handles the --logs mode: prints one page of a job's log
fn handle_logs(config: &Config, raw_id: &str, limit: usize, offset: usize) -> anyhow::Result<()> {
    let job_id = commands::parse_job_id(raw_id)?;
    let storage = open_storage(Path::new(&config.storage.database_path))?;

    for entry in storage.logs(job_id, limit.clamp(1, MAX_LOG_LIMIT), offset)? {
        println!(
            "{} [{:<5}] {:<11} {}",
            entry.timestamp.to_rfc3339(),
            entry.level.as_str(),
            entry.kind.as_str(),
            entry.message
        );
    }
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    url: String,
    depth: i64,
    json_events: bool,
) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.storage.database_path))?;
    let (events, broadcaster) = EventBroadcaster::start(EVENT_FEED_CAPACITY);

    let advisory: Arc<dyn AdvisoryClient> = match &config.advisory.endpoint {
        Some(endpoint) => Arc::new(HttpAdvisoryClient::new(
            endpoint,
            Duration::from_millis(config.advisory.timeout_ms),
        )?),
        None => Arc::new(NoopAdvisor),
    };

    let services = CrawlServices {
        capture: Arc::new(WebDriverClient::new(&config.browser)?),
        recognition: Arc::new(HttpRecognitionClient::new(&config.recognition)?),
        advisory,
        store: share(storage),
        screenshots: ScreenshotStore::new(&config.storage.screenshot_dir),
        events,
        recognition_language: config.recognition.language.clone(),
    };
    let registry = JobRegistry::new(services, config.registry.max_active_jobs);

    let mut feed = broadcaster.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(event) => print_event(&event, json_events),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Console fell behind, skipped {} events", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let started = commands::start(
        &registry,
        StartRequest {
            url,
            depth,
            options: Some(config.defaults.clone()),
        },
    )?;
    let job_id = started.job_id;
    tracing::info!("Started job {}", job_id);

    tokio::select! {
        _ = registry.wait(job_id) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::warn!("Interrupted, stopping active jobs");
            registry.shutdown().await;
        }
    }

    let view = commands::status(&registry, job_id)?;
    printer.abort();
    print_status(&view);
    Ok(())
}

fn print_event(event: &CrawlEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to serialize event: {}", e),
        }
    } else if let CrawlEvent::ScreenshotUpdate(update) = event {
        println!("captured {} -> {}", update.url, update.screenshot_ref);
    }
}

fn print_status(view: &JobStatusView) {
    println!("\n=== Job {} ===", view.job_id);
    println!("  URL: {}", view.url);
    println!("  Status: {}", view.status);
    println!("  Pages processed: {}", view.pages_processed);
    println!("  Screenshots: {}", view.screenshot_count);
    println!("  Errors: {}", view.error_count);
    if let Some(started) = view.started_at {
        println!("  Started: {}", started.to_rfc3339());
    }
    if let Some(ms) = view.duration_ms {
        println!("  Duration: {:.1}s", ms as f64 / 1000.0);
    }
    if let Some(reason) = &view.failure_reason {
        println!("  Failure: {}", reason);
    }
}
