//! Job runner - the crawl loop of one job
//!
//! One runner drives one job inside its own tokio task:
//! - Starting the job and opening its capture session
//! - Applying the advisor's strategy, when enabled
//! - Pulling URLs from the frontier and feeding them to the page pipeline
//! - Honoring pause and stop between URLs and pacing with the rate limit
//! - Completing, failing and releasing the session exactly once

use crate::advisory::JobSummary;
use crate::capture::CaptureSession;
use crate::config::validate_job_options;
use crate::crawler::journal::JobJournal;
use crate::crawler::lifecycle::{Checkpoint, LifecycleController};
use crate::crawler::pipeline::PagePipeline;
use crate::crawler::services::CrawlServices;
use crate::events::{LogKind, LogLevel};
use crate::state::{lock_job, JobStatus, SharedJob};
use crate::storage::{lock_store, JobPatch};
use crate::url::filter_same_origin;
use crate::CrawlError;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Bounds applied to an advised rate limit
const MIN_ADVISED_RATE_LIMIT_MS: u64 = 100;
const MAX_ADVISED_RATE_LIMIT_MS: u64 = 60_000;

/// Depth given to URLs suggested before the crawl starts
const PLANNED_URL_DEPTH: u32 = 1;

pub struct JobRunner {
    services: Arc<CrawlServices>,
    job: SharedJob,
    controller: Arc<LifecycleController>,
    journal: Arc<JobJournal>,
}

impl JobRunner {
    pub fn new(
        services: Arc<CrawlServices>,
        job: SharedJob,
        controller: Arc<LifecycleController>,
        journal: Arc<JobJournal>,
    ) -> Self {
        Self {
            services,
            job,
            controller,
            journal,
        }
    }

    /// Runs the job to a terminal state
    pub async fn run(self) {
        let job_id = self.journal.job_id();

        if !self.controller.start() {
            tracing::info!(job_id = %job_id, "Job halted before it started");
            self.controller.begin_cleanup();
            return;
        }

        let options = lock_job(&self.job).options.clone();
        let mut session = match self.services.capture.open_session(&options).await {
            Ok(session) => session,
            Err(e) => {
                self.controller
                    .fail(format!("Failed to open capture session: {}", e));
                self.controller.begin_cleanup();
                return;
            }
        };
        self.journal.info(LogKind::System, "Capture session opened");

        let result = self.crawl(&mut *session, options.advisory_enabled).await;
        if let Err(e) = result {
            tracing::error!(job_id = %job_id, "Crawl loop failed: {}", e);
            self.controller.fail(e.to_string());
        }

        if options.advisory_enabled && self.controller.status() == JobStatus::Completed {
            self.reflect().await;
        }

        if self.controller.begin_cleanup() {
            match session.close().await {
                Ok(()) => self.journal.info(LogKind::System, "Capture session closed"),
                Err(e) => self.journal.warn(
                    LogKind::System,
                    format!("Failed to close capture session: {}", e),
                ),
            }
        }

        let snapshot = self.controller.snapshot();
        tracing::info!(
            job_id = %job_id,
            "Job finished as {}: {} pages, {} errors",
            snapshot.status,
            snapshot.counters.pages_processed,
            snapshot.counters.error_count
        );
    }

    /// Main crawl loop
    ///
    /// Returns `Ok` once the job is terminal or the frontier is exhausted;
    /// an error is fatal to the job.
    async fn crawl(
        &self,
        session: &mut dyn CaptureSession,
        advisory_enabled: bool,
    ) -> Result<(), CrawlError> {
        let job_id = self.journal.job_id();

        if advisory_enabled {
            self.apply_strategy().await?;
        }

        let pipeline = PagePipeline::new(&self.services, &self.job, &self.journal);

        loop {
            if self.controller.checkpoint().await == Checkpoint::Halt {
                return Ok(());
            }

            let (next, exhausted) = {
                let mut job = lock_job(&self.job);
                let next = job.frontier.next();
                (next, job.frontier.is_exhausted())
            };
            let entry = match next {
                Some(entry) => entry,
                None if exhausted && self.controller.complete() => {
                    tracing::info!(job_id = %job_id, "Frontier is exhausted, crawl complete");
                    return Ok(());
                }
                None => {
                    // Paused or stopped since the checkpoint; let it decide
                    tracing::debug!(job_id = %job_id, "Completion deferred to the next checkpoint");
                    continue;
                }
            };

            lock_store(&self.services.store).append_visited_url(
                job_id,
                entry.url.as_str(),
                Utc::now(),
            )?;

            let outcome = pipeline.process(session, &entry).await;
            lock_job(&self.job).frontier.finish();
            outcome?;

            let (delay, more) = {
                let job = lock_job(&self.job);
                (job.options.rate_limit(), !job.frontier.is_empty())
            };
            if more && !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.controller.halted() => {}
                }
            }
        }
    }

    /// Asks the advisor for a strategy and applies what fits the bounds
    async fn apply_strategy(&self) -> Result<(), CrawlError> {
        let root_url = lock_job(&self.job).root_url.clone();

        let plan = match self.services.advisory.plan_strategy(root_url.as_str()).await {
            Ok(plan) => plan,
            Err(e) => {
                self.journal.warn(
                    LogKind::Advisory,
                    format!("Strategy planning failed, using defaults: {}", e),
                );
                return Ok(());
            }
        };

        let (options, planned) = {
            let mut job = lock_job(&self.job);

            let mut adjusted = job.options.clone();
            if let Some(ms) = plan.rate_limit_ms {
                adjusted.rate_limit_ms = ms.clamp(MIN_ADVISED_RATE_LIMIT_MS, MAX_ADVISED_RATE_LIMIT_MS);
            }
            if let Some(max_scrolls) = plan.max_scrolls {
                adjusted.max_scrolls = max_scrolls;
            }
            if validate_job_options(&adjusted).is_ok() {
                job.options = adjusted;
            }

            let urls = filter_same_origin(&root_url, plan.priority_urls.iter().map(String::as_str));
            let planned = job.frontier.enqueue_discovered(urls, PLANNED_URL_DEPTH);
            (job.options.clone(), planned)
        };

        let patch = JobPatch {
            options: Some(options.clone()),
            ..JobPatch::default()
        };
        lock_store(&self.services.store).update(self.journal.job_id(), &patch)?;

        self.journal.log(
            LogLevel::Info,
            LogKind::Advisory,
            format!(
                "Strategy applied: rate limit {}ms, max scrolls {}, {} planned URLs",
                options.rate_limit_ms, options.max_scrolls, planned
            ),
            Some(json!({
                "rateLimitMs": options.rate_limit_ms,
                "maxScrolls": options.max_scrolls,
                "plannedUrls": planned,
            })),
        );
        Ok(())
    }

    /// Hands the finished job to the advisor and logs its suggestions
    async fn reflect(&self) {
        let snapshot = self.controller.snapshot();
        let summary = JobSummary {
            root_url: snapshot.root_url.clone(),
            status: snapshot.status.to_string(),
            pages_processed: snapshot.counters.pages_processed,
            error_count: snapshot.counters.error_count,
            duration_ms: snapshot
                .duration_at(Utc::now())
                .map(|d| d.num_milliseconds().max(0) as u64),
        };

        match self.services.advisory.reflect(&summary).await {
            Ok(reflection) => {
                for suggestion in reflection.suggestions {
                    self.journal.info(LogKind::Advisory, suggestion);
                }
            }
            Err(e) => self
                .journal
                .warn(LogKind::Advisory, format!("Reflection failed: {}", e)),
        }
    }
}
