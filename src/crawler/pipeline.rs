//! Per-URL capture pipeline
//!
//! Stages run in a fixed order. Navigation and the screenshot are URL-fatal:
//! their failure is recorded against the URL and the pipeline stops there.
//! Every other stage is best-effort and falls back to an empty result. Only
//! store failures escape as errors; they are fatal to the job.

use crate::advisory::PageInfo;
use crate::capture::CaptureSession;
use crate::crawler::journal::JobJournal;
use crate::crawler::scroll::{scroll_to_completion, ScrollSettings};
use crate::crawler::services::CrawlServices;
use crate::crawler::FrontierEntry;
use crate::events::{LogKind, LogLevel};
use crate::keywords::{extract_keywords, DEFAULT_KEYWORD_COUNT};
use crate::recognition::RecognitionOutcome;
use crate::state::{lock_job, ArtifactRecord, ErrorRecord, SharedJob};
use crate::storage::{lock_store, JobPatch};
use crate::url::filter_same_origin;
use crate::CrawlError;
use chrono::Utc;
use serde_json::json;
use std::fmt::Display;
use url::Url;

/// How a URL left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// An artifact was recorded
    Captured,
    /// A URL-fatal stage failed; the error was recorded
    Abandoned,
}

pub struct PagePipeline<'a> {
    services: &'a CrawlServices,
    job: &'a SharedJob,
    journal: &'a JobJournal,
}

impl<'a> PagePipeline<'a> {
    pub fn new(services: &'a CrawlServices, job: &'a SharedJob, journal: &'a JobJournal) -> Self {
        Self {
            services,
            job,
            journal,
        }
    }

    /// Runs every stage for one frontier entry
    pub async fn process(
        &self,
        session: &mut dyn CaptureSession,
        entry: &FrontierEntry,
    ) -> Result<PageOutcome, CrawlError> {
        let (job_id, root_url, max_depth, options) = {
            let job = lock_job(self.job);
            (job.id, job.root_url.clone(), job.max_depth, job.options.clone())
        };
        let url = &entry.url;

        self.journal.log(
            LogLevel::Info,
            LogKind::Navigation,
            format!("Visiting {}", url),
            Some(json!({ "url": url.as_str(), "depth": entry.depth })),
        );

        // 1. navigate
        if let Err(e) = session.navigate(url, options.navigation_timeout()).await {
            self.record_failure(url, "navigate", LogKind::Navigation, &e)?;
            return Ok(PageOutcome::Abandoned);
        }

        let title = match session.title().await {
            Ok(title) => title,
            Err(e) => {
                tracing::debug!(job_id = %job_id, url = %url, "No title: {}", e);
                None
            }
        };

        // 2. scroll to completion
        match scroll_to_completion(session, &ScrollSettings::from(&options)).await {
            Ok(outcome) => self.journal.log(
                LogLevel::Debug,
                LogKind::Scroll,
                format!("Scrolled {} times ({})", outcome.scrolls, outcome.stop),
                Some(json!({
                    "url": url.as_str(),
                    "scrolls": outcome.scrolls,
                    "extent": outcome.final_extent,
                })),
            ),
            Err(e) => self
                .journal
                .warn(LogKind::Scroll, format!("Scrolling failed on {}: {}", url, e)),
        }

        // 3. screenshot
        let image = match session.screenshot().await {
            Ok(image) => image,
            Err(e) => {
                self.record_failure(url, "screenshot", LogKind::Screenshot, &e)?;
                return Ok(PageOutcome::Abandoned);
            }
        };
        let seq = lock_job(self.job).counters.screenshot_count + 1;
        let saved = match self.services.screenshots.save(job_id, seq, &image).await {
            Ok(saved) => saved,
            Err(e) => {
                self.record_failure(url, "screenshot", LogKind::Screenshot, &e)?;
                return Ok(PageOutcome::Abandoned);
            }
        };

        // 4. recognition
        let recognition = if options.ocr_enabled {
            let outcome: RecognitionOutcome = self
                .services
                .recognition
                .recognize(&image, &self.services.recognition_language)
                .await
                .into();

            match &outcome.error {
                Some(error) => self.journal.log(
                    LogLevel::Warn,
                    LogKind::Recognition,
                    format!("Recognition failed on {}: {}", url, error),
                    Some(json!({ "url": url.as_str() })),
                ),
                None => self.journal.log(
                    LogLevel::Info,
                    LogKind::Recognition,
                    format!(
                        "Recognized {} characters (confidence {:.1})",
                        outcome.text.chars().count(),
                        outcome.confidence
                    ),
                    Some(json!({ "url": url.as_str(), "confidence": outcome.confidence })),
                ),
            }
            Some(outcome)
        } else {
            None
        };

        let text = recognition
            .as_ref()
            .map(|r| r.text.as_str())
            .unwrap_or_default();
        let keywords = extract_keywords(text, DEFAULT_KEYWORD_COUNT);
        if !keywords.is_empty() {
            self.journal.log(
                LogLevel::Debug,
                LogKind::Keywords,
                format!("Keywords: {}", keywords.join(", ")),
                None,
            );
        }

        // 5. links, only while the next level fits under the ceiling
        let links = if entry.depth < max_depth {
            match session.extract_links(url).await {
                Ok(links) => links,
                Err(e) => {
                    self.journal
                        .warn(LogKind::Links, format!("Link extraction failed on {}: {}", url, e));
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        if entry.depth < max_depth {
            let added = lock_job(self.job)
                .frontier
                .enqueue_discovered(links.iter().cloned(), entry.depth + 1);
            self.journal.log(
                LogLevel::Info,
                LogKind::Links,
                format!("Found {} links on {}, {} new", links.len(), url, added),
                Some(json!({ "url": url.as_str(), "found": links.len(), "queued": added })),
            );
        }

        // 6. advisory page analysis
        if options.advisory_enabled && entry.depth < max_depth {
            let page = PageInfo {
                url: url.to_string(),
                depth: entry.depth,
                title: title.clone(),
                text: text.to_string(),
                keywords: keywords.clone(),
                links: links.iter().map(Url::to_string).collect(),
            };
            match self.services.advisory.analyze_page(&page).await {
                Ok(analysis) => {
                    let priority = filter_same_origin(
                        &root_url,
                        analysis.priority_urls.iter().map(String::as_str),
                    );
                    let promoted = lock_job(self.job)
                        .frontier
                        .enqueue_priority(priority, entry.depth + 1);
                    if promoted > 0 {
                        self.journal.info(
                            LogKind::Advisory,
                            format!("Advisor prioritized {} URLs", promoted),
                        );
                    }
                }
                Err(e) => self
                    .journal
                    .warn(LogKind::Advisory, format!("Page analysis failed: {}", e)),
            }
        }

        // 7. artifact
        let artifact = ArtifactRecord {
            url: url.to_string(),
            depth: entry.depth,
            title,
            screenshot_ref: saved.reference.clone(),
            screenshot_sha256: saved.sha256,
            recognition,
            keywords,
            captured_at: Utc::now(),
        };
        lock_store(&self.services.store).append_artifact(job_id, &artifact)?;

        let snapshot = {
            let mut job = lock_job(self.job);
            job.record_artifact(artifact);
            job.snapshot()
        };
        lock_store(&self.services.store).update(job_id, &JobPatch::progress(&snapshot))?;

        self.journal.log(
            LogLevel::Info,
            LogKind::Screenshot,
            format!("Captured {} as {}", url, saved.reference),
            Some(json!({ "url": url.as_str(), "screenshotRef": saved.reference })),
        );
        self.journal.screenshot(url.as_str(), &saved.reference);
        self.journal.status(&snapshot);

        Ok(PageOutcome::Captured)
    }

    /// Records a URL-fatal failure
    fn record_failure(
        &self,
        url: &Url,
        stage: &str,
        kind: LogKind,
        error: &dyn Display,
    ) -> Result<(), CrawlError> {
        let record = ErrorRecord {
            url: url.to_string(),
            stage: stage.to_string(),
            message: error.to_string(),
            occurred_at: Utc::now(),
        };
        let job_id = self.journal.job_id();
        lock_store(&self.services.store).append_error(job_id, &record)?;

        let snapshot = {
            let mut job = lock_job(self.job);
            job.record_error(record);
            job.snapshot()
        };
        lock_store(&self.services.store).update(job_id, &JobPatch::progress(&snapshot))?;

        self.journal.log(
            LogLevel::Error,
            kind,
            format!("{} failed on {}: {}", stage, url, error),
            Some(json!({ "url": url.as_str(), "stage": stage })),
        );
        Ok(())
    }
}
