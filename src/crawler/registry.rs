//! Registry of crawl jobs
//!
//! The registry creates jobs, spawns one runner task per job and routes
//! commands to the job's lifecycle controller. Read-only projections combine
//! live state for active jobs with the durable snapshot for finished ones.
//! A job's entry is removed by its own task once the job is terminal and its
//! session released.

use crate::commands::MAX_LOG_LIMIT;
use crate::config::{validate_job_options, JobOptions};
use crate::crawler::coordinator::JobRunner;
use crate::crawler::journal::JobJournal;
use crate::crawler::lifecycle::LifecycleController;
use crate::crawler::services::CrawlServices;
use crate::events::LogEntry;
use crate::screenshots::ScreenshotError;
use crate::state::{lock_job, ArtifactRecord, CrawlJob, JobId, JobStatusView, SharedJob};
use crate::storage::{lock_store, StorageError};
use crate::ConfigError;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use url::Url;

/// Deepest crawl a job may request
pub const MAX_CRAWL_DEPTH: u32 = 10;

/// Errors returned by registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    #[error("Too many active jobs (limit {0})")]
    AtCapacity(usize),

    #[error("Invalid job options: {0}")]
    InvalidOptions(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Screenshot error: {0}")]
    Screenshots(#[from] ScreenshotError),
}

/// Lifecycle command addressed to a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCommand {
    Pause,
    Resume,
    Stop,
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        };
        f.write_str(s)
    }
}

impl FromStr for JobCommand {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            other => Err(RegistryError::InvalidRequest(format!(
                "unknown command '{}'",
                other
            ))),
        }
    }
}

/// Result of a lifecycle command; failure never mutates the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
}

struct JobHandle {
    controller: Arc<LifecycleController>,
    job: SharedJob,
    /// Flips to true once the job's task has finished
    done: watch::Receiver<bool>,
}

type JobTable = Arc<Mutex<HashMap<JobId, JobHandle>>>;

fn lock_table(table: &JobTable) -> MutexGuard<'_, HashMap<JobId, JobHandle>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct JobRegistry {
    services: Arc<CrawlServices>,
    jobs: JobTable,
    max_active_jobs: usize,
}

impl JobRegistry {
    pub fn new(services: CrawlServices, max_active_jobs: usize) -> Self {
        Self {
            services: Arc::new(services),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            max_active_jobs: max_active_jobs.max(1),
        }
    }

    /// Creates a job and starts crawling it in the background
    ///
    /// `root_url` must be an absolute http(s) URL and `max_depth` lie in
    /// `1..=MAX_CRAWL_DEPTH`. Options are validated here, once.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create_and_start(
        &self,
        root_url: Url,
        max_depth: u32,
        options: JobOptions,
    ) -> Result<JobId, RegistryError> {
        if !matches!(root_url.scheme(), "http" | "https") || root_url.host_str().is_none() {
            return Err(RegistryError::InvalidRequest(format!(
                "root URL must be an absolute http(s) URL, got {}",
                root_url
            )));
        }
        if !(1..=MAX_CRAWL_DEPTH).contains(&max_depth) {
            return Err(RegistryError::InvalidRequest(format!(
                "depth must be between 1 and {}, got {}",
                MAX_CRAWL_DEPTH, max_depth
            )));
        }
        validate_job_options(&options)?;

        let job = CrawlJob::new(root_url, max_depth, options);
        let job_id = job.id;
        let root = job.root_url.clone();

        let mut table = lock_table(&self.jobs);
        if table.len() >= self.max_active_jobs {
            return Err(RegistryError::AtCapacity(self.max_active_jobs));
        }

        lock_store(&self.services.store).create(&job.snapshot())?;

        let job: SharedJob = Arc::new(Mutex::new(job));
        let journal = Arc::new(JobJournal::new(
            job_id,
            Arc::clone(&self.services.store),
            self.services.events.clone(),
        ));
        let controller = Arc::new(LifecycleController::new(
            Arc::clone(&job),
            Arc::clone(&self.services.store),
            Arc::clone(&journal),
        ));
        let runner = JobRunner::new(
            Arc::clone(&self.services),
            Arc::clone(&job),
            Arc::clone(&controller),
            journal,
        );

        let (done_tx, done) = watch::channel(false);
        let jobs = Arc::clone(&self.jobs);
        let supervised = Arc::clone(&controller);
        tokio::spawn(async move {
            if let Err(e) = tokio::spawn(runner.run()).await {
                tracing::error!(job_id = %job_id, "Job task panicked: {}", e);
                supervised.fail(format!("job task panicked: {}", e));
            }
            lock_table(&jobs).remove(&job_id);
            done_tx.send_replace(true);
        });

        table.insert(
            job_id,
            JobHandle {
                controller,
                job,
                done,
            },
        );

        tracing::info!(job_id = %job_id, "Created crawl job for {} (depth {})", root, max_depth);
        Ok(job_id)
    }

    /// Forwards a lifecycle command to a job
    ///
    /// Unknown jobs report failure, except `stop` on a job that already
    /// finished, which keeps `stop` idempotent after cleanup.
    pub fn command(&self, job_id: JobId, command: JobCommand) -> CommandOutcome {
        let controller = lock_table(&self.jobs)
            .get(&job_id)
            .map(|handle| Arc::clone(&handle.controller));

        let success = match controller {
            Some(controller) => match command {
                JobCommand::Pause => controller.pause(),
                JobCommand::Resume => controller.resume(),
                JobCommand::Stop => controller.stop(),
            },
            None if command == JobCommand::Stop => self
                .stored_status(job_id)
                .map(|view| view.status.is_terminal())
                .unwrap_or(false),
            None => false,
        };

        tracing::debug!(job_id = %job_id, "Command {} -> {}", command, success);
        CommandOutcome { success }
    }

    /// Current status of a job
    pub fn status(&self, job_id: JobId) -> Result<Option<JobStatusView>, RegistryError> {
        if let Some(job) = self.live_job(job_id) {
            let snapshot = lock_job(&job).snapshot();
            return Ok(Some(snapshot.status_view(Utc::now())));
        }

        Ok(lock_store(&self.services.store)
            .find_by_id(job_id)?
            .map(|snapshot| snapshot.status_view(Utc::now())))
    }

    /// Log entries of a job, newest first
    ///
    /// At most [`MAX_LOG_LIMIT`] entries are returned per call.
    pub fn logs(
        &self,
        job_id: JobId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LogEntry>, RegistryError> {
        let limit = limit.min(MAX_LOG_LIMIT);
        Ok(lock_store(&self.services.store).logs(job_id, limit, offset)?)
    }

    /// Most recent artifact of a job
    pub fn latest_screenshot(&self, job_id: JobId) -> Result<Option<ArtifactRecord>, RegistryError> {
        if let Some(job) = self.live_job(job_id) {
            if let Some(artifact) = lock_job(&job).artifacts.last() {
                return Ok(Some(artifact.clone()));
            }
        }
        Ok(lock_store(&self.services.store).latest_artifact(job_id)?)
    }

    /// Bytes of a stored screenshot, `None` when unknown
    pub async fn screenshot(
        &self,
        job_id: JobId,
        screenshot_ref: &str,
    ) -> Result<Option<Vec<u8>>, RegistryError> {
        Ok(self.services.screenshots.load(job_id, screenshot_ref).await?)
    }

    /// Jobs whose task is still running
    pub fn active_jobs(&self) -> Vec<JobId> {
        lock_table(&self.jobs).keys().copied().collect()
    }

    /// Waits for a job's task to finish; returns at once for unknown jobs
    pub async fn wait(&self, job_id: JobId) {
        let done = lock_table(&self.jobs)
            .get(&job_id)
            .map(|handle| handle.done.clone());

        if let Some(done) = done {
            wait_done(done).await;
        }
    }

    /// Stops every active job and waits for their tasks
    pub async fn shutdown(&self) {
        let pending: Vec<watch::Receiver<bool>> = lock_table(&self.jobs)
            .values()
            .map(|handle| {
                handle.controller.stop();
                handle.done.clone()
            })
            .collect();

        tracing::info!("Shutting down {} active jobs", pending.len());
        for done in pending {
            wait_done(done).await;
        }
    }

    fn live_job(&self, job_id: JobId) -> Option<SharedJob> {
        lock_table(&self.jobs)
            .get(&job_id)
            .map(|handle| Arc::clone(&handle.job))
    }

    fn stored_status(&self, job_id: JobId) -> Option<JobStatusView> {
        match lock_store(&self.services.store).find_by_id(job_id) {
            Ok(snapshot) => snapshot.map(|s| s.status_view(Utc::now())),
            Err(e) => {
                tracing::warn!(job_id = %job_id, "Failed to load job: {}", e);
                None
            }
        }
    }
}

async fn wait_done(mut done: watch::Receiver<bool>) {
    // A dropped sender means the runtime is going away; nothing left to wait for
    let _ = done.wait_for(|finished| *finished).await;
}
