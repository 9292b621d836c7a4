//! Transport-independent command surface
//!
//! Request and response types for every operation a front end exposes, and
//! thin functions mapping them onto a [`JobRegistry`]. A front end (CLI,
//! HTTP, socket) only has to move these types across its wire.

use crate::config::JobOptions;
use crate::crawler::{JobCommand, JobRegistry, RegistryError, MAX_CRAWL_DEPTH};
use crate::events::LogEntry;
use crate::state::{ArtifactRecord, JobId, JobStatusView};
use crate::url::parse_start_url;
use serde::{Deserialize, Serialize};

/// Log page size when the caller gives none
pub const DEFAULT_LOG_LIMIT: usize = 50;

/// Largest log page a caller may ask for
pub const MAX_LOG_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub url: String,
    pub depth: i64,
    #[serde(default)]
    pub options: Option<JobOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsQuery {
    pub limit: usize,
    pub offset: usize,
}

impl Default for LogsQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LOG_LIMIT,
            offset: 0,
        }
    }
}

/// Parses a job id received from a caller
pub fn parse_job_id(raw: &str) -> Result<JobId, RegistryError> {
    raw.parse()
        .map_err(|_| RegistryError::InvalidRequest(format!("malformed job id '{}'", raw.trim())))
}

/// Validates a start request and launches the crawl
pub fn start(registry: &JobRegistry, request: StartRequest) -> Result<StartResponse, RegistryError> {
    let url = parse_start_url(&request.url)
        .map_err(|e| RegistryError::InvalidRequest(format!("invalid url: {}", e)))?;

    let depth = u32::try_from(request.depth)
        .ok()
        .filter(|d| (1..=MAX_CRAWL_DEPTH).contains(d))
        .ok_or_else(|| {
            RegistryError::InvalidRequest(format!(
                "depth must be an integer between 1 and {}, got {}",
                MAX_CRAWL_DEPTH, request.depth
            ))
        })?;

    let job_id = registry.create_and_start(url, depth, request.options.unwrap_or_default())?;
    Ok(StartResponse { job_id })
}

pub fn pause(registry: &JobRegistry, job_id: JobId) -> CommandResponse {
    send(registry, job_id, JobCommand::Pause)
}

pub fn resume(registry: &JobRegistry, job_id: JobId) -> CommandResponse {
    send(registry, job_id, JobCommand::Resume)
}

pub fn stop(registry: &JobRegistry, job_id: JobId) -> CommandResponse {
    send(registry, job_id, JobCommand::Stop)
}

fn send(registry: &JobRegistry, job_id: JobId, command: JobCommand) -> CommandResponse {
    CommandResponse {
        success: registry.command(job_id, command).success,
    }
}

pub fn status(registry: &JobRegistry, job_id: JobId) -> Result<JobStatusView, RegistryError> {
    registry
        .status(job_id)?
        .ok_or(RegistryError::UnknownJob(job_id))
}

/// One page of a job's log, newest first
///
/// The limit is capped at [`MAX_LOG_LIMIT`]; a zero limit yields the default.
pub fn logs(
    registry: &JobRegistry,
    job_id: JobId,
    query: LogsQuery,
) -> Result<Vec<LogEntry>, RegistryError> {
    let limit = match query.limit {
        0 => DEFAULT_LOG_LIMIT,
        n => n.min(MAX_LOG_LIMIT),
    };
    registry.logs(job_id, limit, query.offset)
}

pub fn latest_screenshot(
    registry: &JobRegistry,
    job_id: JobId,
) -> Result<Option<ArtifactRecord>, RegistryError> {
    registry.latest_screenshot(job_id)
}

/// Screenshot bytes, `None` when the job or reference is unknown
pub async fn screenshot(
    registry: &JobRegistry,
    job_id: JobId,
    screenshot_ref: &str,
) -> Result<Option<Vec<u8>>, RegistryError> {
    registry.screenshot(job_id, screenshot_ref).await
}
