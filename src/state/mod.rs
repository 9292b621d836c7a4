//! State module for tracking crawl jobs
//!
//! # Components
//!
//! - `JobStatus`: lifecycle states of a job and the transitions between them
//! - `CrawlJob`: the live job record owned by the registry
//! - `JobSnapshot`: the plain record persisted to the store

mod crawl_job;
mod job_status;

pub use crawl_job::{
    lock_job, ArtifactRecord, CrawlJob, ErrorRecord, JobCounters, JobId, JobSnapshot,
    JobStatusView, JobTimestamps, SharedJob,
};
pub use job_status::JobStatus;
