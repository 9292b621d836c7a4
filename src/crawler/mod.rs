//! Crawler module for running crawl jobs
//!
//! This module contains the core crawling logic, including:
//! - Breadth-first frontier scheduling with priority promotion
//! - The job lifecycle state machine and its cooperative checkpoints
//! - The per-page capture pipeline (navigate, scroll, screenshot, OCR, links)
//! - The registry that owns running jobs and routes commands to them

mod coordinator;
mod journal;
mod lifecycle;
mod pipeline;
mod registry;
mod scheduler;
mod scroll;
mod services;

pub use coordinator::JobRunner;
pub use journal::JobJournal;
pub use lifecycle::{Checkpoint, LifecycleController};
pub use pipeline::{PageOutcome, PagePipeline};
pub use registry::{CommandOutcome, JobCommand, JobRegistry, RegistryError, MAX_CRAWL_DEPTH};
pub use scheduler::{FrontierEntry, FrontierScheduler};
pub use scroll::{scroll_to_completion, ScrollOutcome, ScrollSettings, ScrollStop};
pub use services::CrawlServices;
