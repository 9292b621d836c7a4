//! Optional advisory service
//!
//! An [`AdvisoryClient`] can suggest a crawl strategy before the first URL,
//! point at promising links after each page and comment on a finished job.
//! Its output only ever adjusts ordering and pacing; every failure degrades
//! to the defaults returned by [`NoopAdvisor`].

mod http;

pub use http::HttpAdvisoryClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("advisory service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

/// Suggested strategy for a new crawl
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyPlan {
    /// URLs worth visiting first
    pub priority_urls: Vec<String>,
    pub rate_limit_ms: Option<u64>,
    pub max_scrolls: Option<u32>,
}

/// What the advisor sees of a captured page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub url: String,
    pub depth: u32,
    pub title: Option<String>,
    pub text: String,
    pub keywords: Vec<String>,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageAnalysis {
    pub priority_urls: Vec<String>,
    pub relevance_score: Option<f64>,
}

/// Summary of a finished job handed to `reflect`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub root_url: String,
    pub status: String,
    pub pages_processed: u64,
    pub error_count: u64,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reflection {
    pub suggestions: Vec<String>,
}

#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    async fn plan_strategy(&self, root_url: &str) -> Result<StrategyPlan, AdvisoryError>;

    async fn analyze_page(&self, page: &PageInfo) -> Result<PageAnalysis, AdvisoryError>;

    async fn reflect(&self, summary: &JobSummary) -> Result<Reflection, AdvisoryError>;
}

/// Advisor that never advises
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdvisor;

#[async_trait]
impl AdvisoryClient for NoopAdvisor {
    async fn plan_strategy(&self, _root_url: &str) -> Result<StrategyPlan, AdvisoryError> {
        Ok(StrategyPlan::default())
    }

    async fn analyze_page(&self, _page: &PageInfo) -> Result<PageAnalysis, AdvisoryError> {
        Ok(PageAnalysis::default())
    }

    async fn reflect(&self, _summary: &JobSummary) -> Result<Reflection, AdvisoryError> {
        Ok(Reflection::default())
    }
}
