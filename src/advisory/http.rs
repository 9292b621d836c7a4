//! HTTP advisory backend
//!
//! JSON over `POST {endpoint}/plan`, `/analyze` and `/reflect`.

use crate::advisory::{
    AdvisoryClient, AdvisoryError, JobSummary, PageAnalysis, PageInfo, Reflection, StrategyPlan,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

pub struct HttpAdvisoryClient {
    client: Client,
    endpoint: Url,
}

impl HttpAdvisoryClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, AdvisoryError> {
        let mut endpoint = Url::parse(endpoint)
            .map_err(|e| AdvisoryError::Endpoint(format!("{}: {}", endpoint, e)))?;
        // Keep the last path segment when joining
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .build()?;

        Ok(Self { client, endpoint })
    }

    async fn post<B, R>(&self, route: &str, body: &B) -> Result<R, AdvisoryError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self
            .endpoint
            .join(route)
            .map_err(|e| AdvisoryError::Endpoint(e.to_string()))?;

        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            return Err(AdvisoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl AdvisoryClient for HttpAdvisoryClient {
    async fn plan_strategy(&self, root_url: &str) -> Result<StrategyPlan, AdvisoryError> {
        self.post("plan", &serde_json::json!({ "url": root_url }))
            .await
    }

    async fn analyze_page(&self, page: &PageInfo) -> Result<PageAnalysis, AdvisoryError> {
        self.post("analyze", page).await
    }

    async fn reflect(&self, summary: &JobSummary) -> Result<Reflection, AdvisoryError> {
        self.post("reflect", summary).await
    }
}
