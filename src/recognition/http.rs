//! HTTP recognition backend
//!
//! Posts the raw PNG to a recognition service:
//!
//! ```text
//! POST {endpoint}?lang=eng
//! Content-Type: image/png
//!
//! 200 {"text": "...", "error": null}
//! ```

use crate::config::RecognitionConfig;
use crate::recognition::{RecognitionClient, RecognitionError, RecognizedText};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    error: Option<String>,
}

/// Recognition client for an HTTP OCR service
pub struct HttpRecognitionClient {
    client: Client,
    endpoint: Url,
}

impl HttpRecognitionClient {
    pub fn new(config: &RecognitionConfig) -> Result<Self, RecognitionError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| RecognitionError::Endpoint(format!("{}: {}", config.endpoint, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .build()?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl RecognitionClient for HttpRecognitionClient {
    async fn recognize(
        &self,
        image: &[u8],
        language: &str,
    ) -> Result<RecognizedText, RecognitionError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .query(&[("lang", language)])
            .header("Content-Type", "image/png")
            .body(image.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            return Err(RecognitionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RecognizeResponse = response.json().await?;
        if let Some(error) = parsed.error.filter(|e| !e.is_empty()) {
            return Err(RecognitionError::Service(error));
        }

        tracing::debug!(chars = parsed.text.len(), "Recognition finished");
        Ok(RecognizedText { text: parsed.text })
    }
}
