//! Text recognition over captured screenshots
//!
//! A [`RecognitionClient`] turns a PNG screenshot into raw text. The crawl
//! never depends on it: failures are folded into a [`RecognitionOutcome`]
//! carrying empty text, zero confidence and the error message.

mod confidence;
mod http;

pub use confidence::score_confidence;
pub use http::HttpRecognitionClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from recognition backends
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("recognition service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("recognition failed: {0}")]
    Service(String),

    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

/// Raw text returned by a recognition backend
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecognizedText {
    pub text: String,
}

/// Extracts text from screenshots
#[async_trait]
pub trait RecognitionClient: Send + Sync {
    /// Runs recognition over PNG bytes in the given language
    async fn recognize(
        &self,
        image: &[u8],
        language: &str,
    ) -> Result<RecognizedText, RecognitionError>;
}

/// Recognition result stored on an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionOutcome {
    pub text: String,
    /// Heuristic quality score in [0, 100]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecognitionOutcome {
    /// Scores recognized text
    pub fn recognized(text: String) -> Self {
        let confidence = score_confidence(&text);
        Self {
            text,
            confidence,
            error: None,
        }
    }

    /// Placeholder recorded when recognition failed
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

impl From<Result<RecognizedText, RecognitionError>> for RecognitionOutcome {
    fn from(result: Result<RecognizedText, RecognitionError>) -> Self {
        match result {
            Ok(recognized) => Self::recognized(recognized.text),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}
