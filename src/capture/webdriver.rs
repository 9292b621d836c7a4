//! W3C WebDriver capture backend
//!
//! Talks to a WebDriver endpoint (chromedriver, geckodriver, a Selenium grid)
//! over its JSON wire protocol. Every response wraps its payload in
//! `{"value": ...}`; failures carry `{"value": {"error", "message"}}`.

use crate::capture::links;
use crate::capture::{CaptureClient, CaptureError, CaptureSession};
use crate::config::{BrowserConfig, JobOptions};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

const EXTENT_SCRIPT: &str = "return Math.max(\
     document.body ? document.body.scrollHeight : 0, \
     document.documentElement ? document.documentElement.scrollHeight : 0);";
const SCROLL_BOTTOM_SCRIPT: &str =
    "window.scrollTo(0, Math.max(document.body.scrollHeight, document.documentElement.scrollHeight));";
const SCROLL_TOP_SCRIPT: &str = "window.scrollTo(0, 0);";

/// Builds an HTTP client for WebDriver traffic
fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()
}

/// Sends one WebDriver command and unwraps its `value`
async fn send_command(
    client: &Client,
    method: Method,
    url: Url,
    body: Option<Value>,
) -> Result<Value, CaptureError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await.unwrap_or(Value::Null);
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        return Err(CaptureError::WebDriver { error, message });
    }

    Ok(value)
}

/// Capture client backed by a WebDriver endpoint
pub struct WebDriverClient {
    client: Client,
    endpoint: Url,
    headless: bool,
}

impl WebDriverClient {
    pub fn new(config: &BrowserConfig) -> Result<Self, CaptureError> {
        let mut endpoint = Url::parse(&config.webdriver_url)
            .map_err(|e| CaptureError::Protocol(format!("{}: {}", config.webdriver_url, e)))?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            client: build_http_client()?,
            endpoint,
            headless: config.headless,
        })
    }

    fn capabilities(&self, options: &JobOptions) -> Value {
        let mut args = vec![
            format!(
                "--window-size={},{}",
                options.viewport.width, options.viewport.height
            ),
            "--hide-scrollbars".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(user_agent) = &options.user_agent {
            args.push(format!("--user-agent={}", user_agent));
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl CaptureClient for WebDriverClient {
    async fn open_session(
        &self,
        options: &JobOptions,
    ) -> Result<Box<dyn CaptureSession>, CaptureError> {
        let url = self
            .endpoint
            .join("session")
            .map_err(|e| CaptureError::Protocol(e.to_string()))?;
        let value = send_command(
            &self.client,
            Method::POST,
            url,
            Some(self.capabilities(options)),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| CaptureError::Protocol("new session without sessionId".to_string()))?;
        let session_url = self
            .endpoint
            .join(&format!("session/{}/", session_id))
            .map_err(|e| CaptureError::Protocol(e.to_string()))?;

        tracing::debug!(session_id, "Opened WebDriver session");

        let mut session = WebDriverSession {
            client: self.client.clone(),
            session_url,
            closed: false,
        };
        session
            .command(
                Method::POST,
                "timeouts",
                Some(json!({ "pageLoad": options.navigation_timeout_ms })),
            )
            .await?;

        Ok(Box::new(session))
    }
}

/// One WebDriver session
pub struct WebDriverSession {
    client: Client,
    /// `{endpoint}/session/{id}/`
    session_url: Url,
    closed: bool,
}

impl WebDriverSession {
    async fn command(
        &mut self,
        method: Method,
        route: &str,
        body: Option<Value>,
    ) -> Result<Value, CaptureError> {
        if self.closed {
            return Err(CaptureError::SessionClosed);
        }
        let url = self
            .session_url
            .join(route)
            .map_err(|e| CaptureError::Protocol(e.to_string()))?;
        send_command(&self.client, method, url, body).await
    }

    async fn execute(&mut self, script: &str) -> Result<Value, CaptureError> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    async fn string_value(&mut self, route: &str) -> Result<String, CaptureError> {
        match self.command(Method::GET, route, None).await? {
            Value::String(s) => Ok(s),
            other => Err(CaptureError::Protocol(format!(
                "expected string from {}, got {}",
                route, other
            ))),
        }
    }
}

#[async_trait]
impl CaptureSession for WebDriverSession {
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<(), CaptureError> {
        let body = json!({ "url": url.as_str() });
        match tokio::time::timeout(timeout, self.command(Method::POST, "url", Some(body))).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(CaptureError::Timeout(timeout)),
        }
    }

    async fn content_extent(&mut self) -> Result<u64, CaptureError> {
        let value = self.execute(EXTENT_SCRIPT).await?;
        value
            .as_f64()
            .filter(|h| *h >= 0.0)
            .map(|h| h as u64)
            .ok_or_else(|| CaptureError::Protocol(format!("content extent {}", value)))
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), CaptureError> {
        self.execute(SCROLL_BOTTOM_SCRIPT).await.map(|_| ())
    }

    async fn scroll_to_top(&mut self) -> Result<(), CaptureError> {
        self.execute(SCROLL_TOP_SCRIPT).await.map(|_| ())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, CaptureError> {
        let encoded = self.string_value("screenshot").await?;
        Ok(STANDARD.decode(encoded.trim())?)
    }

    async fn extract_links(&mut self, base: &Url) -> Result<Vec<Url>, CaptureError> {
        let source = self.string_value("source").await?;
        Ok(links::extract_links(&source, base))
    }

    async fn title(&mut self) -> Result<Option<String>, CaptureError> {
        let title = self.string_value("title").await?;
        let title = title.trim();
        Ok((!title.is_empty()).then(|| title.to_string()))
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        if self.closed {
            return Ok(());
        }
        let mut url = self.session_url.clone();
        let path = url.path().trim_end_matches('/').to_string();
        url.set_path(&path);
        self.closed = true;
        send_command(&self.client, Method::DELETE, url, None).await?;
        Ok(())
    }
}
