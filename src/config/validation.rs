use crate::config::types::{
    AdvisoryConfig, BrowserConfig, Config, JobOptions, RecognitionConfig, RegistryConfig,
    StorageConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_browser_config(&config.browser)?;
    validate_recognition_config(&config.recognition)?;
    validate_advisory_config(&config.advisory)?;
    validate_storage_config(&config.storage)?;
    validate_registry_config(&config.registry)?;
    validate_job_options(&config.defaults)?;
    Ok(())
}

/// Validates per-job options
///
/// Called once per job when it is created; a running job never re-validates.
pub fn validate_job_options(options: &JobOptions) -> Result<(), ConfigError> {
    if options.max_scrolls < 1 || options.max_scrolls > 100 {
        return Err(ConfigError::Validation(format!(
            "max_scrolls must be between 1 and 100, got {}",
            options.max_scrolls
        )));
    }

    if options.scroll_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "scroll_timeout_ms must be >= 100ms, got {}ms",
            options.scroll_timeout_ms
        )));
    }

    if options.navigation_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "navigation_timeout_ms must be >= 100ms, got {}ms",
            options.navigation_timeout_ms
        )));
    }

    if options.scroll_settle_ms > options.scroll_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "scroll_settle_ms ({}ms) cannot exceed scroll_timeout_ms ({}ms)",
            options.scroll_settle_ms, options.scroll_timeout_ms
        )));
    }

    let viewport = options.viewport;
    for (name, value) in [("width", viewport.width), ("height", viewport.height)] {
        if !(320..=7680).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "viewport {} must be between 320 and 7680, got {}",
                name, value
            )));
        }
    }

    if let Some(user_agent) = &options.user_agent {
        if user_agent.trim().is_empty() || user_agent.contains(['\r', '\n']) {
            return Err(ConfigError::Validation(
                "user_agent must be a non-empty single line".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    validate_http_url("webdriver-url", &config.webdriver_url)
}

fn validate_recognition_config(config: &RecognitionConfig) -> Result<(), ConfigError> {
    validate_http_url("recognition endpoint", &config.endpoint)?;

    let valid_language = !config.language.is_empty()
        && config
            .language
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '_');
    if !valid_language {
        return Err(ConfigError::Validation(format!(
            "recognition language must be a code like 'eng' or 'eng+deu', got '{}'",
            config.language
        )));
    }

    validate_timeout("recognition timeout-ms", config.timeout_ms)
}

fn validate_advisory_config(config: &AdvisoryConfig) -> Result<(), ConfigError> {
    if let Some(endpoint) = &config.endpoint {
        validate_http_url("advisory endpoint", endpoint)?;
    }
    validate_timeout("advisory timeout-ms", config.timeout_ms)
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.screenshot_dir.is_empty() {
        return Err(ConfigError::Validation(
            "screenshot_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_registry_config(config: &RegistryConfig) -> Result<(), ConfigError> {
    if config.max_active_jobs < 1 || config.max_active_jobs > 256 {
        return Err(ConfigError::Validation(format!(
            "max_active_jobs must be between 1 and 256, got {}",
            config.max_active_jobs
        )));
    }
    Ok(())
}

fn validate_timeout(name: &str, timeout_ms: u64) -> Result<(), ConfigError> {
    if timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "{} must be >= 100ms, got {}ms",
            name, timeout_ms
        )));
    }
    Ok(())
}

fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            name, value
        )));
    }

    Ok(())
}
