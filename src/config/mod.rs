//! Configuration module for Crawl-Lens
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and the per-job [`JobOptions`] validated when a crawl is created.
//!
//! # Example
//!
//! ```no_run
//! use crawl_lens::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl-lens.toml")).unwrap();
//! println!("WebDriver endpoint: {}", config.browser.webdriver_url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AdvisoryConfig, BrowserConfig, Config, JobOptions, RecognitionConfig, RegistryConfig,
    StorageConfig, Viewport,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::{validate, validate_job_options};
