//! Page-Audit: single-page structural audits with link accessibility checks
//!
//! This crate fetches one web page per job, extracts structural metadata from
//! it in a single streaming pass, and probes every link it contains for
//! accessibility. Jobs are driven through a bounded worker pool and can be
//! stopped by the user while queued or in flight.

pub mod config;
pub mod crawler;
pub mod jobs;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Page-Audit operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Job error: {0}")]
    Job(#[from] jobs::JobError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL {0} is not registered")]
    UnknownUrl(i64),

    #[error("Invalid arguments: {0}")]
    Usage(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Page-Audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlEngine, LinkProber, PageReport};
pub use jobs::{resolve_targets, JobOrchestrator, JobStatusView, StoppedJob};
pub use state::JobStatus;
pub use url::{is_external, normalize_url};
