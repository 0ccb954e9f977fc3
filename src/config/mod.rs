//! Configuration module for Page-Audit
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use page_audit::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("page-audit.toml")).unwrap();
//! println!("Probing {} links at a time", config.crawler.probe_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, PoolConfig, StorageConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
