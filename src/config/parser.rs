//! Reading `page-audit.toml`
//!
//! Every table is optional; missing keys fall back to [`Config::default`].
//! A file is only accepted once it passes [`validate`].

use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reads, parses and validates an auditor configuration
///
/// Pool sizing, crawl and link-check timeouts, the User-Agent identity and
/// the database location all come from this file.
///
/// # Errors
///
/// * `ConfigError::Io` - The file could not be read
/// * `ConfigError::Parse` - The content is not valid TOML for [`Config`]
/// * `ConfigError::Validation` - A value is out of range, e.g. a link-check
///   timeout longer than the page timeout
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use page_audit::config::load_config;
///
/// let config = load_config(Path::new("page-audit.toml")).unwrap();
/// println!("Workers: {}", config.pool.workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// Hex-encoded SHA-256 of the configuration file
///
/// The CLI logs it at startup, which ties a job history to the settings it
/// ran under.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_content(&std::fs::read_to_string(path)?))
}

/// Loads the configuration along with the hash of the exact bytes parsed
///
/// The file is read once, so the hash always matches the returned config
/// even if the file is rewritten concurrently.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
