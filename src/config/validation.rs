use crate::config::types::{Config, CrawlerConfig, PoolConfig, StorageConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pool_config(&config.pool)?;
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates worker pool configuration
fn validate_pool_config(config: &PoolConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            config.workers
        )));
    }

    if config.queue_capacity < 1 || config.queue_capacity > 10_000 {
        return Err(ConfigError::Validation(format!(
            "queue_capacity must be between 1 and 10000, got {}",
            config.queue_capacity
        )));
    }

    Ok(())
}

/// Validates crawl and probe configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.crawl_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "crawl_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.probe_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "probe_timeout_ms must be > 0".to_string(),
        ));
    }

    // A single slow link must not be able to eat the whole page budget.
    if config.probe_timeout_ms >= config.crawl_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "probe_timeout_ms ({}ms) must be shorter than crawl_timeout_ms ({}ms)",
            config.probe_timeout_ms, config.crawl_timeout_ms
        )));
    }

    if config.probe_concurrency < 1 || config.probe_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "probe_concurrency must be between 1 and 100, got {}",
            config.probe_concurrency
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    if let Some(contact_url) = &config.contact_url {
        Url::parse(contact_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
