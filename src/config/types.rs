use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Page-Audit
///
/// Every section is optional; missing sections and keys fall back to the
/// defaults documented on each field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Job worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Number of workers claiming jobs (default 10)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the pending task queue (default 100)
    #[serde(default = "default_queue_capacity", rename = "queue-capacity")]
    pub queue_capacity: usize,
}

/// Page fetch and link probe configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Budget for fetching and parsing the audited page (milliseconds)
    #[serde(default = "default_crawl_timeout_ms", rename = "crawl-timeout-ms")]
    pub crawl_timeout_ms: u64,

    /// Budget for a single link probe, HEAD plus GET fallback (milliseconds)
    #[serde(default = "default_probe_timeout_ms", rename = "probe-timeout-ms")]
    pub probe_timeout_ms: u64,

    /// Maximum number of links probed at once for one page
    #[serde(default = "default_probe_concurrency", rename = "probe-concurrency")]
    pub probe_concurrency: usize,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(default = "default_crawler_name", rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(default = "default_crawler_version", rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(default, rename = "contact-url")]
    pub contact_url: Option<String>,
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path", rename = "database-path")]
    pub database_path: String,
}

impl CrawlerConfig {
    pub fn crawl_timeout(&self) -> Duration {
        Duration::from_millis(self.crawl_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl UserAgentConfig {
    /// Builds the User-Agent header value
    ///
    /// Format: `name/version` or `name/version (+contact-url)`
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, contact
            ),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            crawl_timeout_ms: default_crawl_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_concurrency: default_probe_concurrency(),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_workers() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    100
}

fn default_crawl_timeout_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_probe_concurrency() -> usize {
    10
}

fn default_crawler_name() -> String {
    "page-audit".to_string()
}

fn default_crawler_version() -> String {
    "1.0".to_string()
}

fn default_database_path() -> String {
    "./page-audit.db".to_string()
}
