//! Integration tests for page-audit
//!
//! These tests run the crawl engine and the job orchestrator against
//! wiremock servers.

mod crawl_tests;
mod job_tests;

use page_audit::config::Config;
use std::time::Duration;

/// Creates a test configuration with short timeouts
pub fn test_config(database_path: &str) -> Config {
    let mut config = Config::default();
    config.pool.workers = 2;
    config.pool.queue_capacity = 10;
    config.crawler.crawl_timeout_ms = 10_000;
    config.crawler.probe_timeout_ms = 2_000;
    config.crawler.probe_concurrency = 4;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.user_agent.crawler_version = "1.0.0".to_string();
    config.storage.database_path = database_path.to_string();
    config
}

/// Returns a localhost URL nothing is listening on
pub fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let port = listener.local_addr().expect("No local address").port();
    drop(listener);
    format!("http://127.0.0.1:{}/", port)
}

pub const POLL_INTERVAL: Duration = Duration::from_millis(20);
