//! Crawl engine
//!
//! Fetches a single page, streams its body through html5ever's tokenizer on
//! a blocking thread, then probes the collected links. The engine owns no
//! persistent state; its result is a [`PageReport`] the caller persists.

use crate::config::Config;
use crate::crawler::extractor::{Extraction, PageSummary};
use crate::crawler::fetcher::{FetchError, FetchRequest, Fetcher, ReqwestFetcher, ACCEPT_HTML};
use crate::crawler::prober::LinkProber;
use crate::crawler::tokenizer::PageTokenizer;
use crate::storage::NewCrawlResult;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Body chunks buffered between the network and the tokenizer
const PARSE_BACKLOG: usize = 16;

/// Errors that end a crawl without a report
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("failed to reach {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("crawl cancelled")]
    Cancelled,

    #[error("failed to read body of {url}: {message}")]
    Body { url: String, message: String },
}

impl CrawlError {
    /// True for errors caused by the target string itself
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidUrl { .. } | Self::UnsupportedScheme { .. })
    }
}

/// Everything the audit learned about one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
    /// The audited URL
    pub url: Url,
    /// HTTP status of the page response
    pub status_code: u16,
    pub summary: PageSummary,
    pub inaccessible_links: u32,
    /// Number of distinct links probed
    pub links_checked: usize,
}

impl PageReport {
    /// Converts the report into the values persisted for a job
    pub fn into_new_result(self, job_id: i64, url_id: i64) -> NewCrawlResult {
        NewCrawlResult {
            job_id,
            url_id,
            html_version: Some(self.summary.html_version.as_str().to_string()),
            title: self.summary.title,
            headings: self.summary.headings,
            internal_links: self.summary.internal_links,
            external_links: self.summary.external_links,
            inaccessible_links: self.inaccessible_links,
            has_login_form: self.summary.has_login_form,
        }
    }
}

/// Fetches, parses and link-checks one page per call
#[derive(Clone)]
pub struct CrawlEngine {
    fetcher: Arc<dyn Fetcher>,
    prober: LinkProber,
    user_agent: String,
    crawl_timeout: Duration,
}

impl std::fmt::Debug for CrawlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlEngine")
            .field("prober", &self.prober)
            .field("user_agent", &self.user_agent)
            .field("crawl_timeout", &self.crawl_timeout)
            .finish_non_exhaustive()
    }
}

impl CrawlEngine {
    /// Creates an engine around an existing fetcher
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &Config) -> Self {
        let user_agent = config.user_agent.header_value();
        let prober = LinkProber::new(
            Arc::clone(&fetcher),
            config.crawler.probe_concurrency,
            config.crawler.probe_timeout(),
            user_agent.clone(),
        );
        Self {
            fetcher,
            prober,
            user_agent,
            crawl_timeout: config.crawler.crawl_timeout(),
        }
    }

    /// Creates an engine backed by a reqwest client
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let fetcher = ReqwestFetcher::from_config(&config.user_agent, config.crawler.crawl_timeout())?;
        Ok(Self::new(Arc::new(fetcher), config))
    }

    /// Crawls `target` and returns its report
    ///
    /// # Arguments
    ///
    /// * `target` - Absolute http or https URL of the page
    /// * `cancel` - Aborts the crawl, including link probing
    ///
    /// # Returns
    ///
    /// * `Ok(PageReport)` - The page was fetched and parsed; non-2xx pages
    ///   are parsed too
    /// * `Err(CrawlError)` - The page could not be audited
    pub async fn crawl(
        &self,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<PageReport, CrawlError> {
        let url = parse_target(target)?;
        let started = Instant::now();

        tracing::info!("Crawling {}", url);

        let (status_code, extraction) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
            outcome = tokio::time::timeout(self.crawl_timeout, self.fetch_and_extract(&url)) => {
                match outcome {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(CrawlError::Timeout {
                            url: url.to_string(),
                        })
                    }
                }
            }
        };

        let Extraction {
            summary,
            base,
            candidates,
        } = extraction;

        let links_checked = candidates.len();
        if links_checked > 0 {
            tracing::info!(
                "Checking accessibility of {} links for {} (base {})",
                links_checked,
                url,
                base
            );
        }
        let inaccessible = self.prober.count_inaccessible_urls(candidates, cancel).await;

        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }

        let report = PageReport {
            url,
            status_code,
            summary,
            inaccessible_links: u32::try_from(inaccessible).unwrap_or(u32::MAX),
            links_checked,
        };

        tracing::info!(
            "Completed crawl for {} in {:?}: {} internal, {} external links, {} inaccessible, login form: {}",
            report.url,
            started.elapsed(),
            report.summary.internal_links,
            report.summary.external_links,
            report.inaccessible_links,
            report.summary.has_login_form
        );

        Ok(report)
    }

    async fn fetch_and_extract(&self, url: &Url) -> Result<(u16, Extraction), CrawlError> {
        let request = FetchRequest::get(url.clone())
            .header("User-Agent", &self.user_agent)
            .header("Accept", ACCEPT_HTML)
            .timeout(self.crawl_timeout);

        let mut response = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| match e {
                FetchError::Timeout => CrawlError::Timeout {
                    url: url.to_string(),
                },
                other => CrawlError::Unreachable {
                    url: url.to_string(),
                    source: other,
                },
            })?;

        tracing::debug!(
            "Response for {}: status={}, content-type={:?}",
            url,
            response.status,
            response.content_type
        );

        if !response.is_html() {
            tracing::warn!(
                "Content-Type does not indicate HTML for {}: {:?}",
                url,
                response.content_type
            );
        }

        // Tokenizing runs on a blocking thread; chunks reach it through a
        // bounded channel. Dropping the sender ends the parse.
        let (chunks, receiver) = mpsc::channel(PARSE_BACKLOG);
        let parser = tokio::task::spawn_blocking({
            let target = url.clone();
            move || extract_chunks(target, receiver)
        });

        while let Some(chunk) = response.body.next().await {
            let chunk = chunk.map_err(|e| match e {
                FetchError::Timeout => CrawlError::Timeout {
                    url: url.to_string(),
                },
                other => CrawlError::Body {
                    url: url.to_string(),
                    message: other.to_string(),
                },
            })?;
            if chunks.send(chunk).await.is_err() {
                break;
            }
        }
        drop(chunks);

        let extraction = parser.await.map_err(|e| CrawlError::Body {
            url: url.to_string(),
            message: format!("parser task failed: {}", e),
        })?;

        Ok((response.status, extraction))
    }
}

/// Tokenizes body chunks until the sending side closes
fn extract_chunks(target: Url, mut chunks: mpsc::Receiver<Bytes>) -> Extraction {
    let mut tokenizer = PageTokenizer::new(target);
    while let Some(chunk) = chunks.blocking_recv() {
        tokenizer.feed(&chunk);
    }
    tokenizer.finish()
}

/// Validates the crawl target
fn parse_target(target: &str) -> Result<Url, CrawlError> {
    let url = Url::parse(target.trim()).map_err(|e| CrawlError::InvalidUrl {
        url: target.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(CrawlError::UnsupportedScheme {
                scheme: scheme.to_string(),
            })
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(CrawlError::InvalidUrl {
            url: target.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}
