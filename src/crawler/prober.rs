//! Link accessibility prober
//!
//! Checks every link found on a page with a HEAD request, falling back to
//! GET when the server answers 405. Links are probed by a small pool of
//! workers that claim the next link through a shared cursor, so at most
//! `concurrency` probes are in flight for one page.
//!
//! Probing never fails the crawl: transport errors and timeouts leave a link
//! uncounted, and cancellation returns the count gathered so far.

use crate::crawler::fetcher::{FetchMethod, FetchRequest, Fetcher, ACCEPT_HTML};
use crate::url::resolve_href;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Default number of concurrent probes per page
pub const DEFAULT_PROBE_CONCURRENCY: usize = 10;

/// Default per-link deadline
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of probing one link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Answered with a status below 400
    Accessible(u16),
    /// Answered with a status in 400..=599
    Inaccessible(u16),
    /// Transport error or timeout
    Unknown,
}

impl LinkStatus {
    pub fn from_status(status: u16) -> Self {
        if (400..=599).contains(&status) {
            Self::Inaccessible(status)
        } else {
            Self::Accessible(status)
        }
    }

    pub fn is_inaccessible(&self) -> bool {
        matches!(self, Self::Inaccessible(_))
    }
}

/// Bounded concurrent link prober
#[derive(Clone)]
pub struct LinkProber {
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
    timeout: Duration,
    user_agent: String,
}

impl LinkProber {
    /// Creates a prober
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Transport used for HEAD/GET probes
    /// * `concurrency` - Maximum probes in flight (at least 1)
    /// * `timeout` - Deadline for one link, covering the GET fallback
    /// * `user_agent` - User-Agent header value
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        concurrency: usize,
        timeout: Duration,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
            timeout,
            user_agent: user_agent.into(),
        }
    }

    /// Counts the inaccessible links among `hrefs`
    ///
    /// Each href is resolved against `base`; only http and https links are
    /// probed.
    ///
    /// # Returns
    ///
    /// The number of links that answered with a 4xx or 5xx status. When
    /// `cancel` fires the partial count is returned.
    pub async fn count_inaccessible(
        &self,
        base: &Url,
        hrefs: &[String],
        cancel: &CancellationToken,
    ) -> usize {
        let links: Vec<Url> = hrefs
            .iter()
            .filter_map(|href| resolve_href(base, href))
            .collect();
        self.count_inaccessible_urls(links, cancel).await
    }

    /// Counts the inaccessible links among already resolved URLs
    pub async fn count_inaccessible_urls(&self, links: Vec<Url>, cancel: &CancellationToken) -> usize {
        if links.is_empty() {
            return 0;
        }

        let links: Arc<[Url]> = links.into();
        let cursor = Arc::new(AtomicUsize::new(0));
        let inaccessible = Arc::new(AtomicUsize::new(0));
        let workers = self.concurrency.min(links.len());

        tracing::debug!(
            "Probing {} links with {} workers",
            links.len(),
            workers
        );

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let prober = self.clone();
            let links = Arc::clone(&links);
            let cursor = Arc::clone(&cursor);
            let inaccessible = Arc::clone(&inaccessible);
            let cancel = cancel.clone();

            set.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(link) = links.get(index) else {
                        break;
                    };

                    let status = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        status = prober.probe(link) => status,
                    };

                    if status.is_inaccessible() {
                        inaccessible.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Link probe worker failed: {}", e);
            }
        }

        inaccessible.load(Ordering::Relaxed)
    }

    /// Probes one link under the per-link deadline
    pub async fn probe(&self, link: &Url) -> LinkStatus {
        match tokio::time::timeout(self.timeout, self.probe_uncapped(link)).await {
            Ok(status) => status,
            Err(_) => {
                tracing::debug!("Probe of {} timed out after {:?}", link, self.timeout);
                LinkStatus::Unknown
            }
        }
    }

    async fn probe_uncapped(&self, link: &Url) -> LinkStatus {
        let status = match self.send(FetchMethod::Head, link).await {
            Some(405) => {
                tracing::debug!("HEAD not allowed for {}, retrying with GET", link);
                self.send(FetchMethod::Get, link).await
            }
            other => other,
        };

        match status {
            Some(code) => {
                let status = LinkStatus::from_status(code);
                if status.is_inaccessible() {
                    tracing::debug!("Link {} is inaccessible ({})", link, code);
                }
                status
            }
            None => LinkStatus::Unknown,
        }
    }

    async fn send(&self, method: FetchMethod, link: &Url) -> Option<u16> {
        let request = FetchRequest {
            method,
            url: link.clone(),
            headers: Vec::new(),
            timeout: Some(self.timeout),
        }
        .header("User-Agent", &self.user_agent)
        .header("Accept", ACCEPT_HTML);

        match self.fetcher.fetch(request).await {
            // The body is dropped unread; only the status matters.
            Ok(response) => Some(response.status),
            Err(e) => {
                tracing::debug!("Probe of {} failed: {}", link, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for LinkProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkProber")
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}
