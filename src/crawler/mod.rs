//! Single-page crawler
//!
//! This module contains the page audit pipeline:
//! - HTTP fetching behind the [`Fetcher`] trait
//! - Incremental tokenizing of the response body with html5ever
//! - Structural extraction (doctype, title, headings, links, login form)
//! - Bounded concurrent link probing
//!
//! [`CrawlEngine`] ties the pieces together for one URL.

mod engine;
mod extractor;
mod fetcher;
mod prober;
mod tokenizer;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{CrawlEngine, CrawlError, PageReport};
pub use extractor::{Extraction, HtmlVersion, PageExtractor, PageSummary};
pub use fetcher::{
    build_http_client, classify_reqwest_error, BodyStream, FetchError, FetchMethod, FetchRequest,
    FetchResponse, Fetcher, ReqwestFetcher, ACCEPT_HTML,
};
pub use prober::{LinkProber, LinkStatus, DEFAULT_PROBE_CONCURRENCY, DEFAULT_PROBE_TIMEOUT};
pub use tokenizer::PageTokenizer;
