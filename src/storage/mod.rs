//! Storage module for persisting audit data
//!
//! This module handles all persistence for Page-Audit, including:
//! - Registered URL records with paginated listing
//! - Crawl job records with conditional status transitions
//! - Append-only crawl results, at most one per job
//!
//! Two backends implement the store traits: [`SqliteStorage`] for real runs
//! and [`MemoryStorage`] for tests and embedding.

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::{JobStore, ResultStore, StorageError, StorageResult, UrlStore};

use crate::state::JobStatus;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Default number of URLs per listing page
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Largest accepted listing page size
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Represents a registered URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    pub id: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Represents one crawl attempt for a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlJob {
    pub id: i64,
    pub url_id: i64,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values of a crawl result before it is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCrawlResult {
    pub job_id: i64,
    pub url_id: i64,
    pub html_version: Option<String>,
    pub title: Option<String>,
    /// Heading counts, index 0 is `h1`
    pub headings: [u32; 6],
    pub internal_links: u32,
    pub external_links: u32,
    pub inaccessible_links: u32,
    pub has_login_form: bool,
}

/// A persisted crawl result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlResult {
    pub id: i64,
    pub job_id: i64,
    pub url_id: i64,
    pub html_version: Option<String>,
    pub title: Option<String>,
    /// Heading counts, index 0 is `h1`
    pub headings: [u32; 6],
    pub internal_links: u32,
    pub external_links: u32,
    pub inaccessible_links: u32,
    pub has_login_form: bool,
    pub created_at: DateTime<Utc>,
}

impl CrawlResult {
    /// Heading count for `level` in 1..=6; other levels count zero
    pub fn heading_count(&self, level: usize) -> u32 {
        match level {
            1..=6 => self.headings[level - 1],
            _ => 0,
        }
    }
}

/// Side effects applied together with a status transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionEffects {
    /// Recorded on the job when present; an existing message is kept otherwise
    pub error_message: Option<String>,
}

impl TransitionEffects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
        }
    }
}

/// Column a URL listing is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlSort {
    Id,
    Url,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl UrlSort {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Url => "url",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    /// Parses a sort column name; unknown names yield None
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "id" => Some(Self::Id),
            "url" => Some(Self::Url),
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            _ => None,
        }
    }
}

/// Listing direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Pagination and ordering for URL listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
    pub sort: UrlSort,
    pub order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort: UrlSort::default(),
            order: SortOrder::default(),
        }
    }
}

impl ListQuery {
    /// Clamps page to at least 1; a limit outside 1..=100 becomes the default
    pub fn normalized(self) -> Self {
        let limit = if (1..=MAX_PAGE_LIMIT).contains(&self.limit) {
            self.limit
        } else {
            DEFAULT_PAGE_LIMIT
        };
        Self {
            page: self.page.max(1),
            limit,
            ..self
        }
    }

    /// Number of rows skipped before this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// One page of a URL listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPage {
    pub items: Vec<UrlRecord>,
    /// Total number of registered URLs
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}
