//! URL handling module for Page-Audit
//!
//! This module provides URL normalization for registration, href resolution
//! against a page base, and internal/external link classification.

mod classify;
mod normalize;

// Re-export main functions
pub use classify::{is_external, resolve_href};
pub use normalize::normalize_url;

use url::Url;

/// Link classification relative to the audited page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Same scheme and authority as the audited page
    Internal,
    /// Different scheme, host or port
    External,
}

impl LinkKind {
    /// Classifies `link` against the audited `target`
    pub fn of(target: &Url, link: &Url) -> Self {
        if is_external(target, link) {
            LinkKind::External
        } else {
            LinkKind::Internal
        }
    }

    /// Returns true for external links
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_link_kind_internal() {
        let target = url("https://example.com/");
        assert_eq!(
            LinkKind::of(&target, &url("https://example.com/about")),
            LinkKind::Internal
        );
    }

    #[test]
    fn test_link_kind_external() {
        let target = url("https://example.com/");
        let kind = LinkKind::of(&target, &url("https://other.org/"));
        assert_eq!(kind, LinkKind::External);
        assert!(kind.is_external());
    }
}
