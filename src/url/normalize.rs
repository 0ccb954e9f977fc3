use crate::UrlError;
use url::Url;

/// Normalizes a URL for registration in the URL store
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace and parse; reject if malformed
/// 2. Require the `http` or `https` scheme
/// 3. Require a host and lowercase it
/// 4. Empty path becomes `/`
/// 5. Remove the fragment (everything after `#`)
///
/// The path and query are kept as given: the page that gets audited is
/// exactly the page the user registered.
///
/// # Examples
///
/// ```
/// use page_audit::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.com/Docs#intro").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/Docs");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    // The url crate already lowercases registered domain names; IP literals
    // and the empty host are the only cases left to reject here.
    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingHost),
    }

    url.set_fragment(None);

    Ok(url)
}
