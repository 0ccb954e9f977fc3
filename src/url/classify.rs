use url::Url;

/// Schemes that never point at a fetchable web page
const NON_WEB_SCHEMES: [&str; 5] = ["mailto:", "tel:", "sms:", "ftp:", "file:"];

/// Resolves an `<a href>` value against the page base
///
/// # Arguments
///
/// * `base` - The effective base URL of the page
/// * `href` - The raw attribute value
///
/// # Returns
///
/// * `Some(Url)` - The resolved absolute http/https URL
/// * `None` - If the href is empty, a fragment, a `javascript:` link, a
///   non-web scheme, unresolvable, or resolves to a non-http(s) URL
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:") {
        return None;
    }
    if NON_WEB_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }

    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

/// Returns true if `link` points outside the audited page's origin
///
/// A link is external when its scheme differs from the target's, or when its
/// host (case-insensitive) or effective port differs.
pub fn is_external(target: &Url, link: &Url) -> bool {
    if !target.scheme().eq_ignore_ascii_case(link.scheme()) {
        return true;
    }

    let target_host = target.host_str().map(str::to_ascii_lowercase);
    let link_host = link.host_str().map(str::to_ascii_lowercase);
    if target_host != link_host {
        return true;
    }

    target.port_or_known_default() != link.port_or_known_default()
}
