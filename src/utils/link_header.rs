use once_cell::sync::Lazy;
use regex::Regex;

static NEXT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#).expect("valid next-link regex"));

/// Extracts the `rel="next"` URL from an RFC 8288 `Link` header value, if
/// one is present. Pagination loops until this returns `None`.
pub fn next_link(header: &str) -> Option<String> {
    NEXT_LINK
        .captures(header)
        .and_then(|captures| captures.get(1))
        .map(|url| url.as_str().to_string())
}
