//! URL canonicalization and the request classification the gateway relies on.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string for consistent cache keys.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    normalize(parsed)
}

/// Resolve a possibly relative URL (e.g. `./index.html`) against the origin.
pub fn resolve(origin: &url::Url, input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let joined = origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    normalize(joined)
}

fn normalize(mut parsed: url::Url) -> Result<url::Url, UrlError> {
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Whether the URL points at markup: an `.html` file or a directory root.
pub fn is_document(url: &url::Url) -> bool {
    let path = url.path();
    path.ends_with(".html") || path.ends_with('/')
}

/// Copy of `url` with a `t=<stamp>` parameter that no cache has seen before.
pub fn cache_busted(url: &url::Url, stamp: i64) -> url::Url {
    let mut busted = url.clone();
    busted.query_pairs_mut().append_pair("t", &stamp.to_string());
    busted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_lowercase_host() {
        let url = canonicalize("https://EXAMPLE.COM").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_remove_fragment() {
        let url = canonicalize("https://example.com/chat#latest").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path(), "/chat");
    }

    #[test]
    fn test_canonicalize_preserve_query() {
        let url = canonicalize("https://example.com?a=1&b=2").unwrap();
        assert_eq!(url.query(), Some("a=1&b=2"));
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_resolve_relative_seeds() {
        let origin = url::Url::parse("https://chat.example/app/").unwrap();
        assert_eq!(resolve(&origin, "./").unwrap().as_str(), "https://chat.example/app/");
        assert_eq!(resolve(&origin, "./index.html").unwrap().as_str(), "https://chat.example/app/index.html");
    }

    #[test]
    fn test_resolve_absolute_seed() {
        let origin = url::Url::parse("https://chat.example/").unwrap();
        let url = resolve(&origin, "https://CDN.example/lib/store.js#v").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example/lib/store.js");
    }

    #[test]
    fn test_resolve_rejects_other_schemes() {
        let origin = url::Url::parse("https://chat.example/").unwrap();
        assert!(matches!(resolve(&origin, "data:text/plain,hi"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_is_document() {
        let doc = |s: &str| is_document(&url::Url::parse(s).unwrap());
        assert!(doc("https://chat.example/"));
        assert!(doc("https://chat.example/app/"));
        assert!(doc("https://chat.example/index.html"));
        assert!(doc("https://chat.example/index.html?lang=en"));
        assert!(!doc("https://chat.example/app.js"));
        assert!(!doc("https://chat.example/index.htm"));
    }

    #[test]
    fn test_cache_busted_appends_stamp() {
        let url = url::Url::parse("https://chat.example/index.html").unwrap();
        let busted = cache_busted(&url, 1_700_000_000_000);
        assert_eq!(busted.as_str(), "https://chat.example/index.html?t=1700000000000");
        assert_eq!(url.query(), None);

        let with_query = url::Url::parse("https://chat.example/?lang=en").unwrap();
        assert_eq!(cache_busted(&with_query, 5).query(), Some("lang=en&t=5"));
    }
}
