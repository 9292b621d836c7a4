//! URL handling module for Crawl-Lens
//!
//! This module provides URL normalization and the
//! same-origin rule that keeps a crawl inside the site it started on.

mod normalize;

pub use normalize::normalize_url;

use crate::UrlError;
use url::Url;

/// Returns true when both URLs share scheme, host and port
///
/// # Examples
///
/// ```
/// use url::Url;
/// use crawl_lens::url::same_origin;
///
/// let a = Url::parse("https://example.com/a").unwrap();
/// let b = Url::parse("https://example.com/b?x=1").unwrap();
/// let c = Url::parse("https://other.com/a").unwrap();
/// assert!(same_origin(&a, &b));
/// assert!(!same_origin(&a, &c));
/// ```
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Parses and normalizes the root URL of a new crawl
///
/// The URL must be absolute and use http or https.
pub fn parse_start_url(raw: &str) -> Result<Url, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Parse("empty URL".to_string()));
    }
    normalize_url(trimmed)
}

/// Normalizes candidate links and keeps those on the root's origin
///
/// Links that fail to normalize are dropped. Duplicates keep their first
/// position.
pub fn filter_same_origin<'a, I>(root: &Url, links: I) -> Vec<Url>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut kept = Vec::new();

    for link in links {
        let normalized = match normalize_url(link) {
            Ok(url) => url,
            Err(e) => {
                tracing::trace!("Dropping link {}: {}", link, e);
                continue;
            }
        };

        if !same_origin(root, &normalized) {
            continue;
        }

        if seen.insert(normalized.as_str().to_string()) {
            kept.push(normalized);
        }
    }

    kept
}
