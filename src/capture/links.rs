//! Link and title extraction from rendered page source

use crate::url::filter_same_origin;
use scraper::{Html, Selector};
use url::Url;

/// Schemes that never lead to a crawlable page
const SKIPPED_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "#"];

/// Title of a rendered page, trimmed; `None` when missing or blank
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts same-origin page links from rendered HTML
///
/// Follows `<a href>` (except downloads) and `<link rel="canonical">`.
/// Relative links resolve against `<base href>` when present, else against
/// `page_url`. Results are normalized, deduplicated and restricted to the
/// origin of `page_url`.
pub fn extract_links(html: &str, page_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let base = document_base(&document, page_url);

    let mut hrefs: Vec<String> = Vec::new();

    if let Ok(anchors) = Selector::parse("a[href]") {
        for element in document.select(&anchors) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(resolved) = element.value().attr("href").and_then(|h| resolve(h, &base)) {
                hrefs.push(resolved);
            }
        }
    }

    if let Ok(canonical) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical) {
            if let Some(resolved) = element.value().attr("href").and_then(|h| resolve(h, &base)) {
                hrefs.push(resolved);
            }
        }
    }

    filter_same_origin(page_url, hrefs.iter().map(String::as_str))
}

fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|element| element.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone())
}

fn resolve(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if SKIPPED_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        return None;
    }

    let absolute = base.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string())
}
