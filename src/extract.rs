//! Media link extraction from feed entry HTML.
//!
//! Feed entries embed their media as plain anchors inside an HTML fragment.
//! Extraction collects every `href` and keeps only those pointing at an
//! allow-listed media host.

use std::sync::LazyLock;

use scraper::{Html, Selector};

#[allow(clippy::expect_used)]
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector must parse"));

/// Collects every anchor `href` from an HTML fragment, in document order.
///
/// Duplicate hrefs are preserved; the dispatch layer deduplicates by
/// destination filename.
#[must_use]
pub fn extract_links(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&ANCHOR_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .map(ToString::to_string)
        .collect()
}

/// Checks a URL against the allow-list of media hosts.
///
/// A URL is allowed when it contains `"{domain}/"` for any configured
/// domain. The trailing slash keeps `i.example.com` from matching
/// `i.example.community`.
#[must_use]
pub fn is_allowed_host(url: &str, domains: &[String]) -> bool {
    domains.iter().any(|d| url.contains(&format!("{d}/")))
}

/// Extracts all allow-listed media links from an HTML fragment.
#[must_use]
pub fn extract_media_links(html: &str, domains: &[String]) -> Vec<String> {
    extract_links(html)
        .into_iter()
        .filter(|url| is_allowed_host(url, domains))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains() -> Vec<String> {
        vec!["imgur.com".to_string(), "i.redd.it".to_string()]
    }

    #[test]
    fn test_extract_links_collects_hrefs_in_order() {
        let html = r#"<p><a href="https://i.redd.it/a.jpg">[link]</a>
            <span><a href="https://example.com/comments/x">[comments]</a></span></p>"#;
        assert_eq!(
            extract_links(html),
            vec![
                "https://i.redd.it/a.jpg".to_string(),
                "https://example.com/comments/x".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_links_ignores_anchors_without_href() {
        let html = r#"<a name="top">anchor</a><a href="https://i.redd.it/b.png">x</a>"#;
        assert_eq!(extract_links(html), vec!["https://i.redd.it/b.png"]);
    }

    #[test]
    fn test_extract_links_empty_fragment() {
        assert!(extract_links("").is_empty());
        assert!(extract_links("plain text, no markup").is_empty());
    }

    #[test]
    fn test_allowed_host_requires_trailing_slash_boundary() {
        let domains = domains();
        assert!(is_allowed_host("https://imgur.com/abc.gifv", &domains));
        assert!(is_allowed_host("https://i.imgur.com/abc.jpg", &domains));
        assert!(!is_allowed_host("https://imgur.community/abc.jpg", &domains));
        assert!(!is_allowed_host("https://example.com/imgur.com", &domains));
    }

    #[test]
    fn test_extract_media_links_filters_non_media_hosts() {
        let html = r#"
            <a href="https://i.redd.it/pic.jpg">[link]</a>
            <a href="https://example.com/r/pics/comments/x">[comments]</a>
            <a href="https://imgur.com/clip.gifv">[mirror]</a>
        "#;
        assert_eq!(
            extract_media_links(html, &domains()),
            vec![
                "https://i.redd.it/pic.jpg".to_string(),
                "https://imgur.com/clip.gifv".to_string(),
            ]
        );
    }
}
