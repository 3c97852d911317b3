//! Image reference extraction from a rendered page.
//!
//! Operates on the HTML string handed back by the browser session after the
//! page has been scrolled and its sliders driven, so lazy-loaded markup is
//! already materialized. Walks every surface a page can expose an image
//! through: plain `<img>` tags, anchors wrapping images, responsive `srcset`
//! lists, `<picture>` groups, Open Graph metadata, `data-*` lazy-load
//! placeholders and inline `background-image` styles. The union is
//! deduplicated by URL; raw references are kept as-is, upgrading them is the
//! resolver's job.

use scraper::{Html, Selector};
use std::collections::HashSet;

use crate::models::reference::{looks_like_image, ImageReference, ReferenceOrigin};

/// Deduplicating collector preserving first-seen order and provenance.
struct ReferenceSet {
    seen: HashSet<String>,
    refs: Vec<ImageReference>,
}

impl ReferenceSet {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            refs: Vec::new(),
        }
    }

    fn push(&mut self, url: &str, origin: ReferenceOrigin) {
        let url = url.trim();
        if url.is_empty() || !self.seen.insert(url.to_string()) {
            return;
        }
        self.refs.push(ImageReference::new(url, origin));
    }
}

/// Extract the deduplicated set of raw image references from rendered HTML.
pub fn extract_references(html: &str) -> Vec<ImageReference> {
    let document = Html::parse_document(html);
    let a_sel = Selector::parse("a").expect("valid selector");
    let img_sel = Selector::parse("img").expect("valid selector");
    let source_sel = Selector::parse("picture source").expect("valid selector");
    let og_sel = Selector::parse(r#"meta[property="og:image"]"#).expect("valid selector");
    let any_sel = Selector::parse("*").expect("valid selector");

    let mut set = ReferenceSet::new();

    // Anchors wrapping images: when the href itself is an image asset it is
    // the full-size target and wins over the nested thumbnail's src.
    for link in document.select(&a_sel) {
        let href = link.value().attr("href").filter(|h| looks_like_image(h));
        if let Some(href) = href {
            set.push(href, ReferenceOrigin::TagAttribute);
            continue;
        }
        for img in link.select(&img_sel) {
            if let Some(src) = img.value().attr("src") {
                set.push(src, ReferenceOrigin::TagAttribute);
            }
        }
    }

    // Standalone images, preferring responsive descriptor lists over src.
    for img in document.select(&img_sel) {
        let data_srcset = img.value().attr("data-srcset");
        let srcset = img.value().attr("srcset");
        if let Some(best) = data_srcset.and_then(best_from_srcset) {
            set.push(&best, ReferenceOrigin::ResponsiveAttribute);
        } else if let Some(best) = srcset.and_then(best_from_srcset) {
            set.push(&best, ReferenceOrigin::ResponsiveAttribute);
        } else if let Some(src) = img.value().attr("src") {
            set.push(src, ReferenceOrigin::TagAttribute);
        }
    }

    // <picture>/<source> responsive groups.
    for source in document.select(&source_sel) {
        if let Some(best) = source.value().attr("srcset").and_then(best_from_srcset) {
            set.push(&best, ReferenceOrigin::StructuredSource);
        }
    }

    // Open Graph image metadata.
    for meta in document.select(&og_sel) {
        if let Some(content) = meta.value().attr("content") {
            set.push(content, ReferenceOrigin::Metadata);
        }
    }

    // Lazy-load placeholders: any data-* attribute holding an image path.
    for element in document.select(&any_sel) {
        for (name, value) in element.value().attrs() {
            if name.contains("data-") && name != "data-srcset" && looks_like_image(value) {
                set.push(value, ReferenceOrigin::TagAttribute);
            }
        }
    }

    // Inline background-image declarations.
    for element in document.select(&any_sel) {
        let Some(style) = element.value().attr("style") else {
            continue;
        };
        if !style.contains("background-image") {
            continue;
        }
        if let Some(url) = first_css_url(style) {
            set.push(&url, ReferenceOrigin::InlineStyle);
        }
    }

    set.refs
}

/// Pick the URL with the largest numeric descriptor from a srcset-style
/// `url descriptor` list. Entries without a descriptor are skipped.
pub fn best_from_srcset(srcset: &str) -> Option<String> {
    let mut best: Option<(&str, u64)> = None;
    for entry in srcset.split(',') {
        let mut parts = entry.split_whitespace();
        let (Some(url), Some(descriptor)) = (parts.next(), parts.next()) else {
            continue;
        };
        if parts.next().is_some() {
            continue;
        }
        let digits: String = descriptor.chars().filter(char::is_ascii_digit).collect();
        let Ok(value) = digits.parse::<u64>() else {
            continue;
        };
        if best.map_or(true, |(_, b)| value > b) {
            best = Some((url, value));
        }
    }
    best.map(|(url, _)| url.to_string())
}

/// Extract the first `url(...)` token from an inline style, quotes stripped.
fn first_css_url(style: &str) -> Option<String> {
    let start = style.find("url(")? + 4;
    let end = style[start..].find(')')? + start;
    let url = style[start..end].trim().trim_matches(|c| c == '"' || c == '\'');
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

/// Best-effort page title, sanitized for use as a directory name.
pub fn page_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let title_sel = Selector::parse("title").expect("valid selector");
    let title = document
        .select(&title_sel)
        .next()
        .map(|t| t.text().collect::<String>())
        .unwrap_or_default();
    let sanitized = sanitize_filename(title.trim());
    if sanitized.trim().is_empty() {
        "Unknown_Page".to_string()
    } else {
        sanitized
    }
}

/// Replace every character outside alphanumerics, space, `.` and `_` with
/// an underscore, keeping names safe across filesystems.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_img_src_extracted() {
        let refs = extract_references(r#"<html><body><img src="https://a.com/pic.jpg"></body></html>"#);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].url, "https://a.com/pic.jpg");
        assert_eq!(refs[0].origin, ReferenceOrigin::TagAttribute);
    }

    #[test]
    fn test_duplicate_sources_deduplicated() {
        let html = r#"
            <a href="https://a.com/pic.jpg"><img src="https://a.com/thumb.jpg"></a>
            <img src="https://a.com/pic.jpg">
            <meta property="og:image" content="https://a.com/pic.jpg">
        "#;
        let refs = extract_references(html);
        let urls: Vec<&str> = refs.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls.iter().filter(|u| **u == "https://a.com/pic.jpg").count(),
            1
        );
    }

    #[test]
    fn test_anchor_href_preferred_over_nested_img() {
        let html = r#"<a href="https://a.com/full.jpg"><img src="https://a.com/small.jpg"></a>"#;
        let refs = extract_references(html);
        let urls: Vec<&str> = refs.iter().map(|r| r.url.as_str()).collect();
        assert!(urls.contains(&"https://a.com/full.jpg"));
        // The nested thumbnail still surfaces through the standalone img walk.
        assert!(urls.contains(&"https://a.com/small.jpg"));
        assert_eq!(urls[0], "https://a.com/full.jpg");
    }

    #[test]
    fn test_non_image_anchor_falls_back_to_nested_img() {
        let html = r#"<a href="/gallery"><img src="https://a.com/pic.jpg"></a>"#;
        let refs = extract_references(html);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].url, "https://a.com/pic.jpg");
    }

    #[test]
    fn test_srcset_selects_max_descriptor() {
        let html = r#"<img srcset="a.jpg 320w, b.jpg 1024w">"#;
        let refs = extract_references(html);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].url, "b.jpg");
        assert_eq!(refs[0].origin, ReferenceOrigin::ResponsiveAttribute);
    }

    #[test]
    fn test_data_srcset_wins_over_srcset_and_src() {
        let html = r#"<img data-srcset="big.jpg 2048w" srcset="mid.jpg 1024w" src="small.jpg">"#;
        let refs = extract_references(html);
        assert_eq!(refs[0].url, "big.jpg");
    }

    #[test]
    fn test_picture_source_group() {
        let html = r#"<picture><source srcset="s.jpg 480w, l.jpg 1600w"><img src="fallback.jpg"></picture>"#;
        let refs = extract_references(html);
        let urls: Vec<&str> = refs.iter().map(|r| r.url.as_str()).collect();
        assert!(urls.contains(&"l.jpg"));
        assert!(urls.contains(&"fallback.jpg"));
    }

    #[test]
    fn test_og_image_metadata() {
        let html = r#"<head><meta property="og:image" content="https://a.com/og.png"></head>"#;
        let refs = extract_references(html);
        assert_eq!(refs[0].url, "https://a.com/og.png");
        assert_eq!(refs[0].origin, ReferenceOrigin::Metadata);
    }

    #[test]
    fn test_data_attribute_lazy_placeholder() {
        let html = r#"<div data-bg="https://a.com/lazy.webp">content</div>"#;
        let refs = extract_references(html);
        assert_eq!(refs[0].url, "https://a.com/lazy.webp");
    }

    #[test]
    fn test_background_image_style() {
        let html = r#"<div style="color: red; background-image: url('https://a.com/bg.jpg');"></div>"#;
        let refs = extract_references(html);
        assert_eq!(refs[0].url, "https://a.com/bg.jpg");
        assert_eq!(refs[0].origin, ReferenceOrigin::InlineStyle);
    }

    #[test]
    fn test_best_from_srcset() {
        assert_eq!(
            best_from_srcset("a.jpg 320w, b.jpg 1024w"),
            Some("b.jpg".to_string())
        );
        assert_eq!(
            best_from_srcset("a.jpg 2x, b.jpg 1x"),
            Some("a.jpg".to_string())
        );
        assert_eq!(best_from_srcset("a.jpg"), None);
        assert_eq!(best_from_srcset(""), None);
    }

    #[test]
    fn test_page_title_sanitized() {
        let title = page_title("<html><head><title> Hotel / Restaurant: Menu </title></head></html>");
        assert_eq!(title, "Hotel _ Restaurant_ Menu");
    }

    #[test]
    fn test_page_title_fallback() {
        assert_eq!(page_title("<html><body></body></html>"), "Unknown_Page");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("pic one.jpg"), "pic one.jpg");
        assert_eq!(sanitize_filename("a/b\\c:d.png"), "a_b_c_d.png");
    }
}
