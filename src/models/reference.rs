use serde::{Deserialize, Serialize};

/// Where on the page a raw image reference was discovered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceOrigin {
    /// `<img src>` or an anchor href wrapping an image.
    TagAttribute,
    /// `background-image: url(...)` in an inline style.
    InlineStyle,
    /// `srcset` / `data-srcset` descriptor lists.
    ResponsiveAttribute,
    /// `<meta property="og:image">`.
    Metadata,
    /// `<picture>` / `<source>` responsive groups.
    StructuredSource,
}

/// A raw candidate image URL discovered on a page, before resolution.
/// Transient within one job's extraction phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageReference {
    pub url: String,
    pub origin: ReferenceOrigin,
}

impl ImageReference {
    pub fn new(url: impl Into<String>, origin: ReferenceOrigin) -> Self {
        Self {
            url: url.into(),
            origin,
        }
    }
}

/// Whether a string plausibly points at an image asset. Substring match
/// rather than suffix match, so query strings and CDN suffixes after the
/// extension still qualify.
pub fn looks_like_image(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    [".jpg", ".jpeg", ".png", ".webp"]
        .iter()
        .any(|ext| lower.contains(ext))
}
