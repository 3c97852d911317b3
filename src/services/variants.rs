//! URL variant generation.
//!
//! Thumbnail CDNs bury the full-resolution asset behind predictable path
//! conventions (`/thumb/640x480/`, `?width=320`, `/800x600/`). Given one
//! discovered image URL this module produces the ordered list of candidate
//! URLs that plausibly point at the same asset at full quality. Pure string
//! work, no I/O; the resolver decides which candidate actually exists.

use url::Url;

/// Ordered, deduplicated candidate URLs for one reference, most-upgraded
/// first. The untransformed input is always the last element.
pub fn variant_urls(raw: &str) -> Vec<String> {
    let parsed = match Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return vec![raw.to_string()],
    };

    let segments: Vec<String> = parsed
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    // Branch on the first thumb/thumbs segment: one candidate substitutes
    // an uploads segment, one drops the segment entirely. Both are kept.
    let mut segment_branches: Vec<Vec<String>> = Vec::new();
    if let Some(idx) = segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case("thumb") || s.eq_ignore_ascii_case("thumbs"))
    {
        let end = if segments.get(idx + 1).is_some_and(|s| is_dimension_segment(s)) {
            idx + 2
        } else {
            idx + 1
        };

        let mut substituted = segments.clone();
        substituted.drain(idx..end);
        substituted.insert(idx, "uploads".to_string());
        segment_branches.push(substituted);

        let mut removed = segments.clone();
        removed.drain(idx..end);
        segment_branches.push(removed);
    }
    segment_branches.push(segments);

    let mut candidates = Vec::new();
    for branch in segment_branches {
        let cleaned: Vec<&str> = branch
            .iter()
            .map(String::as_str)
            .filter(|s| !is_dimension_segment(s))
            .collect();

        let mut candidate = parsed.clone();
        candidate.set_path(&format!("/{}", cleaned.join("/")));
        strip_dimension_params(&mut candidate);
        candidates.push(candidate.to_string());
    }

    // Dedup preserving order, original last.
    let mut out: Vec<String> = Vec::new();
    for candidate in candidates {
        if candidate != raw && !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out.push(raw.to_string());
    out
}

/// Lossless/preferred-format siblings of a candidate URL (same path,
/// different extension), best first. The caller probes these for existence
/// before falling back to the candidate itself; this stays pure.
pub fn lossless_siblings(candidate: &str) -> Vec<String> {
    let parsed = match Url::parse(candidate) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };
    let path = parsed.path();
    let lower = path.to_ascii_lowercase();
    if !lower.ends_with(".webp") {
        return Vec::new();
    }
    let stem = &path[..path.len() - ".webp".len()];
    ["jpeg", "jpg"]
        .iter()
        .map(|ext| {
            let mut sibling = parsed.clone();
            sibling.set_path(&format!("{stem}.{ext}"));
            sibling.to_string()
        })
        .collect()
}

/// A bare `<digits>x<digits>` path segment, e.g. `640x480`.
fn is_dimension_segment(segment: &str) -> bool {
    match segment.split_once(['x', 'X']) {
        Some((w, h)) => {
            !w.is_empty()
                && !h.is_empty()
                && w.bytes().all(|b| b.is_ascii_digit())
                && h.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Drop `width`/`height` query parameters (case-insensitive), keeping every
/// other parameter in its original order.
fn strip_dimension_params(url: &mut Url) {
    if url.query().is_none() {
        return;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            k != "width" && k != "height"
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept).finish();
    }
}
