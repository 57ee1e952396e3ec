//! Content negotiation between the client's `Accept` header and the
//! representations a route can produce.
//!
//! Quality values are not ranked. A range with `q=0` is dropped, every other
//! range counts as acceptable and the server's own order decides. Explicit
//! `type/subtype` matches win over `type/*`, which win over `*/*`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Response representations the gateway knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "text/html")]
    Html,
    #[serde(rename = "application/json")]
    Json,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Html => "text/html",
            ContentType::Json => "application/json",
        }
    }

    fn parts(&self) -> (&'static str, &'static str) {
        match self {
            ContentType::Html => ("text", "html"),
            ContentType::Json => ("application", "json"),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How specifically a media range matched a content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Specificity {
    Any,
    Subtype,
    Exact,
}

/// A single parsed media range such as `text/*` or `application/json`.
struct MediaRange<'a> {
    kind: &'a str,
    subtype: &'a str,
}

impl<'a> MediaRange<'a> {
    fn parse(raw: &'a str) -> Option<Self> {
        let mut params = raw.split(';');
        let essence = params.next()?.trim();

        // q=0 means "not acceptable"
        for param in params {
            if let Some((key, value)) = param.split_once('=') {
                if key.trim().eq_ignore_ascii_case("q") {
                    if let Ok(q) = value.trim().parse::<f32>() {
                        if q <= 0.0 {
                            return None;
                        }
                    }
                }
            }
        }

        let (kind, subtype) = essence.split_once('/')?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() {
            return None;
        }
        Some(Self { kind, subtype })
    }

    fn matches(&self, content_type: ContentType) -> Option<Specificity> {
        let (kind, subtype) = content_type.parts();
        if self.kind == "*" && self.subtype == "*" {
            return Some(Specificity::Any);
        }
        if !self.kind.eq_ignore_ascii_case(kind) {
            return None;
        }
        if self.subtype == "*" {
            return Some(Specificity::Subtype);
        }
        self.subtype
            .eq_ignore_ascii_case(subtype)
            .then_some(Specificity::Exact)
    }
}

fn media_ranges(accept: &str) -> Vec<MediaRange<'_>> {
    accept.split(',').filter_map(MediaRange::parse).collect()
}

/// Returns how well the best range in `ranges` matches `content_type`.
fn best_match(ranges: &[MediaRange<'_>], content_type: ContentType) -> Option<Specificity> {
    ranges.iter().filter_map(|r| r.matches(content_type)).max()
}

fn is_blank(accept: Option<&str>) -> bool {
    accept.is_none_or(|a| a.trim().is_empty())
}

/// Pick the representation to produce for this request.
///
/// Falls back to the first entry of `supported` when the header is missing,
/// is `*/*`, or matches nothing. `supported` must not be empty.
pub fn select_best_content_type(accept: Option<&str>, supported: &[ContentType]) -> ContentType {
    let default = supported.first().copied().unwrap_or(ContentType::Json);
    let Some(accept) = accept.filter(|_| !is_blank(accept)) else {
        return default;
    };

    let ranges = media_ranges(accept);
    let mut best: Option<(Specificity, ContentType)> = None;
    for &candidate in supported {
        if let Some(rank) = best_match(&ranges, candidate) {
            // Strictly greater keeps the server's order among equal matches
            if best.is_none_or(|(current, _)| rank > current) {
                best = Some((rank, candidate));
            }
        }
    }

    best.map(|(_, ct)| ct).unwrap_or(default)
}

/// Whether the client accepts at least one of `supported`.
///
/// A missing or empty header accepts anything.
pub fn accepts_any(accept: Option<&str>, supported: &[ContentType]) -> bool {
    let Some(accept) = accept.filter(|_| !is_blank(accept)) else {
        return true;
    };
    let ranges = media_ranges(accept);
    supported.iter().any(|&ct| best_match(&ranges, ct).is_some())
}
