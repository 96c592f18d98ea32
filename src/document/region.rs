//! Embedded region model for schema-governed JSON inside host documents.
//!
//! A region is the byte span of one annotated object literal. Its sub-document
//! text is the host text with everything before the region masked by spaces,
//! so offsets and line/column positions inside the region are unchanged.

use std::ops::Range;

/// Language tag of schema-governed JSON regions.
pub const AMIS_JSON_LANGUAGE_ID: &str = "amisjson";

/// Classification of a region.
///
/// Schema-governed regions are always [`RegionType::Custom`]; the host
/// fill region returned for positions outside any region is [`RegionType::Script`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionType {
    Template,
    Script,
    Style,
    Custom,
}

/// A byte range together with the text it denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub range: Range<usize>,
    pub value: String,
}

/// One object property whose value a strict JSON parser cannot represent.
///
/// Covers shorthand like `{ type: page }` or `{ label: 'x' }`. The record is
/// used after JSON parsing to attach a synthetic string value to the property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyCorrection {
    /// Span of the whole `key: value` pair.
    pub range: Range<usize>,
    /// Key span and raw key text.
    pub key: TextSpan,
    /// Span of the value token (quotes included) and its unquoted content.
    pub value: TextSpan,
}

/// A contiguous span of a host document that belongs to another language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedRegion {
    pub start: usize,
    pub end: usize,
    pub language_id: String,
    pub region_type: RegionType,
    /// Annotation label that bound this region, e.g. `amis`.
    pub schema: Option<String>,
    /// Schema location the label resolved to when the region was parsed.
    pub schema_uri: Option<String>,
    /// Precomputed masked text, `end` bytes long.
    pub text: Option<String>,
    pub meta: Vec<PropertyCorrection>,
    /// Span of the annotation comment.
    pub annotation: Option<Range<usize>>,
}

impl EmbeddedRegion {
    /// Build a host-language fill region covering `start..end`.
    pub fn host(start: usize, end: usize, language_id: impl Into<String>) -> Self {
        Self {
            start,
            end,
            language_id: language_id.into(),
            region_type: RegionType::Script,
            schema: None,
            schema_uri: None,
            text: None,
            meta: Vec::new(),
            annotation: None,
        }
    }

    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Whether `offset` lies within the region, both ends inclusive.
    ///
    /// The end is inclusive so a cursor right after the closing brace still
    /// resolves to the region.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    pub fn is_embedded(&self) -> bool {
        self.region_type == RegionType::Custom
    }

    /// Sub-document text for this region against its host text.
    pub fn masked_text(&self, host: &str) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => mask_prefix(host, self.start, self.end),
        }
    }
}

/// Mask `text[..start]` and append the verbatim slice `text[start..end]`.
///
/// Every masked character becomes as many spaces as its UTF-8 length; line
/// breaks are kept. The result is exactly `end` bytes long. Bounds are clamped
/// to the text and snapped back to character boundaries.
pub fn mask_prefix(text: &str, start: usize, end: usize) -> String {
    let end = floor_char_boundary(text, end.min(text.len()));
    let start = floor_char_boundary(text, start.min(end));

    let mut out = String::with_capacity(end);
    for c in text[..start].chars() {
        match c {
            '\n' | '\r' => out.push(c),
            _ => {
                for _ in 0..c.len_utf8() {
                    out.push(' ');
                }
            }
        }
    }
    out.push_str(&text[start..end]);
    out
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
