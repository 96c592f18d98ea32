//! Text utilities for position conversion and document snapshots.
//!
//! Provides efficient byte offset <-> LSP position conversion with proper UTF-16 handling,
//! and the immutable [`TextDocument`] snapshot every other component reads from.

use std::ops::Range;
use std::sync::Arc;

use tower_lsp::lsp_types::{Position, Url};

/// Pre-computed line index for efficient position lookups.
///
/// LSP positions use line/column where column is in UTF-16 code units.
/// This struct pre-computes line start offsets for O(log n) lookup.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset where each line starts.
    line_starts: Vec<usize>,
    /// Source text (needed for UTF-16 column calculation).
    source: Arc<str>,
}

impl LineIndex {
    /// Build a line index from source text.
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        let source = source.into();
        let mut line_starts = vec![0];

        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }

        Self {
            line_starts,
            source,
        }
    }

    /// Get the source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Convert a byte offset to an LSP position.
    ///
    /// Uses binary search for O(log n) line lookup, then scans the line for UTF-16 column.
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };

        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.source.len());

        let mut col = 0u32;
        let line_slice = &self.source[line_start..line_end];

        for (i, c) in line_slice.char_indices() {
            if line_start + i >= offset {
                break;
            }
            col += c.len_utf16() as u32;
        }

        Position::new(line as u32, col)
    }

    /// Convert an LSP position to a byte offset.
    ///
    /// Returns None if the position is out of bounds.
    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        let line = position.line as usize;

        if line >= self.line_starts.len() {
            return None;
        }

        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .map(|&end| end.saturating_sub(1)) // Exclude newline
            .unwrap_or(self.source.len());

        let line_slice = &self.source[line_start..line_end];

        // Walk UTF-16 code units to find byte offset
        let mut utf16_col = 0u32;
        for (i, c) in line_slice.char_indices() {
            if utf16_col >= position.character {
                return Some(line_start + i);
            }
            utf16_col += c.len_utf16() as u32;
        }

        // Position is at or past end of line
        Some(line_end.min(self.source.len()))
    }

    /// Convert a byte span to an LSP range.
    pub fn span_to_range(&self, span: &Range<usize>) -> tower_lsp::lsp_types::Range {
        let start = self.offset_to_position(span.start);
        let end = self.offset_to_position(span.end);
        tower_lsp::lsp_types::Range::new(start, end)
    }
}

/// Immutable snapshot of one document version.
///
/// Host documents own their line index. Sub-documents synthesized for an
/// embedded region share the host's index: their text has identical byte
/// length and line breaks, so positions resolve exactly as in the host.
#[derive(Debug, Clone)]
pub struct TextDocument {
    uri: Url,
    language_id: String,
    version: i32,
    text: Arc<str>,
    line_index: Arc<LineIndex>,
}

impl TextDocument {
    /// Create a snapshot of a host document.
    pub fn new(uri: Url, language_id: impl Into<String>, version: i32, text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let line_index = Arc::new(LineIndex::new(Arc::clone(&text)));
        Self {
            uri,
            language_id: language_id.into(),
            version,
            text,
            line_index,
        }
    }

    /// Create a document whose positions resolve through another document's line index.
    pub(crate) fn with_line_index(
        uri: Url,
        language_id: impl Into<String>,
        version: i32,
        text: impl Into<Arc<str>>,
        line_index: Arc<LineIndex>,
    ) -> Self {
        let text = text.into();
        debug_assert!(text.len() <= line_index.source().len());
        Self {
            uri,
            language_id: language_id.into(),
            version,
            text,
            line_index,
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_index(&self) -> &Arc<LineIndex> {
        &self.line_index
    }

    /// Byte offset of a position, clamped to the end of the text.
    pub fn offset_at(&self, position: Position) -> usize {
        self.line_index
            .position_to_offset(position)
            .unwrap_or(self.text.len())
            .min(self.text.len())
    }

    pub fn position_at(&self, offset: usize) -> Position {
        self.line_index.offset_to_position(offset)
    }

    pub fn range_of(&self, span: &Range<usize>) -> tower_lsp::lsp_types::Range {
        self.line_index.span_to_range(span)
    }
}
