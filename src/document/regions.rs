//! Region index over one document snapshot.

use std::sync::Arc;

use tower_lsp::lsp_types::{Position, Range, Url};

use super::region::EmbeddedRegion;
use super::text::TextDocument;

/// A sub-range of a query range owned by one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageRange {
    pub range: Range,
    pub language_id: String,
    /// Index of the embedded region, `None` for host-language ranges.
    pub region_index: Option<usize>,
}

/// Result of a position lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionAt<'a> {
    /// The position lies inside an embedded region.
    Embedded {
        index: usize,
        region: &'a EmbeddedRegion,
    },
    /// The position belongs to the host language. The fill region spans from
    /// the end of the last preceding embedded region to the end of the document.
    Host(EmbeddedRegion),
}

impl RegionAt<'_> {
    pub fn region(&self) -> &EmbeddedRegion {
        match self {
            RegionAt::Embedded { region, .. } => region,
            RegionAt::Host(region) => region,
        }
    }

    pub fn language_id(&self) -> &str {
        &self.region().language_id
    }

    /// Embedded region index, `None` in the host language.
    pub fn index(&self) -> Option<usize> {
        match self {
            RegionAt::Embedded { index, .. } => Some(*index),
            RegionAt::Host(_) => None,
        }
    }
}

/// The embedded regions of one document version, in ascending order.
///
/// Every query answers against the snapshot the index was built from.
#[derive(Debug, Clone)]
pub struct DocumentRegions {
    document: Arc<TextDocument>,
    regions: Vec<EmbeddedRegion>,
}

impl DocumentRegions {
    pub fn new(document: Arc<TextDocument>, mut regions: Vec<EmbeddedRegion>) -> Self {
        regions.sort_by_key(|r| r.start);
        Self { document, regions }
    }

    pub fn document(&self) -> &Arc<TextDocument> {
        &self.document
    }

    pub fn regions(&self) -> &[EmbeddedRegion] {
        &self.regions
    }

    pub fn region(&self, index: usize) -> Option<&EmbeddedRegion> {
        self.regions.get(index)
    }

    /// Language tag of the host document.
    pub fn host_language(&self) -> &str {
        self.document.language_id()
    }

    /// Range covering the whole document.
    pub fn full_range(&self) -> Range {
        Range::new(
            Position::new(0, 0),
            self.document.position_at(self.document.text().len()),
        )
    }

    /// Split `range` into alternating host and embedded sub-ranges.
    pub fn regions_overlapping(&self, range: Range) -> Vec<LanguageRange> {
        let doc = &self.document;
        let mut result = Vec::new();
        let mut current_pos = range.start;
        let mut current_offset = doc.offset_at(range.start);
        let end_offset = doc.offset_at(range.end);

        for (index, region) in self.regions.iter().enumerate() {
            if region.end > current_offset && region.start < end_offset {
                let start = region.start.max(current_offset);
                let start_pos = doc.position_at(start);
                if current_offset < region.start {
                    result.push(LanguageRange {
                        range: Range::new(current_pos, start_pos),
                        language_id: self.host_language().to_string(),
                        region_index: None,
                    });
                }
                let end = region.end.min(end_offset);
                let end_pos = doc.position_at(end);
                if end > region.start {
                    result.push(LanguageRange {
                        range: Range::new(start_pos, end_pos),
                        language_id: region.language_id.clone(),
                        region_index: Some(index),
                    });
                }
                current_offset = end;
                current_pos = end_pos;
            }
        }

        if current_offset < end_offset {
            result.push(LanguageRange {
                range: Range::new(current_pos, range.end),
                language_id: self.host_language().to_string(),
                region_index: None,
            });
        }
        result
    }

    /// The region owning `position`, or the host fill region.
    pub fn region_at(&self, position: Position) -> RegionAt<'_> {
        let offset = self.document.offset_at(position);
        let mut fill_start = 0;
        for (index, region) in self.regions.iter().enumerate() {
            if region.start > offset {
                break;
            }
            if offset <= region.end {
                return RegionAt::Embedded { index, region };
            }
            fill_start = region.end;
        }
        RegionAt::Host(EmbeddedRegion::host(
            fill_start,
            self.document.text().len(),
            self.host_language(),
        ))
    }

    /// Index of the embedded region containing `position`.
    pub fn region_index(&self, position: Position) -> Option<usize> {
        self.region_at(position).index()
    }

    /// Standalone document for the region owning `position`.
    pub fn sub_document_at(&self, position: Position) -> TextDocument {
        match self.region_at(position) {
            RegionAt::Embedded { index, region } => self.sub_document(index, region),
            RegionAt::Host(region) => self.sub_document(self.regions.len(), &region),
        }
    }

    /// Standalone document for the embedded region at `index`.
    pub fn sub_document_at_index(&self, index: usize) -> Option<TextDocument> {
        let region = self.regions.get(index)?;
        Some(self.sub_document(index, region))
    }

    fn sub_document(&self, index: usize, region: &EmbeddedRegion) -> TextDocument {
        TextDocument::with_line_index(
            sub_document_uri(self.document.uri(), &region.language_id, index),
            region.language_id.clone(),
            self.document.version(),
            region.masked_text(self.document.text()),
            Arc::clone(self.document.line_index()),
        )
    }

    /// Distinct language tags in the document, host language first.
    pub fn languages_present(&self) -> Vec<String> {
        let mut result = vec![self.host_language().to_string()];
        for region in &self.regions {
            if !result.contains(&region.language_id) {
                result.push(region.language_id.clone());
            }
        }
        result
    }

    /// Scripts imported by the host document. Host imports are not analysed.
    pub fn imported_scripts(&self) -> Vec<String> {
        Vec::new()
    }
}

/// `file:///a/page.ts` -> `file:///a/page.amisjson.0.ts`.
pub fn sub_document_uri(uri: &Url, language_id: &str, index: usize) -> Url {
    let path = uri.path();
    let (dir, file) = match path.rfind('/') {
        Some(slash) => path.split_at(slash + 1),
        None => ("", path),
    };
    let file = match file.rfind('.') {
        Some(dot) if dot > 0 => {
            let (stem, ext) = file.split_at(dot);
            format!("{stem}.{language_id}.{index}{ext}")
        }
        _ => format!("{file}.{language_id}.{index}"),
    };
    let mut derived = uri.clone();
    derived.set_path(&format!("{dir}{file}"));
    derived
}
