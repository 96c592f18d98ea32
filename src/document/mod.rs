//! Document state management and text utilities.
//!
//! This module provides:
//! - `LineIndex` and `TextDocument` for snapshots and position conversion
//! - `EmbeddedRegion` and the tree-sitter region parser
//! - `DocumentRegions`, the per-snapshot region index
//! - `DocumentStore` for document lifecycle and change subscriptions

pub mod parser;
mod region;
mod regions;
mod state;
mod text;

pub use parser::{parse_regions, HostDialect, RegionParser};
pub use region::{
    mask_prefix, EmbeddedRegion, PropertyCorrection, RegionType, TextSpan, AMIS_JSON_LANGUAGE_ID,
};
pub use regions::{sub_document_uri, DocumentRegions, LanguageRange, RegionAt};
pub use state::{DocumentEvent, DocumentStore};
pub use text::{LineIndex, TextDocument};
