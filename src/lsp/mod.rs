//! LSP protocol feature implementations.
//!
//! This module provides:
//! - Hover content built from schema annotations
//! - Completion item builders for keys and values
//! - Diagnostics conversion from JSON syntax errors
//! - Custom preview notifications

mod completion;
mod diagnostics;
mod hover;
mod notification;

pub use completion::{current_word_start, property_item, schema_value_items, value_item};
pub use diagnostics::{syntax_diagnostics, DIAGNOSTIC_SOURCE};
pub use hover::{markdown_hover, schema_hover_markdown};
pub use notification::{OpenPreviewWebview, PreviewPayload, UpdatePreviewWebview};
