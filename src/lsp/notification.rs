//! Custom notifications sent to the preview renderer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_lsp::lsp_types::notification::Notification;

/// Content of a schema preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewPayload {
    pub label: String,
    pub value: Value,
}

/// Opens a preview for a region.
#[derive(Debug)]
pub enum OpenPreviewWebview {}

impl Notification for OpenPreviewWebview {
    type Params = PreviewPayload;
    const METHOD: &'static str = "amisJsonExtension/openPreviewWebview";
}

/// Refreshes the open preview after an edit.
#[derive(Debug)]
pub enum UpdatePreviewWebview {}

impl Notification for UpdatePreviewWebview {
    type Params = PreviewPayload;
    const METHOD: &'static str = "amisJsonExtension/updatePreviewWebview";
}
