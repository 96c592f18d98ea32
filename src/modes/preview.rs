//! Schema preview sessions.
//!
//! A preview follows one region of one document. While it is active, every
//! change to that document re-renders the region and pushes an update to the
//! preview sink. At most one preview is active; starting another replaces it.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::Url;
use tracing::{debug, info, warn};

use crate::document::{DocumentEvent, DocumentStore, TextDocument};
use crate::error::Result;
use crate::lsp::{OpenPreviewWebview, PreviewPayload, UpdatePreviewWebview};

/// Receives preview content.
#[tower_lsp::async_trait]
pub trait PreviewSink: Send + Sync {
    async fn open_preview(&self, payload: PreviewPayload);
    async fn update_preview(&self, payload: PreviewPayload);
}

#[tower_lsp::async_trait]
impl PreviewSink for tower_lsp::Client {
    async fn open_preview(&self, payload: PreviewPayload) {
        self.send_notification::<OpenPreviewWebview>(payload).await;
    }

    async fn update_preview(&self, payload: PreviewPayload) {
        self.send_notification::<UpdatePreviewWebview>(payload).await;
    }
}

/// What a command needs from the server.
#[derive(Clone)]
pub struct CommandContext {
    pub documents: Arc<DocumentStore>,
    pub sink: Arc<dyn PreviewSink>,
}

/// Renders the previewed region of a document snapshot.
pub type PreviewRenderer = Arc<dyn Fn(&Arc<TextDocument>) -> Result<PreviewPayload> + Send + Sync>;

struct ActivePreview {
    uri: Url,
    task: JoinHandle<()>,
}

/// The active preview subscription, if any.
#[derive(Default)]
pub struct PreviewSession {
    active: Mutex<Option<ActivePreview>>,
}

impl PreviewSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow changes to `uri`, replacing any active preview.
    pub fn start(
        &self,
        uri: Url,
        mut changes: broadcast::Receiver<DocumentEvent>,
        render: PreviewRenderer,
        sink: Arc<dyn PreviewSink>,
    ) {
        let watched = uri.clone();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(DocumentEvent::Changed(document)) if document.uri() == &watched => {
                        match render(&document) {
                            Ok(payload) => sink.update_preview(payload).await,
                            Err(e) => debug!("preview not updated: {}", e),
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("preview missed {} document events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        info!("preview started for {}", uri);
        if let Some(previous) = self.active.lock().replace(ActivePreview { uri, task }) {
            debug!("replacing preview of {}", previous.uri);
            previous.task.abort();
        }
    }

    /// Drop the active preview. Returns whether one was active.
    pub fn stop(&self) -> bool {
        match self.active.lock().take() {
            Some(previous) => {
                info!("preview ended for {}", previous.uri);
                previous.task.abort();
                true
            }
            None => false,
        }
    }

    /// URI of the previewed document.
    pub fn active_uri(&self) -> Option<Url> {
        self.active.lock().as_ref().map(|active| active.uri.clone())
    }
}

impl Drop for PreviewSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.task.abort();
        }
    }
}
