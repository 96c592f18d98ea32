//! Open-document storage and change notifications.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tower_lsp::lsp_types::Url;

use super::text::TextDocument;

/// Buffered events per subscriber before it starts lagging.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A change to the set of open documents.
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    /// A document was opened or its content changed.
    Changed(Arc<TextDocument>),
    /// A document was closed.
    Closed(Url),
}

impl DocumentEvent {
    pub fn uri(&self) -> &Url {
        match self {
            DocumentEvent::Changed(document) => document.uri(),
            DocumentEvent::Closed(uri) => uri,
        }
    }
}

/// Thread-safe storage for open documents.
#[derive(Debug)]
pub struct DocumentStore {
    documents: DashMap<Url, Arc<TextDocument>>,
    changes: broadcast::Sender<DocumentEvent>,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore {
    /// Create a new empty document store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            documents: DashMap::new(),
            changes,
        }
    }

    /// Open or update a document with the given source text.
    pub fn open(
        &self,
        uri: Url,
        language_id: impl Into<String>,
        version: i32,
        text: String,
    ) -> Arc<TextDocument> {
        let document = Arc::new(TextDocument::new(uri.clone(), language_id, version, text));
        self.documents.insert(uri, Arc::clone(&document));
        // No subscribers is not an error.
        let _ = self.changes.send(DocumentEvent::Changed(Arc::clone(&document)));
        document
    }

    /// Replace the text of an open document, keeping its language tag.
    ///
    /// Returns `None` if the document is not open.
    pub fn change(&self, uri: &Url, version: i32, text: String) -> Option<Arc<TextDocument>> {
        let language_id = self.documents.get(uri)?.language_id().to_string();
        Some(self.open(uri.clone(), language_id, version, text))
    }

    /// Close a document.
    pub fn close(&self, uri: &Url) {
        if self.documents.remove(uri).is_some() {
            let _ = self.changes.send(DocumentEvent::Closed(uri.clone()));
        }
    }

    /// Get a document's latest snapshot.
    pub fn get(&self, uri: &Url) -> Option<Arc<TextDocument>> {
        self.documents.get(uri).map(|r| Arc::clone(&r))
    }

    /// Snapshots of every open document.
    pub fn all(&self) -> Vec<Arc<TextDocument>> {
        self.documents.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Subscribe to document changes. Dropping the receiver ends the subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.changes.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }
}
