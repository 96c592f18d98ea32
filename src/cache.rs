//! Versioned artifact cache keyed by document URI.
//!
//! Each cache memoizes one derived artifact per open document. An entry is
//! reused while its version is at least the requested one and its language tag
//! matches; otherwise the artifact is recomputed. Entries are evicted either
//! by capacity (least recently accessed first) or by a periodic age sweep.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower_lsp::lsp_types::Url;
use tracing::debug;

use crate::document::TextDocument;
use crate::settings::Settings;

/// Derives an artifact from a document snapshot.
///
/// `parse` must be total: malformed input produces a degraded artifact, never a panic.
pub trait DocumentParser<T>: Send + Sync {
    fn parse(&self, document: &Arc<TextDocument>) -> T;

    /// Called when the schema binding table changes.
    fn configure(&self, _settings: &Settings) {}
}

/// Capacity and age limits of a [`LanguageModelCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub max_entries: usize,
    /// Interval between age sweeps. Zero disables the sweep.
    pub cleanup_interval: Duration,
    /// Entries not accessed for longer than this are dropped by the sweep.
    pub ttl: Duration,
}

impl CacheOptions {
    /// Capacity of at least one entry.
    fn clamped(self) -> Self {
        Self {
            max_entries: self.max_entries.max(1),
            ..self
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_entries: 10,
            cleanup_interval: Duration::from_secs(60),
            ttl: Duration::from_secs(60),
        }
    }
}

struct CacheEntry<T> {
    artifact: Arc<T>,
    version: i32,
    language_id: String,
    last_access: Instant,
    /// Monotonic access stamp; breaks ties between equal `last_access` readings.
    access_seq: u64,
}

struct CacheState<T> {
    entries: HashMap<Url, CacheEntry<T>>,
    options: CacheOptions,
    clock: u64,
    /// Bumped by `configure` and `dispose`; artifacts parsed under an older
    /// generation are not stored.
    generation: u64,
}

impl<T> CacheState<T> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

struct CacheInner<T> {
    parser: Arc<dyn DocumentParser<T>>,
    state: Mutex<CacheState<T>>,
}

impl<T> CacheInner<T> {
    fn purge_older_than(&self, cutoff: Instant) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.last_access >= cutoff);
        let removed = before - state.entries.len();
        if removed > 0 {
            debug!("cache sweep dropped {} stale entries", removed);
        }
        removed
    }
}

/// Memoizes one artifact per document.
pub struct LanguageModelCache<T> {
    inner: Arc<CacheInner<T>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + Sync + 'static> LanguageModelCache<T> {
    /// Create a cache. The age sweep starts only when called inside a tokio runtime.
    pub fn new(parser: Arc<dyn DocumentParser<T>>, options: CacheOptions) -> Self {
        let options = options.clamped();
        let inner = Arc::new(CacheInner {
            parser,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                options,
                clock: 0,
                generation: 0,
            }),
        });
        let sweeper = spawn_sweeper(&inner, options);
        Self {
            inner,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Return the artifact for `document`, computing it if the cached entry is
    /// missing, older than the document, or for a different language tag.
    pub fn get(&self, document: &Arc<TextDocument>) -> Arc<T> {
        let generation = {
            let mut state = self.inner.state.lock();
            let seq = state.tick();
            if let Some(entry) = state.entries.get_mut(document.uri()) {
                if entry.version >= document.version()
                    && entry.language_id == document.language_id()
                {
                    entry.last_access = Instant::now();
                    entry.access_seq = seq;
                    debug!(uri = %document.uri(), version = entry.version, "cache hit");
                    return Arc::clone(&entry.artifact);
                }
            }
            state.generation
        };

        debug!(uri = %document.uri(), version = document.version(), "cache miss");
        let artifact = Arc::new(self.inner.parser.parse(document));
        self.insert(document, Arc::clone(&artifact), generation);
        artifact
    }

    /// Look up an entry without computing or refreshing it.
    pub fn get_by_uri(&self, uri: &Url) -> Option<Arc<T>> {
        let state = self.inner.state.lock();
        state.entries.get(uri).map(|e| Arc::clone(&e.artifact))
    }

    /// Recompute the entry for `document` if one exists.
    pub fn update(&self, document: &Arc<TextDocument>) {
        let generation = {
            let state = self.inner.state.lock();
            state
                .entries
                .contains_key(document.uri())
                .then_some(state.generation)
        };
        if let Some(generation) = generation {
            let artifact = Arc::new(self.inner.parser.parse(document));
            self.insert(document, artifact, generation);
        }
    }

    pub fn on_document_removed(&self, uri: &Url) {
        self.inner.state.lock().entries.remove(uri);
    }

    /// Drop every entry and hand the new settings to the parser.
    pub fn configure(&self, settings: &Settings) {
        self.inner.parser.configure(settings);
        let options = settings.cache.options().clamped();
        let restart = {
            let mut state = self.inner.state.lock();
            state.entries.clear();
            state.generation += 1;
            let restart = state.options != options;
            state.options = options;
            restart
        };
        if restart {
            let sweeper = spawn_sweeper(&self.inner, options);
            if let Some(old) = std::mem::replace(&mut *self.sweeper.lock(), sweeper) {
                old.abort();
            }
        }
    }

    /// Stop the age sweep and drop every entry.
    pub fn dispose(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
        let mut state = self.inner.state.lock();
        state.entries.clear();
        state.generation += 1;
    }

    /// Drop entries last accessed before `cutoff`. Returns how many were removed.
    pub fn purge_older_than(&self, cutoff: Instant) -> usize {
        self.inner.purge_older_than(cutoff)
    }

    pub fn options(&self) -> CacheOptions {
        self.inner.state.lock().options
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, document: &TextDocument, artifact: Arc<T>, generation: u64) {
        let mut state = self.inner.state.lock();
        if state.generation != generation {
            debug!(uri = %document.uri(), "cache reconfigured during parse, result not stored");
            return;
        }
        let seq = state.tick();

        if let Some(existing) = state.entries.get(document.uri()) {
            // A concurrent request already stored a newer snapshot.
            if existing.version > document.version()
                && existing.language_id == document.language_id()
            {
                return;
            }
        } else if state.entries.len() >= state.options.max_entries {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.access_seq)
                .map(|(uri, _)| uri.clone());
            if let Some(uri) = oldest {
                debug!(%uri, "cache full, evicting least recently used entry");
                state.entries.remove(&uri);
            }
        }

        state.entries.insert(
            document.uri().clone(),
            CacheEntry {
                artifact,
                version: document.version(),
                language_id: document.language_id().to_string(),
                last_access: Instant::now(),
                access_seq: seq,
            },
        );
    }
}

impl<T> Drop for LanguageModelCache<T> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
    }
}

fn spawn_sweeper<T: Send + Sync + 'static>(
    inner: &Arc<CacheInner<T>>,
    options: CacheOptions,
) -> Option<JoinHandle<()>> {
    if options.cleanup_interval.is_zero() {
        return None;
    }
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    let weak: Weak<CacheInner<T>> = Arc::downgrade(inner);
    let interval = options.cleanup_interval;

    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            let ttl = inner.state.lock().options.ttl;
            if let Some(cutoff) = Instant::now().checked_sub(ttl) {
                inner.purge_older_than(cutoff);
            }
        }
    }))
}
