//! Language modes and request routing.
//!
//! A [`LanguageMode`] answers editor requests for one language. The
//! [`LanguageModes`] router maps positions and ranges of a host document to
//! the mode owning them, using the region index read through the artifact
//! cache.

mod null;
pub mod patch;
pub mod preview;
pub mod schema_json;

use std::sync::Arc;

use serde_json::Value;
use tower_lsp::lsp_types::*;
use tracing::debug;

use crate::cache::LanguageModelCache;
use crate::document::{DocumentRegions, TextDocument};
use crate::error::{Error, Result};
use crate::settings::Settings;

pub use null::NullMode;
pub use preview::{CommandContext, PreviewSession, PreviewSink};
pub use schema_json::SchemaJsonMode;

/// Host language tags served by the null mode.
pub const HOST_LANGUAGE_IDS: &[&str] = &["typescript", "javascript", "typescriptreact", "javascriptreact"];

/// Optional operations a mode may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Validation,
    Completion,
    CompletionResolve,
    Hover,
    SignatureHelp,
    DocumentHighlight,
    DocumentSymbols,
    DocumentLinks,
    Definition,
    References,
    Formatting,
    DocumentColors,
    ColorPresentations,
    CodeActions,
    Commands,
}

/// Empty completion result.
pub fn null_completion() -> CompletionList {
    CompletionList {
        is_incomplete: false,
        items: Vec::new(),
    }
}

/// Empty signature help result.
pub fn null_signature() -> SignatureHelp {
    SignatureHelp {
        signatures: Vec::new(),
        active_signature: Some(0),
        active_parameter: Some(0),
    }
}

/// Handler for the requests of one language.
///
/// Every operation has a default returning the operation's null result.
/// [`LanguageMode::supports`] tells callers which operations are real.
#[tower_lsp::async_trait]
pub trait LanguageMode: Send + Sync {
    fn id(&self) -> &str;

    fn supports(&self, _capability: Capability) -> bool {
        false
    }

    fn configure(&self, _settings: &Settings) {}

    async fn do_validation(&self, _document: &Arc<TextDocument>) -> Result<Vec<Diagnostic>> {
        Ok(Vec::new())
    }

    async fn do_complete(
        &self,
        _document: &Arc<TextDocument>,
        _position: Position,
    ) -> Result<CompletionList> {
        Ok(null_completion())
    }

    async fn do_resolve(
        &self,
        _document: &Arc<TextDocument>,
        item: CompletionItem,
    ) -> Result<CompletionItem> {
        Ok(item)
    }

    async fn do_hover(
        &self,
        _document: &Arc<TextDocument>,
        _position: Position,
    ) -> Result<Option<Hover>> {
        Ok(None)
    }

    async fn do_signature_help(
        &self,
        _document: &Arc<TextDocument>,
        _position: Position,
    ) -> Result<SignatureHelp> {
        Ok(null_signature())
    }

    async fn find_document_highlight(
        &self,
        _document: &Arc<TextDocument>,
        _position: Position,
    ) -> Result<Vec<DocumentHighlight>> {
        Ok(Vec::new())
    }

    async fn find_document_symbols(
        &self,
        _document: &Arc<TextDocument>,
    ) -> Result<Vec<SymbolInformation>> {
        Ok(Vec::new())
    }

    async fn find_document_links(&self, _document: &Arc<TextDocument>) -> Result<Vec<DocumentLink>> {
        Ok(Vec::new())
    }

    async fn find_definition(
        &self,
        _document: &Arc<TextDocument>,
        _position: Position,
    ) -> Result<Vec<Location>> {
        Ok(Vec::new())
    }

    async fn find_references(
        &self,
        _document: &Arc<TextDocument>,
        _position: Position,
    ) -> Result<Vec<Location>> {
        Ok(Vec::new())
    }

    async fn format(
        &self,
        _document: &Arc<TextDocument>,
        _range: Range,
        _options: &FormattingOptions,
    ) -> Result<Vec<TextEdit>> {
        Ok(Vec::new())
    }

    async fn find_document_colors(
        &self,
        _document: &Arc<TextDocument>,
    ) -> Result<Vec<ColorInformation>> {
        Ok(Vec::new())
    }

    async fn color_presentations(
        &self,
        _document: &Arc<TextDocument>,
        _color: Color,
        _range: Range,
    ) -> Result<Vec<ColorPresentation>> {
        Ok(Vec::new())
    }

    async fn do_code_action(&self, _document: &Arc<TextDocument>, _range: Range) -> Result<Vec<Command>> {
        Ok(Vec::new())
    }

    /// Commands this mode executes.
    fn commands(&self) -> Vec<String> {
        Vec::new()
    }

    async fn execute_command(
        &self,
        command: &str,
        _arguments: Vec<Value>,
        _context: &CommandContext,
    ) -> Result<Option<Value>> {
        Err(Error::UnknownCommand(command.to_string()))
    }

    fn on_document_removed(&self, _uri: &Url) {}

    /// Release global state. Calling it more than once is a no-op.
    fn dispose(&self) {}
}

/// A sub-range of a request range together with its mode.
#[derive(Clone)]
pub struct LanguageModeRange {
    pub range: Range,
    pub language_id: String,
    pub region_index: Option<usize>,
    pub mode: Arc<dyn LanguageMode>,
}

/// Routes requests to the mode owning a position.
pub struct LanguageModes {
    regions: Arc<LanguageModelCache<DocumentRegions>>,
    /// Registration order is the fan-out order.
    modes: Vec<(String, Arc<dyn LanguageMode>)>,
}

impl LanguageModes {
    pub fn new(
        regions: Arc<LanguageModelCache<DocumentRegions>>,
        modes: Vec<(String, Arc<dyn LanguageMode>)>,
    ) -> Self {
        Self { regions, modes }
    }

    pub fn regions(&self) -> &Arc<LanguageModelCache<DocumentRegions>> {
        &self.regions
    }

    /// Mode registered for `language_id`.
    pub fn mode(&self, language_id: &str) -> Option<Arc<dyn LanguageMode>> {
        self.modes
            .iter()
            .find(|(id, _)| id == language_id)
            .map(|(_, mode)| Arc::clone(mode))
    }

    pub fn mode_at(
        &self,
        document: &Arc<TextDocument>,
        position: Position,
    ) -> Option<Arc<dyn LanguageMode>> {
        let regions = self.regions.get(document);
        let region = regions.region_at(position);
        let language_id = region.language_id();
        debug!(
            "mode at {}:{} is '{}'",
            position.line, position.character, language_id
        );
        self.mode(language_id)
    }

    /// Split `range` by language. Ranges whose language has no mode are left out.
    pub fn modes_in_range(&self, document: &Arc<TextDocument>, range: Range) -> Vec<LanguageModeRange> {
        self.regions
            .get(document)
            .regions_overlapping(range)
            .into_iter()
            .filter_map(|r| {
                let mode = self.mode(&r.language_id)?;
                Some(LanguageModeRange {
                    range: r.range,
                    language_id: r.language_id,
                    region_index: r.region_index,
                    mode,
                })
            })
            .collect()
    }

    /// Distinct modes of the languages present in `document`.
    pub fn all_modes_in_document(&self, document: &Arc<TextDocument>) -> Vec<Arc<dyn LanguageMode>> {
        let mut result: Vec<Arc<dyn LanguageMode>> = Vec::new();
        for language_id in self.regions.get(document).languages_present() {
            if let Some(mode) = self.mode(&language_id) {
                push_unique(&mut result, mode);
            }
        }
        result
    }

    /// Distinct registered modes in registration order.
    pub fn all_modes(&self) -> Vec<Arc<dyn LanguageMode>> {
        let mut result: Vec<Arc<dyn LanguageMode>> = Vec::new();
        for (_, mode) in &self.modes {
            push_unique(&mut result, Arc::clone(mode));
        }
        result
    }

    /// Whether any registered mode supports `capability`.
    pub fn supports(&self, capability: Capability) -> bool {
        self.modes.iter().any(|(_, mode)| mode.supports(capability))
    }

    pub fn commands(&self) -> Vec<String> {
        let mut commands = Vec::new();
        for mode in self.all_modes() {
            for command in mode.commands() {
                if !commands.contains(&command) {
                    commands.push(command);
                }
            }
        }
        commands
    }

    /// Mode executing `command`.
    pub fn command_mode(&self, command: &str) -> Option<Arc<dyn LanguageMode>> {
        self.all_modes()
            .into_iter()
            .find(|mode| mode.commands().iter().any(|c| c == command))
    }

    /// Reconfigure the cache and every mode once.
    pub fn configure(&self, settings: &Settings) {
        self.regions.configure(settings);
        for mode in self.all_modes() {
            mode.configure(settings);
        }
    }

    pub fn on_document_removed(&self, uri: &Url) {
        self.regions.on_document_removed(uri);
        for mode in self.all_modes() {
            mode.on_document_removed(uri);
        }
    }

    /// Dispose the cache and every mode once, however many tags it is bound to.
    pub fn dispose(&self) {
        self.regions.dispose();
        for mode in self.all_modes() {
            mode.dispose();
        }
    }
}

fn push_unique(modes: &mut Vec<Arc<dyn LanguageMode>>, mode: Arc<dyn LanguageMode>) {
    if !modes.iter().any(|m| Arc::ptr_eq(m, &mode)) {
        modes.push(mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheOptions;
    use crate::document::{RegionParser, AMIS_JSON_LANGUAGE_ID};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingMode {
        disposed: AtomicUsize,
        removed: AtomicUsize,
    }

    #[tower_lsp::async_trait]
    impl LanguageMode for CountingMode {
        fn id(&self) -> &str {
            "counting"
        }

        fn supports(&self, capability: Capability) -> bool {
            capability == Capability::Hover
        }

        fn on_document_removed(&self, _uri: &Url) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }

        fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    const SOURCE: &str = "const a = 1;\n/** amis */\nconst b = { type: 'page' };\n";

    fn router(mode: Arc<CountingMode>) -> LanguageModes {
        let settings = Settings::default();
        let regions = Arc::new(LanguageModelCache::new(
            Arc::new(RegionParser::new(&settings)),
            CacheOptions::default(),
        ));
        let null: Arc<dyn LanguageMode> = Arc::new(NullMode);
        let mode: Arc<dyn LanguageMode> = mode;
        LanguageModes::new(
            regions,
            vec![
                ("typescript".to_string(), null),
                (AMIS_JSON_LANGUAGE_ID.to_string(), Arc::clone(&mode)),
                ("amisjson-alias".to_string(), mode),
            ],
        )
    }

    fn document() -> Arc<TextDocument> {
        let uri = Url::parse("file:///src/page.ts").unwrap();
        Arc::new(TextDocument::new(uri, "typescript", 1, SOURCE))
    }

    #[test]
    fn routes_by_region() {
        let router = router(Arc::default());
        let doc = document();

        let host = router.mode_at(&doc, Position::new(0, 3)).unwrap();
        assert_eq!(host.id(), "");
        let embedded = router.mode_at(&doc, Position::new(2, 14)).unwrap();
        assert_eq!(embedded.id(), "counting");
    }

    #[test]
    fn splits_ranges() {
        let router = router(Arc::default());
        let doc = document();
        let ranges = router.modes_in_range(&doc, Range::new(Position::new(0, 0), Position::new(3, 0)));
        let ids: Vec<&str> = ranges.iter().map(|r| r.mode.id()).collect();
        assert_eq!(ids, vec!["", "counting", ""]);
        assert_eq!(ranges[1].region_index, Some(0));
    }

    #[test]
    fn modes_are_deduplicated() {
        let router = router(Arc::default());
        let doc = document();
        assert_eq!(router.all_modes().len(), 2);
        let ids: Vec<String> = router
            .all_modes_in_document(&doc)
            .iter()
            .map(|m| m.id().to_string())
            .collect();
        assert_eq!(ids, vec!["", "counting"]);
        assert!(router.supports(Capability::Hover));
        assert!(!router.supports(Capability::Formatting));
    }

    #[test]
    fn lifecycle_reaches_each_mode_once() {
        let mode = Arc::new(CountingMode::default());
        let router = router(Arc::clone(&mode));
        let doc = document();
        router.mode_at(&doc, Position::new(0, 0));
        assert_eq!(router.regions().len(), 1);

        router.on_document_removed(doc.uri());
        assert_eq!(mode.removed.load(Ordering::SeqCst), 1);
        assert!(router.regions().is_empty());

        router.dispose();
        router.dispose();
        assert_eq!(mode.disposed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_language_has_no_mode() {
        let router = router(Arc::default());
        assert!(router.mode("css").is_none());
    }
}
