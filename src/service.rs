//! Request dispatch over the language modes.
//!
//! Position requests go to the mode owning the position. Document-wide
//! requests fan out to every distinct mode present in the document and
//! concatenate the results in mode order. A failing mode yields its null
//! result and a warning; it never fails the request.

use std::fmt::Display;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tower_lsp::lsp_types::*;
use tracing::{debug, warn};

use crate::document::TextDocument;
use crate::error::{Error, Result};
use crate::modes::{
    null_completion, Capability, CommandContext, LanguageMode, LanguageModes,
};
use crate::settings::Settings;

pub struct LanguageService {
    modes: LanguageModes,
}

impl LanguageService {
    pub fn new(modes: LanguageModes) -> Self {
        Self { modes }
    }

    pub fn modes(&self) -> &LanguageModes {
        &self.modes
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.modes.supports(capability)
    }

    pub fn configure(&self, settings: &Settings) {
        self.modes.configure(settings);
    }

    pub fn on_document_removed(&self, uri: &Url) {
        self.modes.on_document_removed(uri);
    }

    pub fn dispose(&self) {
        self.modes.dispose();
    }

    fn mode_at(
        &self,
        document: &Arc<TextDocument>,
        position: Position,
        capability: Capability,
    ) -> Option<Arc<dyn LanguageMode>> {
        self.modes
            .mode_at(document, position)
            .filter(|mode| mode.supports(capability))
    }

    fn modes_in_document(
        &self,
        document: &Arc<TextDocument>,
        capability: Capability,
    ) -> Vec<Arc<dyn LanguageMode>> {
        self.modes
            .all_modes_in_document(document)
            .into_iter()
            .filter(|mode| mode.supports(capability))
            .collect()
    }

    pub async fn do_validation(&self, document: &Arc<TextDocument>) -> Vec<Diagnostic> {
        let modes = self.modes_in_document(document, Capability::Validation);
        let results = join_all(modes.iter().map(|mode| mode.do_validation(document))).await;
        concat("validation", document.uri(), results)
    }

    pub async fn do_complete(&self, document: &Arc<TextDocument>, position: Position) -> CompletionList {
        let Some(mode) = self.mode_at(document, position, Capability::Completion) else {
            return null_completion();
        };
        settle("completion", document.uri(), mode.do_complete(document, position).await)
            .unwrap_or_else(null_completion)
    }

    /// Resolve an item with the mode named by its `data.languageId`.
    pub async fn do_resolve(&self, document: &Arc<TextDocument>, item: CompletionItem) -> CompletionItem {
        let language_id = item
            .data
            .as_ref()
            .and_then(|data| data.get("languageId"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let Some(mode) = language_id
            .and_then(|id| self.modes.mode(&id))
            .filter(|mode| mode.supports(Capability::CompletionResolve))
        else {
            return item;
        };
        let fallback = item.clone();
        settle("completion resolve", document.uri(), mode.do_resolve(document, item).await)
            .unwrap_or(fallback)
    }

    pub async fn do_hover(&self, document: &Arc<TextDocument>, position: Position) -> Option<Hover> {
        let mode = self.mode_at(document, position, Capability::Hover)?;
        settle("hover", document.uri(), mode.do_hover(document, position).await).flatten()
    }

    pub async fn do_signature_help(
        &self,
        document: &Arc<TextDocument>,
        position: Position,
    ) -> Option<SignatureHelp> {
        let mode = self.mode_at(document, position, Capability::SignatureHelp)?;
        settle(
            "signature help",
            document.uri(),
            mode.do_signature_help(document, position).await,
        )
        .filter(|help| !help.signatures.is_empty())
    }

    pub async fn find_document_highlight(
        &self,
        document: &Arc<TextDocument>,
        position: Position,
    ) -> Vec<DocumentHighlight> {
        let Some(mode) = self.mode_at(document, position, Capability::DocumentHighlight) else {
            return Vec::new();
        };
        settle(
            "document highlight",
            document.uri(),
            mode.find_document_highlight(document, position).await,
        )
        .unwrap_or_default()
    }

    pub async fn find_definition(&self, document: &Arc<TextDocument>, position: Position) -> Vec<Location> {
        let Some(mode) = self.mode_at(document, position, Capability::Definition) else {
            return Vec::new();
        };
        settle("definition", document.uri(), mode.find_definition(document, position).await)
            .unwrap_or_default()
    }

    pub async fn find_references(&self, document: &Arc<TextDocument>, position: Position) -> Vec<Location> {
        let Some(mode) = self.mode_at(document, position, Capability::References) else {
            return Vec::new();
        };
        settle("references", document.uri(), mode.find_references(document, position).await)
            .unwrap_or_default()
    }

    pub async fn find_document_symbols(&self, document: &Arc<TextDocument>) -> Vec<SymbolInformation> {
        let modes = self.modes_in_document(document, Capability::DocumentSymbols);
        let results = join_all(modes.iter().map(|mode| mode.find_document_symbols(document))).await;
        concat("document symbols", document.uri(), results)
    }

    pub async fn find_document_links(&self, document: &Arc<TextDocument>) -> Vec<DocumentLink> {
        let modes = self.modes_in_document(document, Capability::DocumentLinks);
        let results = join_all(modes.iter().map(|mode| mode.find_document_links(document))).await;
        concat("document links", document.uri(), results)
    }

    pub async fn find_document_colors(&self, document: &Arc<TextDocument>) -> Vec<ColorInformation> {
        let modes = self.modes_in_document(document, Capability::DocumentColors);
        let results = join_all(modes.iter().map(|mode| mode.find_document_colors(document))).await;
        concat("document colors", document.uri(), results)
    }

    pub async fn color_presentations(
        &self,
        document: &Arc<TextDocument>,
        color: Color,
        range: Range,
    ) -> Vec<ColorPresentation> {
        let Some(mode) = self.mode_at(document, range.start, Capability::ColorPresentations) else {
            return Vec::new();
        };
        settle(
            "color presentation",
            document.uri(),
            mode.color_presentations(document, color, range).await,
        )
        .unwrap_or_default()
    }

    /// Format each language sub-range of `range` with its own mode.
    pub async fn format(
        &self,
        document: &Arc<TextDocument>,
        range: Range,
        options: &FormattingOptions,
    ) -> Vec<TextEdit> {
        let ranges: Vec<_> = self
            .modes
            .modes_in_range(document, range)
            .into_iter()
            .filter(|r| r.mode.supports(Capability::Formatting))
            .collect();
        let results = join_all(
            ranges
                .iter()
                .map(|r| r.mode.format(document, r.range, options)),
        )
        .await;
        concat("formatting", document.uri(), results)
    }

    pub async fn do_code_action(&self, document: &Arc<TextDocument>, range: Range) -> Vec<Command> {
        let Some(mode) = self.mode_at(document, range.start, Capability::CodeActions) else {
            return Vec::new();
        };
        settle("code action", document.uri(), mode.do_code_action(document, range).await)
            .unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.modes.commands()
    }

    pub async fn execute_command(
        &self,
        command: &str,
        arguments: Vec<Value>,
        context: &CommandContext,
    ) -> Result<Option<Value>> {
        let mode = self
            .modes
            .command_mode(command)
            .ok_or_else(|| Error::UnknownCommand(command.to_string()))?;
        debug!("executing {} with mode '{}'", command, mode.id());
        mode.execute_command(command, arguments, context).await
    }
}

/// Unwrap a mode result, logging failures.
fn settle<T>(operation: &str, uri: &impl Display, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} failed for {}: {}", operation, uri, e);
            None
        }
    }
}

fn concat<T>(operation: &str, uri: &impl Display, results: Vec<Result<Vec<T>>>) -> Vec<T> {
    results
        .into_iter()
        .filter_map(|result| settle(operation, uri, result))
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheOptions, LanguageModelCache};
    use crate::document::{RegionParser, AMIS_JSON_LANGUAGE_ID};
    use crate::modes::NullMode;

    /// Reports one symbol and one link per call, fails hover.
    struct StubMode;

    #[allow(deprecated)]
    fn stub_symbol(uri: &Url) -> SymbolInformation {
        SymbolInformation {
            name: "stub".to_string(),
            kind: SymbolKind::OBJECT,
            tags: None,
            deprecated: None,
            location: Location::new(uri.clone(), Range::default()),
            container_name: None,
        }
    }

    #[tower_lsp::async_trait]
    impl LanguageMode for StubMode {
        fn id(&self) -> &str {
            "stub"
        }

        fn supports(&self, capability: Capability) -> bool {
            matches!(
                capability,
                Capability::Hover | Capability::DocumentSymbols | Capability::CompletionResolve
            )
        }

        async fn do_hover(&self, document: &Arc<TextDocument>, _position: Position) -> Result<Option<Hover>> {
            Err(Error::DocumentNotFound(document.uri().clone()))
        }

        async fn find_document_symbols(&self, document: &Arc<TextDocument>) -> Result<Vec<SymbolInformation>> {
            Ok(vec![stub_symbol(document.uri())])
        }

        async fn do_resolve(&self, _document: &Arc<TextDocument>, mut item: CompletionItem) -> Result<CompletionItem> {
            item.detail = Some("resolved".to_string());
            Ok(item)
        }
    }

    const SOURCE: &str = "let a = 1;\n/** amis */\nconst b = { type: 'page' };\n";

    fn service(stub_tags: &[&str]) -> LanguageService {
        let regions = Arc::new(LanguageModelCache::new(
            Arc::new(RegionParser::new(&Settings::default())),
            CacheOptions::default(),
        ));
        let stub: Arc<dyn LanguageMode> = Arc::new(StubMode);
        let mut modes: Vec<(String, Arc<dyn LanguageMode>)> = stub_tags
            .iter()
            .map(|tag| (tag.to_string(), Arc::clone(&stub)))
            .collect();
        if !stub_tags.contains(&"typescript") {
            modes.push(("typescript".to_string(), Arc::new(NullMode)));
        }
        LanguageService::new(LanguageModes::new(regions, modes))
    }

    fn document() -> Arc<TextDocument> {
        let uri = Url::parse("file:///a.ts").unwrap();
        Arc::new(TextDocument::new(uri, "typescript", 1, SOURCE))
    }

    #[tokio::test]
    async fn fan_out_visits_each_mode_once() {
        let service = service(&["typescript", AMIS_JSON_LANGUAGE_ID]);
        let symbols = service.find_document_symbols(&document()).await;
        assert_eq!(symbols.len(), 1);
    }

    #[tokio::test]
    async fn failures_become_null_results() {
        let service = service(&[AMIS_JSON_LANGUAGE_ID]);
        let doc = document();
        assert!(service.do_hover(&doc, Position::new(2, 14)).await.is_none());
        // Host positions go to the null mode.
        assert!(service.do_hover(&doc, Position::new(0, 1)).await.is_none());
        assert!(service.do_complete(&doc, Position::new(0, 1)).await.items.is_empty());
    }

    #[tokio::test]
    async fn unsupported_operations_are_skipped() {
        let service = service(&[AMIS_JSON_LANGUAGE_ID]);
        let doc = document();
        assert!(service.do_signature_help(&doc, Position::new(0, 1)).await.is_none());
        assert!(service.find_document_links(&doc).await.is_empty());
        assert!(service.do_code_action(&doc, Range::default()).await.is_empty());
        assert!(!service.supports(Capability::Formatting));
    }

    #[tokio::test]
    async fn resolve_follows_language_id() {
        let service = service(&[AMIS_JSON_LANGUAGE_ID]);
        let doc = document();

        let item = CompletionItem {
            label: "title".to_string(),
            data: Some(serde_json::json!({"languageId": AMIS_JSON_LANGUAGE_ID})),
            ..Default::default()
        };
        let resolved = service.do_resolve(&doc, item).await;
        assert_eq!(resolved.detail.as_deref(), Some("resolved"));

        let plain = CompletionItem::new_simple("x".to_string(), String::new());
        let untouched = service.do_resolve(&doc, plain.clone()).await;
        assert_eq!(untouched, plain);
    }

    #[tokio::test]
    async fn unknown_commands_are_errors() {
        let service = service(&[AMIS_JSON_LANGUAGE_ID]);
        assert!(service.commands().is_empty());
        let context = CommandContext {
            documents: Arc::new(crate::document::DocumentStore::new()),
            sink: Arc::new(crate::modes::preview::tests::ChannelSink(
                tokio::sync::mpsc::unbounded_channel().0,
            )),
        };
        let err = service
            .execute_command("amis.previewSchema", Vec::new(), &context)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(_)));
    }
}
