//! The schema-governed JSON mode.
//!
//! Each annotated object literal is parsed as JSON against a masked
//! sub-document, gets a `$schema` property pointing at its bound schema, and
//! has its shorthand values repaired before hover, completion and validation
//! run on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use tower_lsp::lsp_types::*;
use tracing::{debug, info};

use super::patch::{filter_errors, insert_schema, patch_json_ast};
use super::preview::{CommandContext, PreviewRenderer, PreviewSession};
use super::{null_completion, Capability, LanguageMode};
use crate::cache::LanguageModelCache;
use crate::document::{DocumentRegions, EmbeddedRegion, TextDocument, AMIS_JSON_LANGUAGE_ID};
use crate::error::{Error, Result};
use crate::json::{
    JsonDocument, JsonLanguageService, LanguageSettings, NodeKind, SchemaConfiguration,
    SchemaRequestService,
};
use crate::lsp::{syntax_diagnostics, PreviewPayload};
use crate::settings::{Settings, DEFAULT_SCHEMA_LABEL};

/// Open a live preview of one region: `[uri, regionIndex]`.
pub const PREVIEW_COMMAND: &str = "amis.previewSchema";
/// Close the live preview.
pub const END_PREVIEW_COMMAND: &str = "amis.endPreviewSchema";

const PREVIEW_TITLE: &str = "preview schema";

/// A region parsed and repaired for schema-aware requests.
struct PreparedRegion {
    document: TextDocument,
    json: JsonDocument,
    label: String,
}

pub struct SchemaJsonMode {
    regions: Arc<LanguageModelCache<DocumentRegions>>,
    json: Arc<JsonLanguageService>,
    settings: RwLock<Settings>,
    preview: PreviewSession,
    disposed: AtomicBool,
}

impl SchemaJsonMode {
    pub fn new(
        regions: Arc<LanguageModelCache<DocumentRegions>>,
        request: Arc<dyn SchemaRequestService>,
    ) -> Self {
        Self {
            regions,
            json: Arc::new(JsonLanguageService::new(request)),
            settings: RwLock::new(Settings::default()),
            preview: PreviewSession::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn preview(&self) -> &PreviewSession {
        &self.preview
    }

    fn prepare(&self, regions: &DocumentRegions, index: usize) -> Option<PreparedRegion> {
        let region = regions.region(index)?;
        let document = regions.sub_document_at_index(index)?;
        let schema_uri = match &region.schema_uri {
            Some(uri) => uri.clone(),
            None => self
                .settings
                .read()
                .schema_uri_for(region.schema.as_deref())
                .to_string(),
        };

        let mut parsed = self.json.parse_json_document(&document);
        insert_schema(&mut parsed, &schema_uri);
        let patched = patch_json_ast(&mut parsed, &region.meta);
        if patched > 0 {
            debug!("attached {} shorthand values in region {}", patched, index);
        }

        Some(PreparedRegion {
            document,
            json: filter_errors(&parsed),
            label: region_label(region).to_string(),
        })
    }

    fn prepare_at(&self, document: &Arc<TextDocument>, position: Position) -> Option<PreparedRegion> {
        let regions = self.regions.get(document);
        let index = regions.region_index(position)?;
        self.prepare(&regions, index)
    }

    async fn start_preview(&self, arguments: Vec<Value>, context: &CommandContext) -> Result<()> {
        let (uri, index) = preview_arguments(&arguments)?;
        // Edits made while the open notification is in flight stay queued here.
        let changes = context.documents.subscribe();
        let document = context
            .documents
            .get(&uri)
            .ok_or_else(|| Error::DocumentNotFound(uri.clone()))?;

        let payload = render_preview(&self.regions.get(&document), &self.json, index)?;
        context.sink.open_preview(payload).await;

        let regions = Arc::clone(&self.regions);
        let json = Arc::clone(&self.json);
        let render: PreviewRenderer = Arc::new(move |document: &Arc<TextDocument>| {
            render_preview(&regions.get(document), &json, index)
        });
        self.preview.start(uri, changes, render, Arc::clone(&context.sink));
        Ok(())
    }
}

#[tower_lsp::async_trait]
impl LanguageMode for SchemaJsonMode {
    fn id(&self) -> &str {
        AMIS_JSON_LANGUAGE_ID
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(
            capability,
            Capability::Validation
                | Capability::Completion
                | Capability::CompletionResolve
                | Capability::Hover
                | Capability::DocumentSymbols
                | Capability::DocumentLinks
                | Capability::CodeActions
                | Capability::Commands
        )
    }

    fn configure(&self, settings: &Settings) {
        *self.settings.write() = settings.clone();

        let mut schemas: Vec<SchemaConfiguration> = Vec::new();
        for binding in &settings.schema.map {
            if !schemas.iter().any(|s| s.uri == binding.schema) {
                schemas.push(SchemaConfiguration {
                    uri: binding.schema.clone(),
                    schema: None,
                });
            }
        }
        let uris: Vec<String> = schemas.iter().map(|s| s.uri.clone()).collect();
        self.json.configure(LanguageSettings {
            validate: settings.validate,
            allow_comments: true,
            schemas,
        });

        // Warm the schema memo so the first hover does not wait on the network.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            for uri in uris {
                let json = Arc::clone(&self.json);
                handle.spawn(async move {
                    json.load_schema(&uri).await;
                });
            }
        }
    }

    async fn do_validation(&self, document: &Arc<TextDocument>) -> Result<Vec<Diagnostic>> {
        if !self.json.settings().validate {
            return Ok(Vec::new());
        }
        let regions = self.regions.get(document);
        let mut diagnostics = Vec::new();
        for index in 0..regions.regions().len() {
            if let Some(prepared) = self.prepare(&regions, index) {
                diagnostics.extend(syntax_diagnostics(
                    &prepared.json.syntax_errors,
                    document.line_index(),
                ));
            }
        }
        Ok(diagnostics)
    }

    async fn do_complete(
        &self,
        document: &Arc<TextDocument>,
        position: Position,
    ) -> Result<CompletionList> {
        let Some(prepared) = self.prepare_at(document, position) else {
            return Ok(null_completion());
        };
        let mut list = self
            .json
            .do_complete(&prepared.document, position, &prepared.json)
            .await;
        let data = json!({
            "languageId": AMIS_JSON_LANGUAGE_ID,
            "uri": document.uri(),
        });
        for item in &mut list.items {
            item.data = Some(data.clone());
        }
        Ok(list)
    }

    async fn do_resolve(
        &self,
        _document: &Arc<TextDocument>,
        item: CompletionItem,
    ) -> Result<CompletionItem> {
        Ok(self.json.do_resolve(item))
    }

    async fn do_hover(
        &self,
        document: &Arc<TextDocument>,
        position: Position,
    ) -> Result<Option<Hover>> {
        let Some(prepared) = self.prepare_at(document, position) else {
            return Ok(None);
        };
        Ok(self
            .json
            .do_hover(&prepared.document, position, &prepared.json)
            .await)
    }

    async fn find_document_symbols(
        &self,
        document: &Arc<TextDocument>,
    ) -> Result<Vec<SymbolInformation>> {
        let regions = self.regions.get(document);
        let mut symbols = Vec::new();
        for (index, region) in regions.regions().iter().enumerate() {
            symbols.push(symbol(
                region_label(region).to_string(),
                SymbolKind::MODULE,
                Location::new(document.uri().clone(), document.range_of(&region.span())),
                None,
            ));

            let Some(prepared) = self.prepare(&regions, index) else {
                continue;
            };
            let Some(root) = prepared.json.root() else {
                continue;
            };
            if !matches!(prepared.json.node(root).kind, NodeKind::Object { .. }) {
                continue;
            }
            for property in prepared.json.children(root) {
                let node = prepared.json.node(property);
                let Some(key) = prepared.json.property_key(property) else {
                    continue;
                };
                // The injected `$schema` has no text.
                if node.length == 0 {
                    continue;
                }
                symbols.push(symbol(
                    key.to_string(),
                    SymbolKind::PROPERTY,
                    Location::new(document.uri().clone(), document.range_of(&node.span())),
                    Some(prepared.label.clone()),
                ));
            }
        }
        Ok(symbols)
    }

    async fn find_document_links(&self, document: &Arc<TextDocument>) -> Result<Vec<DocumentLink>> {
        let regions = self.regions.get(document);
        let links = regions
            .regions()
            .iter()
            .filter_map(|region| {
                let annotation = region.annotation.as_ref()?;
                let target = Url::parse(region.schema_uri.as_deref()?).ok()?;
                Some(DocumentLink {
                    range: document.range_of(annotation),
                    target: Some(target),
                    tooltip: Some(format!("{} schema", region_label(region))),
                    data: None,
                })
            })
            .collect();
        Ok(links)
    }

    async fn do_code_action(&self, document: &Arc<TextDocument>, range: Range) -> Result<Vec<Command>> {
        let regions = self.regions.get(document);
        let Some(index) = regions.region_index(range.start) else {
            return Ok(Vec::new());
        };
        Ok(vec![Command {
            title: PREVIEW_TITLE.to_string(),
            command: PREVIEW_COMMAND.to_string(),
            arguments: Some(vec![json!(document.uri()), json!(index)]),
        }])
    }

    fn commands(&self) -> Vec<String> {
        vec![PREVIEW_COMMAND.to_string(), END_PREVIEW_COMMAND.to_string()]
    }

    async fn execute_command(
        &self,
        command: &str,
        arguments: Vec<Value>,
        context: &CommandContext,
    ) -> Result<Option<Value>> {
        match command {
            PREVIEW_COMMAND => {
                self.start_preview(arguments, context).await?;
                Ok(None)
            }
            END_PREVIEW_COMMAND => {
                self.preview.stop();
                Ok(None)
            }
            _ => Err(Error::UnknownCommand(command.to_string())),
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.preview.stop();
        info!("schema mode disposed");
    }
}

fn region_label(region: &EmbeddedRegion) -> &str {
    region.schema.as_deref().unwrap_or(DEFAULT_SCHEMA_LABEL)
}

#[allow(deprecated)]
fn symbol(
    name: String,
    kind: SymbolKind,
    location: Location,
    container_name: Option<String>,
) -> SymbolInformation {
    SymbolInformation {
        name,
        kind,
        tags: None,
        deprecated: None,
        location,
        container_name,
    }
}

fn preview_arguments(arguments: &[Value]) -> Result<(Url, usize)> {
    let invalid = |reason: &str| Error::InvalidCommandArguments {
        command: PREVIEW_COMMAND.to_string(),
        reason: reason.to_string(),
    };
    let uri = arguments
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("expected a document URI as the first argument"))?;
    let uri = Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
    let index = arguments
        .get(1)
        .and_then(Value::as_u64)
        .ok_or_else(|| invalid("expected a region index as the second argument"))?;
    Ok((uri, index as usize))
}

/// Preview content of the region at `index`.
///
/// The value is the region's object literal as JSON with shorthand values
/// repaired. When the region does not parse to a value its source text is sent
/// as a string.
pub fn render_preview(
    regions: &DocumentRegions,
    json: &JsonLanguageService,
    index: usize,
) -> Result<PreviewPayload> {
    let not_found = || Error::RegionNotFound {
        uri: regions.document().uri().clone(),
        index,
    };
    let region = regions.region(index).ok_or_else(not_found)?;
    let document = regions.sub_document_at_index(index).ok_or_else(not_found)?;

    let mut parsed = json.parse_json_document(&document);
    patch_json_ast(&mut parsed, &region.meta);
    let value = parsed.root_value().unwrap_or_else(|| {
        let source = regions.document().text().get(region.span()).unwrap_or_default();
        Value::String(source.to_string())
    });

    Ok(PreviewPayload {
        label: region_label(region).to_string(),
        value,
    })
}
