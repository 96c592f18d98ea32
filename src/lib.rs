//! amis language server implementation.
//!
//! Serves TypeScript and JavaScript documents in which object literals
//! annotated with a label comment (`/** amis */`) are treated as JSON governed
//! by the schema bound to that label.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde_json::Value;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService};
use tracing::{debug, info, warn};

pub mod cache;
pub mod document;
pub mod error;
pub mod fetch;
pub mod json;
pub mod lsp;
pub mod modes;
pub mod service;
pub mod settings;

pub use cache::{CacheOptions, DocumentParser, LanguageModelCache};
pub use document::{DocumentRegions, DocumentStore, EmbeddedRegion, LineIndex, TextDocument};
pub use error::Error;
pub use fetch::SchemaFetcher;
pub use json::{JsonLanguageService, SchemaRequestService};
pub use modes::{Capability, CommandContext, LanguageMode, LanguageModes, NullMode, SchemaJsonMode};
pub use service::LanguageService;
pub use settings::{discover_settings, load_settings, Settings};

use document::{RegionParser, AMIS_JSON_LANGUAGE_ID};
use modes::HOST_LANGUAGE_IDS;
use settings::CONFIGURATION_SECTION;

/// Re-apply the last known settings to every mode.
pub const RELOAD_CONFIGURATION_COMMAND: &str = "amis.reloadConfiguration";

/// Build the router and its modes.
///
/// The region cache is sized from `settings`; call
/// [`LanguageService::configure`] to apply the rest.
pub fn build_language_service(
    settings: &Settings,
    request: Arc<dyn SchemaRequestService>,
) -> LanguageService {
    let regions = Arc::new(LanguageModelCache::new(
        Arc::new(RegionParser::new(settings)),
        settings.cache.options(),
    ));
    let schema_mode: Arc<dyn LanguageMode> =
        Arc::new(SchemaJsonMode::new(Arc::clone(&regions), request));
    let null_mode: Arc<dyn LanguageMode> = Arc::new(NullMode);

    let mut modes = vec![(AMIS_JSON_LANGUAGE_ID.to_string(), schema_mode)];
    for id in HOST_LANGUAGE_IDS {
        modes.push((id.to_string(), Arc::clone(&null_mode)));
    }
    LanguageService::new(LanguageModes::new(regions, modes))
}

/// Capabilities of the registered modes.
pub fn server_capabilities(service: &LanguageService) -> ServerCapabilities {
    let supports = |capability| service.supports(capability);

    let mut commands = service.commands();
    commands.push(RELOAD_CONFIGURATION_COMMAND.to_string());

    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Kind(
            TextDocumentSyncKind::FULL,
        )),
        completion_provider: supports(Capability::Completion).then(|| CompletionOptions {
            trigger_characters: Some(vec!["\"".to_string(), ":".to_string()]),
            resolve_provider: Some(supports(Capability::CompletionResolve)),
            ..Default::default()
        }),
        hover_provider: supports(Capability::Hover).then_some(HoverProviderCapability::Simple(true)),
        signature_help_provider: supports(Capability::SignatureHelp).then(|| SignatureHelpOptions {
            trigger_characters: Some(vec!["(".to_string()]),
            retrigger_characters: None,
            work_done_progress_options: WorkDoneProgressOptions::default(),
        }),
        document_highlight_provider: supports(Capability::DocumentHighlight).then_some(OneOf::Left(true)),
        document_symbol_provider: supports(Capability::DocumentSymbols).then_some(OneOf::Left(true)),
        document_link_provider: supports(Capability::DocumentLinks).then(|| DocumentLinkOptions {
            resolve_provider: Some(false),
            work_done_progress_options: WorkDoneProgressOptions::default(),
        }),
        definition_provider: supports(Capability::Definition).then_some(OneOf::Left(true)),
        references_provider: supports(Capability::References).then_some(OneOf::Left(true)),
        document_range_formatting_provider: supports(Capability::Formatting).then_some(OneOf::Left(true)),
        color_provider: supports(Capability::DocumentColors)
            .then_some(ColorProviderCapability::Simple(true)),
        code_action_provider: supports(Capability::CodeActions)
            .then_some(CodeActionProviderCapability::Simple(true)),
        execute_command_provider: Some(ExecuteCommandOptions {
            commands,
            work_done_progress_options: WorkDoneProgressOptions::default(),
        }),
        ..Default::default()
    }
}

pub struct Backend {
    client: Client,
    documents: Arc<DocumentStore>,
    fetcher: Arc<SchemaFetcher>,
    service: LanguageService,
    settings: RwLock<Settings>,
    workspace_root: OnceLock<PathBuf>,
}

impl Backend {
    pub(crate) fn new(client: Client) -> Self {
        let settings = Settings::default();
        let fetcher = Arc::new(SchemaFetcher::new());
        let service = build_language_service(&settings, Arc::clone(&fetcher) as Arc<dyn SchemaRequestService>);
        Self {
            client,
            documents: Arc::new(DocumentStore::new()),
            fetcher,
            service,
            settings: RwLock::new(settings),
            workspace_root: OnceLock::new(),
        }
    }

    /// Reconfigure every mode and revalidate the open documents.
    async fn apply_settings(&self, settings: Settings) {
        info!(
            "applying settings: {} schema binding(s), validate={}",
            settings.schema.map.len(),
            settings.validate
        );
        self.fetcher.configure(&settings);
        self.service.configure(&settings);
        *self.settings.write() = settings;

        for document in self.documents.all() {
            self.publish_diagnostics_for(&document).await;
        }
    }

    /// Validate a document and publish the result.
    async fn publish_diagnostics_for(&self, document: &Arc<TextDocument>) {
        let diagnostics = self.service.do_validation(document).await;
        self.client
            .publish_diagnostics(document.uri().clone(), diagnostics, Some(document.version()))
            .await;
    }

    fn command_context(&self) -> CommandContext {
        CommandContext {
            documents: Arc::clone(&self.documents),
            sink: Arc::new(self.client.clone()),
        }
    }

    async fn pull_client_settings(&self) {
        let items = vec![ConfigurationItem {
            scope_uri: None,
            section: Some(CONFIGURATION_SECTION.to_string()),
        }];
        match self.client.configuration(items).await {
            Ok(values) => {
                if let Some(settings) = values.into_iter().next().and_then(Settings::from_lsp_value) {
                    self.apply_settings(settings).await;
                }
            }
            Err(e) => debug!("client configuration unavailable: {}", e),
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let workspace_root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|f| f.uri.to_file_path().ok())
            .or_else(|| {
                #[allow(deprecated)]
                params.root_uri.as_ref()?.to_file_path().ok()
            });

        if let Some(root) = workspace_root {
            let _ = self.workspace_root.set(root.clone());
            let (settings, settings_dir) = settings::discover_settings(&root);
            info!("workspace settings from {}", settings_dir.display());
            *self.settings.write() = settings;
        }
        if let Some(settings) = params.initialization_options.and_then(Settings::from_lsp_value) {
            *self.settings.write() = settings;
        }

        Ok(InitializeResult {
            capabilities: server_capabilities(&self.service),
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let settings = self.settings.read().clone();
        self.apply_settings(settings).await;
        self.pull_client_settings().await;
        self.client
            .log_message(MessageType::INFO, "amis language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.service.dispose();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = self.documents.open(
            params.text_document.uri,
            params.text_document.language_id,
            params.text_document.version,
            params.text_document.text,
        );
        self.publish_diagnostics_for(&document).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // We use FULL sync, so there's exactly one change with the full text
        let Some(change) = params.content_changes.into_iter().next() else {
            return;
        };
        let uri = params.text_document.uri;
        match self.documents.change(&uri, params.text_document.version, change.text) {
            Some(document) => self.publish_diagnostics_for(&document).await,
            None => warn!("change for unopened document {}", uri),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.close(&uri);
        self.service.on_document_removed(&uri);
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        match Settings::from_lsp_value(params.settings) {
            Some(settings) => self.apply_settings(settings).await,
            None => self.pull_client_settings().await,
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(document) = self.documents.get(uri) else {
            return Ok(None);
        };
        Ok(self.service.do_hover(&document, position).await)
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some(document) = self.documents.get(uri) else {
            debug!("completion for unknown document {}", uri);
            return Ok(None);
        };
        let list = self.service.do_complete(&document, position).await;
        Ok(Some(CompletionResponse::List(list)))
    }

    async fn completion_resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        let document = item
            .data
            .as_ref()
            .and_then(|data| data.get("uri"))
            .and_then(Value::as_str)
            .and_then(|uri| Url::parse(uri).ok())
            .and_then(|uri| self.documents.get(&uri));
        match document {
            Some(document) => Ok(self.service.do_resolve(&document, item).await),
            None => Ok(item),
        }
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(document) = self.documents.get(uri) else {
            return Ok(None);
        };
        Ok(self.service.do_signature_help(&document, position).await)
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> Result<Option<Vec<DocumentHighlight>>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(document) = self.documents.get(uri) else {
            return Ok(None);
        };
        Ok(Some(
            self.service.find_document_highlight(&document, position).await,
        ))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(document) = self.documents.get(uri) else {
            return Ok(None);
        };
        let locations = self.service.find_definition(&document, position).await;
        Ok(Some(GotoDefinitionResponse::Array(locations)))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some(document) = self.documents.get(uri) else {
            return Ok(None);
        };
        Ok(Some(self.service.find_references(&document, position).await))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let Some(document) = self.documents.get(&params.text_document.uri) else {
            return Ok(None);
        };
        let symbols = self.service.find_document_symbols(&document).await;
        Ok(Some(DocumentSymbolResponse::Flat(symbols)))
    }

    async fn document_link(&self, params: DocumentLinkParams) -> Result<Option<Vec<DocumentLink>>> {
        let Some(document) = self.documents.get(&params.text_document.uri) else {
            return Ok(None);
        };
        Ok(Some(self.service.find_document_links(&document).await))
    }

    async fn range_formatting(
        &self,
        params: DocumentRangeFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        let Some(document) = self.documents.get(&params.text_document.uri) else {
            return Ok(None);
        };
        Ok(Some(
            self.service
                .format(&document, params.range, &params.options)
                .await,
        ))
    }

    async fn document_color(&self, params: DocumentColorParams) -> Result<Vec<ColorInformation>> {
        let Some(document) = self.documents.get(&params.text_document.uri) else {
            return Ok(Vec::new());
        };
        Ok(self.service.find_document_colors(&document).await)
    }

    async fn color_presentation(
        &self,
        params: ColorPresentationParams,
    ) -> Result<Vec<ColorPresentation>> {
        let Some(document) = self.documents.get(&params.text_document.uri) else {
            return Ok(Vec::new());
        };
        Ok(self
            .service
            .color_presentations(&document, params.color, params.range)
            .await)
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let Some(document) = self.documents.get(&params.text_document.uri) else {
            return Ok(None);
        };
        let commands = self.service.do_code_action(&document, params.range).await;
        if commands.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            commands
                .into_iter()
                .map(CodeActionOrCommand::Command)
                .collect(),
        ))
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        if params.command == RELOAD_CONFIGURATION_COMMAND {
            let settings = self.settings.read().clone();
            self.apply_settings(settings).await;
            return Ok(None);
        }

        let context = self.command_context();
        match self
            .service
            .execute_command(&params.command, params.arguments, &context)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!("command {} failed: {}", params.command, e);
                Ok(None)
            }
        }
    }
}

pub fn create_service() -> (LspService<Backend>, tower_lsp::ClientSocket) {
    LspService::new(Backend::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::schema_json::{END_PREVIEW_COMMAND, PREVIEW_COMMAND};

    #[test]
    fn service_can_be_created() {
        let (_service, _socket) = create_service();
    }

    #[test]
    fn capabilities_follow_the_modes() {
        let service = build_language_service(&Settings::default(), Arc::new(SchemaFetcher::new()));
        let capabilities = server_capabilities(&service);

        assert!(capabilities.hover_provider.is_some());
        assert!(capabilities.code_action_provider.is_some());
        assert!(capabilities.document_link_provider.is_some());
        assert!(capabilities.signature_help_provider.is_some());
        assert!(capabilities.references_provider.is_some());
        assert!(capabilities.document_range_formatting_provider.is_none());
        assert!(capabilities.color_provider.is_none());
        assert!(capabilities.definition_provider.is_none());
        assert_eq!(
            capabilities.completion_provider.and_then(|c| c.resolve_provider),
            Some(true)
        );
        assert_eq!(
            capabilities.execute_command_provider.map(|c| c.commands),
            Some(vec![
                PREVIEW_COMMAND.to_string(),
                END_PREVIEW_COMMAND.to_string(),
                RELOAD_CONFIGURATION_COMMAND.to_string(),
            ])
        );
    }
}
