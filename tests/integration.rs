use std::path::PathBuf;
use std::sync::Arc;

use amis_lsp::lsp::PreviewPayload;
use amis_lsp::modes::PreviewSink;
use amis_lsp::settings::{CacheSettings, SchemaBinding, SchemaSettings};
use amis_lsp::{
    build_language_service, discover_settings, CommandContext, DocumentStore, LanguageService,
    SchemaFetcher, Settings, TextDocument,
};
use expect_test::expect;
use parking_lot::Mutex;
use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticSeverity, HoverContents, NumberOrString, Position, Range, SymbolKind, Url,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SOURCE: &str = r#"import { render } from 'amis';

/** amis */
export const page = {
    type: "page",
    title: hello,
    body: [],
};

// form
const form = { mode: 'inline', api: `/api/save` };
"#;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn schema_uri(name: &str) -> String {
    Url::from_file_path(fixtures().join("schemas").join(name))
        .unwrap()
        .to_string()
}

/// `amis` is bound to the amis-style fixture schema, `form` to a plain one.
fn settings() -> Settings {
    Settings {
        schema: SchemaSettings {
            map: vec![
                SchemaBinding {
                    label: "amis".to_string(),
                    schema: schema_uri("amis.json"),
                    is_amis_style_schema: true,
                },
                SchemaBinding {
                    label: "form".to_string(),
                    schema: schema_uri("form.json"),
                    is_amis_style_schema: false,
                },
            ],
        },
        validate: true,
        cache: CacheSettings {
            cleanup_interval_secs: 0,
            ..Default::default()
        },
    }
}

/// The full pipeline with schemas loaded from `tests/fixtures/schemas`.
fn language_service(settings: &Settings) -> LanguageService {
    let fetcher = Arc::new(SchemaFetcher::new());
    fetcher.configure(settings);
    let service = build_language_service(settings, fetcher);
    service.configure(settings);
    service
}

fn document(text: &str) -> Arc<TextDocument> {
    let uri = Url::parse("file:///src/pages.ts").unwrap();
    Arc::new(TextDocument::new(uri, "typescript", 1, text))
}

fn format_range(range: &Range) -> String {
    format!(
        "{}:{}-{}:{}",
        range.start.line, range.start.character, range.end.line, range.end.character
    )
}

/// Hover as `<range> <markdown>`, paragraphs joined by ` | `.
async fn hover(service: &LanguageService, text: &str, line: u32, character: u32) -> String {
    let doc = document(text);
    match service.do_hover(&doc, Position::new(line, character)).await {
        Some(hover) => {
            let markdown = match hover.contents {
                HoverContents::Markup(m) => m.value,
                other => panic!("unexpected hover contents: {:?}", other),
            };
            let range = hover.range.map(|r| format_range(&r)).unwrap_or_default();
            format!("{} {}", range, markdown.replace("\n\n", " | "))
        }
        None => "no hover".to_string(),
    }
}

async fn completion_labels(service: &LanguageService, text: &str, line: u32, character: u32) -> String {
    let doc = document(text);
    let list = service.do_complete(&doc, Position::new(line, character)).await;
    list.items
        .iter()
        .map(|item| match &item.detail {
            Some(detail) => format!("{} ({})", item.label, detail),
            None => item.label.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// One diagnostic per line: `<range> <severity> [<code>]: <message>`.
fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "OK (no diagnostics)".to_string();
    }

    let mut lines: Vec<String> = diagnostics
        .iter()
        .map(|d| {
            let severity = match d.severity {
                Some(DiagnosticSeverity::ERROR) => "error",
                Some(DiagnosticSeverity::WARNING) => "warning",
                _ => "other",
            };
            let code = match &d.code {
                Some(NumberOrString::Number(n)) => format!(" [{}]", n),
                Some(NumberOrString::String(s)) => format!(" [{}]", s),
                None => String::new(),
            };
            format!("{} {}{}: {}", format_range(&d.range), severity, code, d.message)
        })
        .collect();
    lines.sort();
    lines.join("\n")
}

/// Records every preview payload it receives.
#[derive(Default)]
struct RecordingSink {
    payloads: Mutex<Vec<(&'static str, PreviewPayload)>>,
}

#[tower_lsp::async_trait]
impl PreviewSink for RecordingSink {
    async fn open_preview(&self, payload: PreviewPayload) {
        self.payloads.lock().push(("open", payload));
    }

    async fn update_preview(&self, payload: PreviewPayload) {
        self.payloads.lock().push(("update", payload));
    }
}

// ---------------------------------------------------------------------------
// Tests: hover
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hover_on_discriminated_value() {
    let service = language_service(&settings());
    let actual = hover(&service, SOURCE, 4, 12).await;
    let expected = expect![[r#"4:10-4:16 Page renderer"#]];
    expected.assert_eq(&actual);
}

#[tokio::test]
async fn hover_on_identifier_shorthand() {
    let service = language_service(&settings());
    let actual = hover(&service, SOURCE, 5, 13).await;
    let expected = expect![[r#"5:11-5:16 **Title** | Page title"#]];
    expected.assert_eq(&actual);
}

#[tokio::test]
async fn hover_uses_the_label_binding() {
    let service = language_service(&settings());
    let actual = hover(&service, SOURCE, 10, 24).await;
    let expected = expect![[r#"10:21-10:29 Layout | `"inline"`: Single line"#]];
    expected.assert_eq(&actual);
}

#[tokio::test]
async fn no_hover_in_host_code() {
    let service = language_service(&settings());
    let actual = hover(&service, SOURCE, 0, 3).await;
    let expected = expect![[r#"no hover"#]];
    expected.assert_eq(&actual);
}

// ---------------------------------------------------------------------------
// Tests: completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completes_missing_properties() {
    let service = language_service(&settings());
    let text = "/** amis */\nconst page = {\n    type: \"page\",\n    \n};\n";
    let actual = completion_labels(&service, text, 3, 4).await;
    let expected = expect![[r#"title (string), body (array), visible (boolean)"#]];
    expected.assert_eq(&actual);
}

#[tokio::test]
async fn completes_enum_inside_single_quotes() {
    let service = language_service(&settings());
    let text = "/** amis */\nconst form = { type: \"form\", mode: '' };\n";
    let actual = completion_labels(&service, text, 1, 36).await;
    let expected = expect![[r#""normal", "horizontal", "inline""#]];
    expected.assert_eq(&actual);
}

#[tokio::test]
async fn no_completion_in_host_code() {
    let service = language_service(&settings());
    let actual = completion_labels(&service, SOURCE, 0, 10).await;
    let expected = expect![[r#""#]];
    expected.assert_eq(&actual);
}

// ---------------------------------------------------------------------------
// Tests: validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn object_literal_shorthand_is_clean() {
    let service = language_service(&settings());
    let actual = format_diagnostics(&service.do_validation(&document(SOURCE)).await);
    let expected = expect![[r#"OK (no diagnostics)"#]];
    expected.assert_eq(&actual);
}

#[tokio::test]
async fn duplicate_keys_are_reported() {
    let service = language_service(&settings());
    let text = "/** amis */\nconst page = { \"type\": \"page\", \"type\": \"form\" };\n";
    let actual = format_diagnostics(&service.do_validation(&document(text)).await);
    let expected = expect![[r#"1:31-1:37 warning [520]: Duplicate object key"#]];
    expected.assert_eq(&actual);
}

#[tokio::test]
async fn validation_can_be_disabled() {
    let settings = Settings {
        validate: false,
        ..settings()
    };
    let service = language_service(&settings);
    let text = "/** amis */\nconst page = { \"type\": \"page\", \"type\": \"form\" };\n";
    assert!(service.do_validation(&document(text)).await.is_empty());
}

// ---------------------------------------------------------------------------
// Tests: document-wide requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn symbols_cover_every_region_once() {
    let service = language_service(&settings());
    let symbols = service.find_document_symbols(&document(SOURCE)).await;
    let actual = symbols
        .iter()
        .map(|s| {
            let kind = match s.kind {
                SymbolKind::MODULE => "module",
                SymbolKind::PROPERTY => "property",
                _ => "other",
            };
            match &s.container_name {
                Some(container) => format!(
                    "{} {} in {} {}",
                    s.name,
                    kind,
                    container,
                    format_range(&s.location.range)
                ),
                None => format!("{} {} {}", s.name, kind, format_range(&s.location.range)),
            }
        })
        .collect::<Vec<_>>()
        .join("; ");
    let expected = expect![[
        r#"amis module 3:20-7:1; type property in amis 4:4-4:16; title property in amis 5:4-5:16; body property in amis 6:4-6:12; form module 10:13-10:49; mode property in form 10:15-10:29; api property in form 10:31-10:47"#
    ]];
    expected.assert_eq(&actual);
}

#[tokio::test]
async fn links_point_at_bound_schemas() {
    let service = language_service(&settings());
    let links = service.find_document_links(&document(SOURCE)).await;
    let actual = links
        .iter()
        .map(|l| format_range(&l.range))
        .collect::<Vec<_>>()
        .join(", ");
    let expected = expect![[r#"2:0-2:11, 9:0-9:7"#]];
    expected.assert_eq(&actual);

    let targets: Vec<String> = links
        .iter()
        .filter_map(|l| l.target.as_ref().map(|t| t.to_string()))
        .collect();
    assert_eq!(targets, vec![schema_uri("amis.json"), schema_uri("form.json")]);
}

#[tokio::test]
async fn rebinding_labels_reparses_regions() {
    let service = language_service(&settings());
    let doc = document(SOURCE);
    assert_eq!(service.find_document_links(&doc).await.len(), 2);

    let mut only_amis = settings();
    only_amis.schema.map.retain(|b| b.label == "amis");
    service.configure(&only_amis);
    assert_eq!(service.find_document_links(&doc).await.len(), 1);
    assert_eq!(hover(&service, SOURCE, 10, 24).await, "no hover");
}

// ---------------------------------------------------------------------------
// Tests: preview command
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preview_action_renders_the_region() {
    let service = language_service(&settings());
    let documents = Arc::new(DocumentStore::new());
    let uri = Url::parse("file:///src/pages.ts").unwrap();
    let doc = documents.open(uri, "typescript", 1, SOURCE.to_string());

    let inside_form = Range::new(Position::new(10, 16), Position::new(10, 16));
    let actions = service.do_code_action(&doc, inside_form).await;
    assert_eq!(actions.len(), 1);

    let sink = Arc::new(RecordingSink::default());
    let context = CommandContext {
        documents: Arc::clone(&documents),
        sink: Arc::clone(&sink) as Arc<dyn PreviewSink>,
    };
    let action = &actions[0];
    service
        .execute_command(
            &action.command,
            action.arguments.clone().unwrap_or_default(),
            &context,
        )
        .await
        .unwrap();

    let actual = sink
        .payloads
        .lock()
        .iter()
        .map(|(kind, payload)| format!("{} {} {}", kind, payload.label, payload.value))
        .collect::<Vec<_>>()
        .join("\n");
    let expected = expect![[r#"open form {"mode":"inline","api":"/api/save"}"#]];
    expected.assert_eq(&actual);
}

// ---------------------------------------------------------------------------
// Tests: settings discovery
// ---------------------------------------------------------------------------

#[test]
fn discover_settings_from_nested_directory() {
    let workspace = fixtures().join("workspace");
    let child = workspace.join("subdir");
    std::fs::create_dir_all(&child).ok();

    let (settings, settings_dir) = discover_settings(&child);
    assert_eq!(settings_dir, workspace);
    assert!(settings.validate);
    assert_eq!(settings.cache.max_entries, 4);

    let actual = settings
        .schema
        .map
        .iter()
        .map(|b| format!("{} -> {} (amis-style: {})", b.label, b.schema, b.is_amis_style_schema))
        .collect::<Vec<_>>()
        .join("; ");
    let expected = expect![[
        r#"amis -> https://fex-team.github.io/amis-editor-demo/schema.json (amis-style: true); form -> file:///schemas/form.json (amis-style: false)"#
    ]];
    expected.assert_eq(&actual);

    let _ = std::fs::remove_dir(&child);
}
