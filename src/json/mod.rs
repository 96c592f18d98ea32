//! JSON language service.
//!
//! A tolerant JSON parser with an arena AST, plus schema-driven hover and
//! completion. Schemas are located through the document's root `$schema`
//! property and loaded through a [`SchemaRequestService`].

pub mod ast;
pub mod parser;
pub mod scanner;
pub mod schema;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tower_lsp::lsp_types::{CompletionItem, CompletionList, Hover, Position};
use tracing::debug;

use crate::document::TextDocument;
use crate::lsp::{current_word_start, markdown_hover, property_item, schema_hover_markdown, schema_value_items};

pub use ast::{AstNode, ErrorCode, JsonDocument, NodeId, NodeKind, PathStep, Segment, SyntaxError};
pub use schema::{SchemaNavigator, SchemaRequestService, SchemaStore};

/// Property holding the schema URI of a document.
pub const SCHEMA_PROPERTY: &str = "$schema";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanguageSettings {
    pub validate: bool,
    pub allow_comments: bool,
    pub schemas: Vec<SchemaConfiguration>,
}

/// A known schema. With `schema` set the URI is served from memory.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaConfiguration {
    pub uri: String,
    pub schema: Option<Value>,
}

pub struct JsonLanguageService {
    schemas: SchemaStore,
    settings: RwLock<LanguageSettings>,
}

impl JsonLanguageService {
    pub fn new(request: Arc<dyn SchemaRequestService>) -> Self {
        Self {
            schemas: SchemaStore::new(request),
            settings: RwLock::new(LanguageSettings::default()),
        }
    }

    /// Apply settings. Every resolved schema is forgotten.
    pub fn configure(&self, settings: LanguageSettings) {
        let inline: HashMap<String, Arc<Value>> = settings
            .schemas
            .iter()
            .filter_map(|config| {
                let schema = config.schema.clone()?;
                Some((config.uri.clone(), Arc::new(schema)))
            })
            .collect();
        self.schemas.reset(inline);
        *self.settings.write() = settings;
    }

    pub fn settings(&self) -> LanguageSettings {
        self.settings.read().clone()
    }

    pub fn parse_json_document(&self, document: &TextDocument) -> JsonDocument {
        parser::parse(document.text(), self.settings.read().allow_comments)
    }

    /// Resolve a schema by URI, warming the memo for later requests.
    pub async fn load_schema(&self, uri: &str) -> Option<Arc<Value>> {
        self.schemas.get_or_log(uri).await
    }

    /// Schema named by the root `$schema` property, if it loads.
    pub async fn schema_for(&self, json: &JsonDocument) -> Option<Arc<Value>> {
        let root = json.root()?;
        let property = json.property(root, SCHEMA_PROPERTY)?;
        let value = json.property_value(property)?;
        let NodeKind::String { value: uri } = &json.node(value).kind else {
            return None;
        };
        self.schemas.get_or_log(uri).await
    }

    pub async fn do_hover(
        &self,
        document: &TextDocument,
        position: Position,
        json: &JsonDocument,
    ) -> Option<Hover> {
        let offset = document.offset_at(position);
        let mut node = json.node_at(offset, false)?;

        // Nothing to say about the inside of a container.
        let current = json.node(node);
        if matches!(current.kind, NodeKind::Object { .. } | NodeKind::Array { .. })
            && offset > current.offset + 1
            && offset + 1 < current.end()
        {
            return None;
        }

        let range_node = node;
        if json.is_property_key(node) {
            let property = json.node(node).parent?;
            node = json.property_value(property).unwrap_or(property);
        }

        let schema = self.schema_for(json).await?;
        let navigator = SchemaNavigator::new(&schema);
        let schemas = navigator.schemas_for_path(json, &json.path_to(node));
        let value = (!matches!(json.node(node).kind, NodeKind::Property { .. }))
            .then(|| json.to_value(node));
        let markdown = schema_hover_markdown(&schemas, value.as_ref())?;

        debug!("hover at {} resolved {} schemas", offset, schemas.len());
        Some(markdown_hover(
            markdown,
            document.range_of(&json.node(range_node).span()),
        ))
    }

    pub async fn do_complete(
        &self,
        document: &TextDocument,
        position: Position,
        json: &JsonDocument,
    ) -> CompletionList {
        let mut list = CompletionList {
            is_incomplete: false,
            items: Vec::new(),
        };

        let offset = document.offset_at(position);
        if json
            .comments
            .iter()
            .any(|comment| comment.start < offset && offset <= comment.end)
        {
            return list;
        }

        let Some(schema) = self.schema_for(json).await else {
            return list;
        };
        let navigator = SchemaNavigator::new(&schema);
        let text = document.text();

        let mut node = json.node_at(offset, true);
        if let Some(id) = node {
            // Just after a closing bracket the cursor belongs to the parent.
            let current = json.node(id);
            let last = text.as_bytes().get(offset.wrapping_sub(1)).copied();
            if offset == current.end()
                && offset > 0
                && matches!(
                    (&current.kind, last),
                    (NodeKind::Object { .. }, Some(b'}')) | (NodeKind::Array { .. }, Some(b']'))
                )
            {
                node = current.parent;
            }
        }

        let overwrite = match node.map(|id| json.node(id)) {
            Some(n)
                if matches!(
                    n.kind,
                    NodeKind::String { .. }
                        | NodeKind::Number { .. }
                        | NodeKind::Boolean { .. }
                        | NodeKind::Null
                ) && n.offset <= offset
                    && offset <= n.end() =>
            {
                n.span()
            }
            _ => current_word_start(text, offset)..offset,
        };
        let range = document.range_of(&overwrite);

        // Key position: a property key, or directly inside an object.
        let mut add_value = true;
        let mut current_property = None;
        let mut object = None;
        if let Some(id) = node {
            if json.is_property_key(id) {
                if let Some(property) = json.node(id).parent {
                    add_value = json.property_value(property).is_none();
                    current_property = Some(property);
                    object = json.node(property).parent;
                }
            } else if matches!(json.node(id).kind, NodeKind::Object { .. }) {
                object = Some(id);
            }
        }

        if let Some(object) = object {
            if json.node(object).offset == offset {
                return list;
            }
            let mut proposed: Vec<&str> = json
                .children(object)
                .into_iter()
                .filter(|p| Some(*p) != current_property)
                .filter_map(|p| json.property_key(p))
                .collect();
            for schema in navigator.schemas_for_path(json, &json.path_to(object)) {
                let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
                    continue;
                };
                for (key, property_schema) in properties {
                    if proposed.contains(&key.as_str()) {
                        continue;
                    }
                    proposed.push(key);
                    let property_schema = navigator.resolve_ref(property_schema);
                    list.items
                        .push(property_item(key, property_schema, range, add_value));
                }
            }
            return list;
        }

        // Value position.
        let Some(mut target) = node else {
            list.items = dedup(
                navigator
                    .schemas_for_path(json, &[])
                    .into_iter()
                    .flat_map(|s| schema_value_items(s, range))
                    .collect(),
            );
            return list;
        };

        let path = match &json.node(target).kind {
            NodeKind::Property {
                value, colon_offset, ..
            } => {
                if colon_offset.is_none_or_before(offset) {
                    return list;
                }
                if let Some(value) = value {
                    if offset > json.node(*value).end() {
                        return list;
                    }
                }
                json.path_to(target)
            }
            NodeKind::Array { items } => {
                let index = items
                    .iter()
                    .take_while(|item| json.node(**item).end() < offset)
                    .count();
                let mut path = json.path_to(target);
                path.push(PathStep {
                    segment: Segment::Index(index),
                    node: None,
                });
                path
            }
            NodeKind::Object { .. } => return list,
            _ => {
                if let Some(parent) = json.node(target).parent {
                    if matches!(json.node(parent).kind, NodeKind::Property { .. }) {
                        target = parent;
                    }
                }
                json.path_to(target)
            }
        };

        list.items = dedup(
            navigator
                .schemas_for_path(json, &path)
                .into_iter()
                .flat_map(|s| schema_value_items(s, range))
                .collect(),
        );
        list
    }

    pub fn do_resolve(&self, item: CompletionItem) -> CompletionItem {
        item
    }
}

trait ColonExt {
    fn is_none_or_before(&self, offset: usize) -> bool;
}

impl ColonExt for Option<usize> {
    /// True when the cursor is not after the colon.
    fn is_none_or_before(&self, offset: usize) -> bool {
        match self {
            Some(colon) => offset <= *colon,
            None => true,
        }
    }
}

fn dedup(items: Vec<CompletionItem>) -> Vec<CompletionItem> {
    let mut seen = Vec::new();
    items
        .into_iter()
        .filter(|item| {
            if seen.contains(&item.label) {
                false
            } else {
                seen.push(item.label.clone());
                true
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use serde_json::json;
    use tower_lsp::lsp_types::{HoverContents, Url};

    struct NoNetwork;

    #[tower_lsp::async_trait]
    impl SchemaRequestService for NoNetwork {
        async fn request(&self, uri: &str) -> Result<String> {
            Err(Error::UnsupportedSchemaUri(uri.to_string()))
        }
    }

    const SCHEMA_URI: &str = "mem://test.json";

    fn service() -> JsonLanguageService {
        let service = JsonLanguageService::new(Arc::new(NoNetwork));
        service.configure(LanguageSettings {
            validate: false,
            allow_comments: true,
            schemas: vec![SchemaConfiguration {
                uri: SCHEMA_URI.to_string(),
                schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "type": {"type": "string", "enum": ["page", "form"], "enumDescriptions": ["Page", "Form"], "description": "Renderer"},
                        "title": {"type": "string", "title": "Title", "description": "Shown on top"},
                        "visible": {"type": "boolean"},
                        "body": {"type": "array", "items": {"type": "string", "enum": ["a", "b"]}}
                    }
                })),
            }],
        });
        service
    }

    fn document(text: &str) -> TextDocument {
        TextDocument::new(
            Url::parse("file:///test.json").unwrap(),
            "json",
            1,
            text.to_string(),
        )
    }

    fn markdown(hover: &Hover) -> &str {
        match &hover.contents {
            HoverContents::Markup(m) => &m.value,
            _ => panic!("expected markup"),
        }
    }

    fn labels(list: &CompletionList) -> Vec<&str> {
        list.items.iter().map(|i| i.label.as_str()).collect()
    }

    #[tokio::test]
    async fn hover_on_value_and_key() {
        let service = service();
        let text = format!(r#"{{"$schema": "{}", "type": "form", "title": "x"}}"#, SCHEMA_URI);
        let doc = document(&text);
        let json = service.parse_json_document(&doc);

        let at = text.find("\"form\"").unwrap() + 2;
        let hover = service.do_hover(&doc, doc.position_at(at), &json).await.unwrap();
        assert_eq!(markdown(&hover), "Renderer\n\n`\"form\"`: Form");
        assert_eq!(hover.range, Some(doc.range_of(&(at - 2..at + 4))));

        let at = text.find("\"title\"").unwrap() + 1;
        let hover = service.do_hover(&doc, doc.position_at(at), &json).await.unwrap();
        assert_eq!(markdown(&hover), "**Title**\n\nShown on top");
    }

    #[tokio::test]
    async fn no_hover_without_schema() {
        let service = service();
        let doc = document(r#"{"type": "form"}"#);
        let json = service.parse_json_document(&doc);
        assert!(service.do_hover(&doc, doc.position_at(11), &json).await.is_none());
    }

    #[tokio::test]
    async fn completes_missing_keys() {
        let service = service();
        let text = format!(r#"{{"$schema": "{}", "type": "page",  }}"#, SCHEMA_URI);
        let doc = document(&text);
        let json = service.parse_json_document(&doc);
        let at = text.len() - 2;
        let list = service.do_complete(&doc, doc.position_at(at), &json).await;
        assert_eq!(labels(&list), vec!["title", "visible", "body"]);
    }

    #[tokio::test]
    async fn completes_enum_values() {
        let service = service();
        let text = format!(r#"{{"$schema": "{}", "type": "p"}}"#, SCHEMA_URI);
        let doc = document(&text);
        let json = service.parse_json_document(&doc);
        let at = text.find("\"p\"").unwrap() + 2;
        let list = service.do_complete(&doc, doc.position_at(at), &json).await;
        assert_eq!(labels(&list), vec!["\"page\"", "\"form\""]);
    }

    #[tokio::test]
    async fn completes_booleans_after_colon() {
        let service = service();
        let text = format!(r#"{{"$schema": "{}", "visible": }}"#, SCHEMA_URI);
        let doc = document(&text);
        let json = service.parse_json_document(&doc);
        let at = text.len() - 2;
        let list = service.do_complete(&doc, doc.position_at(at), &json).await;
        assert_eq!(labels(&list), vec!["true", "false"]);
    }

    #[tokio::test]
    async fn completes_array_items() {
        let service = service();
        let text = format!(r#"{{"$schema": "{}", "body": [ ]}}"#, SCHEMA_URI);
        let doc = document(&text);
        let json = service.parse_json_document(&doc);
        let at = text.find("[ ").unwrap() + 1;
        let list = service.do_complete(&doc, doc.position_at(at), &json).await;
        assert_eq!(labels(&list), vec!["\"a\"", "\"b\""]);
    }

    #[tokio::test]
    async fn no_completion_in_comments() {
        let service = service();
        let text = format!("{{\"$schema\": \"{}\", /* x */ }}", SCHEMA_URI);
        let doc = document(&text);
        let json = service.parse_json_document(&doc);
        let at = text.find("x */").unwrap();
        let list = service.do_complete(&doc, doc.position_at(at), &json).await;
        assert!(list.items.is_empty());
    }
}
