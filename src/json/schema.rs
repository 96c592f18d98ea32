//! Schema loading and navigation.
//!
//! Schemas are resolved once per URI and shared. Navigation maps a JSON path
//! in a document to every subschema that applies to it, following local
//! `$ref` pointers and the applicator keywords used by editor schemas.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::ast::{JsonDocument, NodeId, NodeKind, PathStep, Segment};
use crate::error::{Error, Result};

/// Nesting bound for `$ref` chains and applicator expansion.
const MAX_SCHEMA_DEPTH: usize = 32;

/// Loads schema text for a URI.
#[tower_lsp::async_trait]
pub trait SchemaRequestService: Send + Sync {
    async fn request(&self, uri: &str) -> Result<String>;
}

/// Resolved schemas, memoised per URI.
///
/// Inline schemas are served directly. Other URIs go through the request
/// service once; a failed request is not memoised, so the next lookup retries.
pub struct SchemaStore {
    request: Arc<dyn SchemaRequestService>,
    inline: RwLock<HashMap<String, Arc<Value>>>,
    resolved: DashMap<String, Arc<OnceCell<Arc<Value>>>>,
}

impl SchemaStore {
    pub fn new(request: Arc<dyn SchemaRequestService>) -> Self {
        Self {
            request,
            inline: RwLock::new(HashMap::new()),
            resolved: DashMap::new(),
        }
    }

    /// Replace inline schemas and forget every resolved schema.
    pub fn reset(&self, inline: HashMap<String, Arc<Value>>) {
        *self.inline.write() = inline;
        self.resolved.clear();
    }

    pub async fn get(&self, uri: &str) -> Result<Arc<Value>> {
        if let Some(schema) = self.inline.read().get(uri) {
            return Ok(Arc::clone(schema));
        }

        let cell = Arc::clone(self.resolved.entry(uri.to_string()).or_default().value());
        let schema = cell
            .get_or_try_init(|| async {
                debug!("loading schema {}", uri);
                let body = self.request.request(uri).await?;
                let value: Value =
                    serde_json::from_str(&body).map_err(|source| Error::SchemaParse {
                        uri: uri.to_string(),
                        source,
                    })?;
                Ok::<_, Error>(Arc::new(value))
            })
            .await?;
        Ok(Arc::clone(schema))
    }

    /// Resolve a schema, logging failures instead of returning them.
    pub async fn get_or_log(&self, uri: &str) -> Option<Arc<Value>> {
        match self.get(uri).await {
            Ok(schema) => Some(schema),
            Err(e) => {
                warn!("schema unavailable: {}", e);
                None
            }
        }
    }
}

/// Walks one root schema.
pub struct SchemaNavigator<'s> {
    root: &'s Value,
}

impl<'s> SchemaNavigator<'s> {
    pub fn new(root: &'s Value) -> Self {
        Self { root }
    }

    /// Every subschema applying to the node reached by `path`.
    pub fn schemas_for_path(&self, doc: &JsonDocument, path: &[PathStep]) -> Vec<&'s Value> {
        let mut current = Vec::new();
        self.expand(self.root, doc.root(), doc, &mut current, 0);

        for step in path {
            let mut next = Vec::new();
            for schema in &current {
                for child in self.child_schemas(schema, &step.segment) {
                    self.expand(child, step.node, doc, &mut next, 0);
                }
            }
            dedup_by_identity(&mut next);
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }

    /// Follow a local `$ref`, returning the target.
    pub fn resolve_ref<'v>(&self, schema: &'v Value) -> &'v Value
    where
        's: 'v,
    {
        let mut schema = schema;
        for _ in 0..MAX_SCHEMA_DEPTH {
            let Some(reference) = schema.get("$ref").and_then(Value::as_str) else {
                break;
            };
            match self.pointer(reference) {
                Some(target) => schema = target,
                None => break,
            }
        }
        schema
    }

    fn pointer(&self, reference: &str) -> Option<&'s Value> {
        let fragment = reference.strip_prefix('#')?;
        if fragment.is_empty() {
            Some(self.root)
        } else {
            self.root.pointer(fragment)
        }
    }

    fn expand(
        &self,
        schema: &'s Value,
        instance: Option<NodeId>,
        doc: &JsonDocument,
        out: &mut Vec<&'s Value>,
        depth: usize,
    ) {
        if depth > MAX_SCHEMA_DEPTH || !schema.is_object() {
            return;
        }
        let schema = self.resolve_ref(schema);
        if !schema.is_object() {
            return;
        }
        out.push(schema);

        if let Some(all) = schema.get("allOf").and_then(Value::as_array) {
            for member in all {
                self.expand(member, instance, doc, out, depth + 1);
            }
        }

        for keyword in ["anyOf", "oneOf"] {
            let Some(alternatives) = schema.get(keyword).and_then(Value::as_array) else {
                continue;
            };
            let matching: Vec<&'s Value> = alternatives
                .iter()
                .filter(|alt| instance.is_none_or_match(|node| self.matches(alt, node, doc)))
                .collect();
            let chosen: Vec<&'s Value> = if matching.is_empty() {
                alternatives.iter().collect()
            } else {
                matching
            };
            for alt in chosen {
                self.expand(alt, instance, doc, out, depth + 1);
            }
        }

        if let (Some(condition), Some(node)) = (schema.get("if"), instance) {
            let branch = if self.matches(condition, node, doc) {
                schema.get("then")
            } else {
                schema.get("else")
            };
            if let Some(branch) = branch {
                self.expand(branch, instance, doc, out, depth + 1);
            }
        }
    }

    fn child_schemas(&self, schema: &'s Value, segment: &Segment) -> Vec<&'s Value> {
        let mut children = Vec::new();
        match segment {
            Segment::Key(key) => {
                if let Some(property) = schema.get("properties").and_then(|p| p.get(key)) {
                    children.push(property);
                }
                if let Some(patterns) = schema.get("patternProperties").and_then(Value::as_object) {
                    for (pattern, sub) in patterns {
                        match Regex::new(pattern) {
                            Ok(re) if re.is_match(key) => children.push(sub),
                            Ok(_) => {}
                            Err(e) => debug!("ignoring pattern '{}': {}", pattern, e),
                        }
                    }
                }
                if children.is_empty() {
                    if let Some(additional) = schema.get("additionalProperties") {
                        children.push(additional);
                    }
                }
            }
            Segment::Index(index) => {
                let tuple = schema
                    .get("prefixItems")
                    .or_else(|| schema.get("items").filter(|items| items.is_array()))
                    .and_then(Value::as_array);
                match tuple.and_then(|items| items.get(*index)) {
                    Some(item) => children.push(item),
                    None => {
                        let rest = schema
                            .get("items")
                            .filter(|items| items.is_object())
                            .or_else(|| schema.get("additionalItems"));
                        if let Some(rest) = rest {
                            children.push(rest);
                        }
                    }
                }
            }
        }
        children
    }

    /// Cheap structural match used to choose between alternatives.
    ///
    /// Checks `type`, `const`, `enum`, and `const`/`enum` constraints of the
    /// object's properties that are present in the instance.
    pub fn matches(&self, schema: &Value, node: NodeId, doc: &JsonDocument) -> bool {
        let schema = self.resolve_ref(schema);
        let Some(schema) = schema.as_object() else {
            return schema.as_bool().unwrap_or(true);
        };

        if let Some(expected) = schema.get("type") {
            let actual = instance_type(doc, node);
            let accepted = match expected {
                Value::String(t) => type_accepts(t, actual, doc, node),
                Value::Array(types) => types
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|t| type_accepts(t, actual, doc, node)),
                _ => true,
            };
            if !accepted {
                return false;
            }
        }

        let value = doc.to_value(node);
        if let Some(constant) = schema.get("const") {
            if *constant != value {
                return false;
            }
        }
        if let Some(options) = schema.get("enum").and_then(Value::as_array) {
            if !options.contains(&value) {
                return false;
            }
        }

        if let (Some(properties), NodeKind::Object { .. }) =
            (schema.get("properties").and_then(Value::as_object), &doc.node(node).kind)
        {
            for (key, sub) in properties {
                let Some(property) = doc.property(node, key) else {
                    continue;
                };
                let Some(value_node) = doc.property_value(property) else {
                    continue;
                };
                let sub = self.resolve_ref(sub);
                let actual = doc.to_value(value_node);
                if let Some(constant) = sub.get("const") {
                    if *constant != actual {
                        return false;
                    }
                }
                if let Some(options) = sub.get("enum").and_then(Value::as_array) {
                    if !options.contains(&actual) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

trait OptionNodeExt {
    fn is_none_or_match(self, f: impl FnOnce(NodeId) -> bool) -> bool;
}

impl OptionNodeExt for Option<NodeId> {
    fn is_none_or_match(self, f: impl FnOnce(NodeId) -> bool) -> bool {
        match self {
            Some(node) => f(node),
            None => true,
        }
    }
}

fn instance_type(doc: &JsonDocument, node: NodeId) -> &'static str {
    doc.node(node).type_name()
}

fn type_accepts(expected: &str, actual: &str, doc: &JsonDocument, node: NodeId) -> bool {
    match (expected, actual) {
        ("integer", "number") => matches!(
            doc.node(node).kind,
            NodeKind::Number {
                is_integer: true,
                ..
            }
        ),
        (expected, actual) => expected == actual,
    }
}

fn dedup_by_identity(schemas: &mut Vec<&Value>) {
    let mut seen: Vec<*const Value> = Vec::with_capacity(schemas.len());
    schemas.retain(|schema| {
        let ptr = *schema as *const Value;
        if seen.contains(&ptr) {
            false
        } else {
            seen.push(ptr);
            true
        }
    });
}
