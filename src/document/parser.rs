//! Extraction of annotated object literals from TypeScript/JavaScript sources.
//!
//! The host text is parsed with tree-sitter. Any node preceded by a comment
//! whose text equals a bound schema label (e.g. `/** amis */`) is searched for
//! the object literal it annotates, which becomes an [`EmbeddedRegion`].
//!
//! ```text
//! /** amis */
//! const page = { type: "page", body: tpl };
//!              ^^^^^^^^^^^^^^^^^^^^^^^^^^ region
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, warn};
use tree_sitter::{Node, Parser};

use crate::cache::DocumentParser;
use crate::settings::{SchemaBinding, Settings};

use super::region::{
    mask_prefix, EmbeddedRegion, PropertyCorrection, RegionType, TextSpan, AMIS_JSON_LANGUAGE_ID,
};
use super::regions::DocumentRegions;
use super::text::TextDocument;

/// Subtrees nested deeper than this are skipped.
pub const MAX_REGION_DEPTH: usize = 256;

/// Grammar used to parse the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostDialect {
    TypeScript,
    Tsx,
}

impl HostDialect {
    /// Pick the grammar from the document's language tag, then its file extension.
    pub fn for_document(document: &TextDocument) -> Self {
        match document.language_id() {
            "typescriptreact" | "javascriptreact" => return Self::Tsx,
            "typescript" | "javascript" => return Self::TypeScript,
            _ => {}
        }
        let path = document.uri().path();
        if path.ends_with(".tsx") || path.ends_with(".jsx") {
            Self::Tsx
        } else {
            Self::TypeScript
        }
    }

    fn language(self) -> tree_sitter::Language {
        match self {
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

/// Find every annotated region of `text`, in ascending order.
///
/// Regions never nest: once a node yields a region its subtree is not visited.
/// Parser failures produce an empty list.
pub fn parse_regions(
    text: &str,
    dialect: HostDialect,
    bindings: &[SchemaBinding],
) -> Vec<EmbeddedRegion> {
    if bindings.is_empty() {
        return Vec::new();
    }

    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&dialect.language()) {
        error!("failed to load host grammar: {}", e);
        return Vec::new();
    }
    let Some(tree) = parser.parse(text, None) else {
        error!("host parser produced no syntax tree");
        return Vec::new();
    };

    let mut extractor = RegionExtractor {
        text,
        bindings,
        regions: Vec::new(),
    };
    extractor.visit_children(tree.root_node(), 0);
    extractor.regions
}

struct RegionExtractor<'a> {
    text: &'a str,
    bindings: &'a [SchemaBinding],
    regions: Vec<EmbeddedRegion>,
}

impl<'a> RegionExtractor<'a> {
    fn source(&self, node: Node) -> &'a str {
        &self.text[node.start_byte()..node.end_byte()]
    }

    fn visit_children(&mut self, node: Node, depth: usize) {
        if depth > MAX_REGION_DEPTH {
            warn!(
                offset = node.start_byte(),
                "syntax tree too deep, skipping subtree"
            );
            return;
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();

        // Comments directly preceding the current child, separated only by whitespace.
        let mut comments: Vec<Node> = Vec::new();
        for child in children {
            if child.kind() == "comment" {
                if !comments
                    .last()
                    .is_some_and(|prev| self.only_whitespace_between(*prev, child))
                {
                    comments.clear();
                }
                comments.push(child);
                continue;
            }

            let annotation = comments
                .last()
                .filter(|last| self.only_whitespace_between(**last, child))
                .and_then(|_| {
                    comments
                        .iter()
                        .rev()
                        .find_map(|comment| self.binding_for(*comment).map(|b| (*comment, b)))
                });
            comments.clear();

            if let Some((comment, binding)) = annotation {
                if let Some(object) = qualifying_object(child, depth) {
                    self.emit(object, comment, binding);
                    continue;
                }
            }
            self.visit_children(child, depth + 1);
        }
    }

    fn only_whitespace_between(&self, before: Node, after: Node) -> bool {
        self.text
            .get(before.end_byte()..after.start_byte())
            .is_some_and(|gap| gap.chars().all(char::is_whitespace))
    }

    fn binding_for(&self, comment: Node) -> Option<&'a SchemaBinding> {
        let label = annotation_label(self.source(comment));
        self.bindings.iter().find(|b| b.label == label)
    }

    fn emit(&mut self, object: Node, comment: Node, binding: &SchemaBinding) {
        let start = object.start_byte();
        let end = object.end_byte();
        self.regions.push(EmbeddedRegion {
            start,
            end,
            language_id: AMIS_JSON_LANGUAGE_ID.to_string(),
            region_type: RegionType::Custom,
            schema: Some(binding.label.clone()),
            schema_uri: Some(binding.schema.clone()),
            text: Some(mask_prefix(self.text, start, end)),
            meta: self.corrections(object),
            annotation: Some(comment.start_byte()..comment.end_byte()),
        });
    }

    /// Property Correction Records for the immediate pairs of `object`.
    fn corrections(&self, object: Node) -> Vec<PropertyCorrection> {
        let mut cursor = object.walk();
        object
            .named_children(&mut cursor)
            .filter(|child| child.kind() == "pair")
            .filter_map(|pair| {
                let key = pair.child_by_field_name("key")?;
                let value = pair.child_by_field_name("value")?;
                let content = self.unquoted_literal(value)?;
                Some(PropertyCorrection {
                    range: pair.start_byte()..pair.end_byte(),
                    key: TextSpan {
                        range: key.start_byte()..key.end_byte(),
                        value: self.source(key).to_string(),
                    },
                    value: TextSpan {
                        range: value.start_byte()..value.end_byte(),
                        value: content.to_string(),
                    },
                })
            })
            .collect()
    }

    /// Content of a value token a strict JSON parser rejects, if it is a literal.
    fn unquoted_literal(&self, value: Node) -> Option<&'a str> {
        let raw = self.source(value);
        match value.kind() {
            "identifier" => Some(raw),
            "string" if raw.starts_with('\'') => strip_delimiters(raw),
            "template_string" => {
                let mut cursor = value.walk();
                let interpolated = value
                    .named_children(&mut cursor)
                    .any(|c| c.kind() == "template_substitution");
                if interpolated {
                    None
                } else {
                    strip_delimiters(raw)
                }
            }
            _ => None,
        }
    }
}

fn strip_delimiters(raw: &str) -> Option<&str> {
    if raw.len() >= 2 {
        raw.get(1..raw.len() - 1)
    } else {
        None
    }
}

/// The object literal an annotated node refers to.
///
/// Tries the node's natural target first (pair value, export, first declarator,
/// assignment right-hand side). If that is missing or not an object literal,
/// falls back to the first object literal found by preorder descent, which may
/// be a nested literal for unusual annotation placements.
fn qualifying_object(node: Node, depth: usize) -> Option<Node> {
    let target = match node.kind() {
        "pair" => node.child_by_field_name("value"),
        "export_statement" => node.child_by_field_name("value").or_else(|| {
            node.child_by_field_name("declaration")
                .and_then(first_declarator_value)
        }),
        "lexical_declaration" | "variable_declaration" => first_declarator_value(node),
        "expression_statement" => node
            .named_child(0)
            .filter(|expr| expr.kind() == "assignment_expression")
            .and_then(|expr| expr.child_by_field_name("right")),
        "assignment_expression" => node.child_by_field_name("right"),
        _ => None,
    };

    target
        .filter(|n| n.kind() == "object")
        .or_else(|| first_object(node, depth))
}

fn first_declarator_value(declaration: Node) -> Option<Node> {
    let mut cursor = declaration.walk();
    let declarator = declaration
        .named_children(&mut cursor)
        .find(|c| c.kind() == "variable_declarator")?;
    declarator.child_by_field_name("value")
}

fn first_object(node: Node, depth: usize) -> Option<Node> {
    if depth > MAX_REGION_DEPTH {
        warn!(
            offset = node.start_byte(),
            "syntax tree too deep, skipping subtree"
        );
        return None;
    }
    if node.kind() == "object" {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| !c.is_extra())
        .find_map(|c| first_object(c, depth + 1))
}

/// Normalize comment text for label comparison.
///
/// Strips `//`, `/* */` and JSDoc `*` decoration, joining remaining lines with a space.
pub fn annotation_label(comment: &str) -> String {
    let body = if let Some(line) = comment.strip_prefix("//") {
        line
    } else {
        let inner = comment.strip_prefix("/*").unwrap_or(comment);
        inner.strip_suffix("*/").unwrap_or(inner)
    };

    body.lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// [`DocumentParser`] producing the region index of a document.
pub struct RegionParser {
    bindings: RwLock<Arc<[SchemaBinding]>>,
}

impl RegionParser {
    pub fn new(settings: &Settings) -> Self {
        Self {
            bindings: RwLock::new(settings.schema.map.clone().into()),
        }
    }
}

impl DocumentParser<DocumentRegions> for RegionParser {
    fn parse(&self, document: &Arc<TextDocument>) -> DocumentRegions {
        let bindings = Arc::clone(&self.bindings.read());
        let regions = parse_regions(
            document.text(),
            HostDialect::for_document(document),
            &bindings,
        );
        DocumentRegions::new(Arc::clone(document), regions)
    }

    fn configure(&self, settings: &Settings) {
        *self.bindings.write() = settings.schema.map.clone().into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Vec<SchemaBinding> {
        Settings::default().schema.map
    }

    fn regions(text: &str) -> Vec<EmbeddedRegion> {
        parse_regions(text, HostDialect::TypeScript, &bindings())
    }

    fn region_source<'a>(text: &'a str, region: &EmbeddedRegion) -> &'a str {
        &text[region.start..region.end]
    }

    #[test]
    fn annotated_declaration() {
        let text = "/** amis */\nconst obj = {\n    type: \"page\"\n};\n";
        let found = regions(text);
        assert_eq!(found.len(), 1);
        let region = &found[0];
        assert_eq!(region_source(text, region), "{\n    type: \"page\"\n}");
        assert_eq!(region.schema.as_deref(), Some("amis"));
        assert_eq!(region.language_id, AMIS_JSON_LANGUAGE_ID);
        assert_eq!(region.region_type, RegionType::Custom);
        assert_eq!(region.annotation, Some(0..11));
        assert!(region.meta.is_empty());
    }

    #[test]
    fn deep_nesting_is_skipped_and_siblings_survive() {
        let depth = MAX_REGION_DEPTH + 44;
        let text = format!(
            "const deep = {}/** amis */ {{ type: \"form\" }}{};\n/** amis */\nconst a = {{}};\n",
            "[".repeat(depth),
            "]".repeat(depth),
        );
        let found = regions(&text);
        assert_eq!(found.len(), 1);
        assert_eq!(region_source(&text, &found[0]), "{}");
    }

    #[test]
    fn unannotated_objects_are_ignored() {
        let text = "const a = { type: 'page' };\n/* other */\nconst b = {};\n";
        assert!(regions(text).is_empty());
    }

    #[test]
    fn annotation_must_be_adjacent() {
        let text = "/** amis */\nfoo();\nconst a = { type: 'page' };\n";
        let found = regions(text);
        assert!(found.is_empty());
    }

    #[test]
    fn comment_styles() {
        for text in [
            "// amis\nconst a = {};",
            "/* amis */ const a = {};",
            "/**\n * amis\n */\nconst a = {};",
        ] {
            let found = regions(text);
            assert_eq!(found.len(), 1, "{text}");
            assert_eq!(region_source(text, &found[0]), "{}");
        }
    }

    #[test]
    fn export_default_and_assignment() {
        let text = "/** amis */\nexport default { type: 'page' };\n/** amis */\nmodule.exports = { type: 'form' };\n";
        let found = regions(text);
        assert_eq!(found.len(), 2);
        assert_eq!(region_source(text, &found[0]), "{ type: 'page' }");
        assert_eq!(region_source(text, &found[1]), "{ type: 'form' }");
        assert!(found[0].end <= found[1].start);
    }

    #[test]
    fn exported_declaration() {
        let text = "/** amis */\nexport const schema = { type: 'crud' };";
        let found = regions(text);
        assert_eq!(found.len(), 1);
        assert_eq!(region_source(text, &found[0]), "{ type: 'crud' }");
    }

    #[test]
    fn annotated_property_inside_plain_object() {
        let text = "const config = {\n  name: 'x',\n  /** amis */\n  body: { type: 'tpl' },\n};";
        let found = regions(text);
        assert_eq!(found.len(), 1);
        assert_eq!(region_source(text, &found[0]), "{ type: 'tpl' }");
    }

    #[test]
    fn regions_do_not_nest() {
        let text = "/** amis */\nconst a = {\n  /** amis */\n  body: { type: 'tpl' },\n};";
        let found = regions(text);
        assert_eq!(found.len(), 1);
        assert!(region_source(text, &found[0]).starts_with("{\n  /** amis */"));
    }

    #[test]
    fn fallback_finds_object_in_call() {
        let text = "/** amis */\nconst a = wrap({ type: 'page' });";
        let found = regions(text);
        assert_eq!(found.len(), 1);
        assert_eq!(region_source(text, &found[0]), "{ type: 'page' }");
    }

    #[test]
    fn annotated_node_without_object_yields_nothing() {
        let text = "/** amis */\nconst a = 1;\nconst b = 2;";
        assert!(regions(text).is_empty());
    }

    #[test]
    fn unknown_label_is_ignored() {
        let text = "/** form */\nconst a = {};";
        assert!(regions(text).is_empty());
    }

    #[test]
    fn corrections_for_unquoted_values() {
        let text = "/** amis */\nconst a = { type: page, label: 'Hi', tpl: `x`, n: 1, s: \"q\", t: `${v}` };";
        let found = regions(text);
        assert_eq!(found.len(), 1);
        let meta = &found[0].meta;
        let values: Vec<(&str, &str)> = meta
            .iter()
            .map(|c| (c.key.value.as_str(), c.value.value.as_str()))
            .collect();
        assert_eq!(values, vec![("type", "page"), ("label", "Hi"), ("tpl", "x")]);

        let page = &meta[0];
        assert_eq!(&text[page.range.clone()], "type: page");
        assert_eq!(&text[page.key.range.clone()], "type");
        assert_eq!(&text[page.value.range.clone()], "page");
        assert_eq!(&text[meta[1].value.range.clone()], "'Hi'");
    }

    #[test]
    fn masked_text_matches_region_end() {
        let text = "let x = 1;\n/** amis */\nconst a = { type: 'page' };\n";
        let found = regions(text);
        let region = &found[0];
        let masked = region.text.as_deref().unwrap();
        assert_eq!(masked.len(), region.end);
        assert_eq!(&masked[region.start..], region_source(text, region));
        assert!(masked[..region.start]
            .chars()
            .all(|c| c == ' ' || c == '\n'));
    }

    #[test]
    fn broken_source_does_not_panic() {
        let text = "/** amis */\nconst a = { type: 'page', body: [ ;\n/** amis */ const b = {";
        let found = regions(text);
        let mut previous_end = 0;
        for region in &found {
            assert!(region.start >= previous_end);
            assert!(region.end <= text.len());
            previous_end = region.end;
        }
    }

    #[test]
    fn labels_are_normalized() {
        assert_eq!(annotation_label("/** amis */"), "amis");
        assert_eq!(annotation_label("// amis "), "amis");
        assert_eq!(annotation_label("/*\n * amis\n */"), "amis");
        assert_eq!(annotation_label("/* a b */"), "a b");
    }

    #[test]
    fn tsx_dialect_from_extension() {
        let uri = tower_lsp::lsp_types::Url::parse("file:///view.tsx").unwrap();
        let doc = TextDocument::new(uri, "plaintext", 1, "");
        assert_eq!(HostDialect::for_document(&doc), HostDialect::Tsx);
    }

    #[test]
    fn tsx_source_with_jsx() {
        let text = "/** amis */\nconst a = { type: 'page' };\nconst el = <div>{a.type}</div>;";
        let found = parse_regions(text, HostDialect::Tsx, &bindings());
        assert_eq!(found.len(), 1);
    }
}
