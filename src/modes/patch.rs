//! Post-processing of region ASTs.
//!
//! Regions are JavaScript object literals, so the JSON parser reports errors
//! and drops values for shorthand it cannot read. These steps repair the
//! parsed document before it reaches hover and completion.

use crate::document::PropertyCorrection;
use crate::json::{AstNode, ErrorCode, JsonDocument, NodeId, NodeKind, SCHEMA_PROPERTY};

/// Error codes that shorthand object-literal syntax produces and that are not
/// reported for regions.
pub const SUPPRESSED_ERROR_CODES: [ErrorCode; 3] = [
    ErrorCode::Undefined,
    ErrorCode::CommaOrCloseBraceExpected,
    ErrorCode::TrailingComma,
];

/// Add a `$schema` property as the first child of an object root.
///
/// The synthetic key and value are zero-length nodes at the root offset, so
/// position lookups never land on them. Returns whether a property was added.
pub fn insert_schema(doc: &mut JsonDocument, schema_uri: &str) -> bool {
    let Some(root) = doc.root() else {
        return false;
    };
    if !matches!(doc.node(root).kind, NodeKind::Object { .. })
        || doc.property(root, SCHEMA_PROPERTY).is_some()
    {
        return false;
    }

    let offset = doc.node(root).offset;
    let property = doc.push(AstNode {
        offset,
        length: 0,
        parent: Some(root),
        kind: NodeKind::Null,
    });
    let key = doc.push(AstNode {
        offset,
        length: 0,
        parent: Some(property),
        kind: NodeKind::String {
            value: SCHEMA_PROPERTY.to_string(),
        },
    });
    let value = doc.push(AstNode {
        offset,
        length: 0,
        parent: Some(property),
        kind: NodeKind::String {
            value: schema_uri.to_string(),
        },
    });
    doc.node_mut(property).kind = NodeKind::Property {
        key,
        value: Some(value),
        colon_offset: None,
    };
    if let NodeKind::Object { properties } = &mut doc.node_mut(root).kind {
        properties.insert(0, property);
    }
    true
}

/// Give every valueless property the string value recorded by a correction.
///
/// The correction used is the last one whose range covers the property. The
/// property is extended over the attached value. Returns the number of values
/// attached.
pub fn patch_json_ast(doc: &mut JsonDocument, corrections: &[PropertyCorrection]) -> usize {
    let targets: Vec<(NodeId, &PropertyCorrection)> = (0..doc.len())
        .map(NodeId)
        .filter_map(|id| {
            let node = doc.node(id);
            let NodeKind::Property { value: None, .. } = node.kind else {
                return None;
            };
            let correction = corrections
                .iter()
                .rev()
                .find(|c| c.range.start <= node.offset && c.range.end >= node.end())?;
            Some((id, correction))
        })
        .collect();

    for (property, correction) in &targets {
        let span = &correction.value.range;
        let value = doc.push(AstNode {
            offset: span.start,
            length: span.end - span.start,
            parent: Some(*property),
            kind: NodeKind::String {
                value: correction.value.value.clone(),
            },
        });
        let node = doc.node_mut(*property);
        if let NodeKind::Property { value: slot, .. } = &mut node.kind {
            *slot = Some(value);
        }
        node.length = node.length.max(span.end.saturating_sub(node.offset));
    }
    targets.len()
}

/// Copy of `doc` without the errors in [`SUPPRESSED_ERROR_CODES`].
pub fn filter_errors(doc: &JsonDocument) -> JsonDocument {
    let mut filtered = doc.clone();
    filtered
        .syntax_errors
        .retain(|error| !SUPPRESSED_ERROR_CODES.contains(&error.code));
    filtered
}
