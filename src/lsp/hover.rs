//! Hover content built from JSON Schema annotations.

use serde_json::Value;
use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Range};

/// Description text of a schema, preferring `markdownDescription`.
pub(crate) fn description_of(schema: &Value) -> Option<&str> {
    schema
        .get("markdownDescription")
        .or_else(|| schema.get("description"))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

/// Description attached to `value` through `enumDescriptions`.
fn enum_description<'a>(schema: &'a Value, value: &Value) -> Option<&'a str> {
    let options = schema.get("enum")?.as_array()?;
    let index = options.iter().position(|option| option == value)?;
    schema
        .get("markdownEnumDescriptions")
        .or_else(|| schema.get("enumDescriptions"))
        .and_then(|descriptions| descriptions.get(index))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

/// Combine the first title, description and enum value description found in
/// `schemas`. Returns `None` when none of them is present.
pub fn schema_hover_markdown(schemas: &[&Value], value: Option<&Value>) -> Option<String> {
    let title = schemas
        .iter()
        .find_map(|s| s.get("title").and_then(Value::as_str).filter(|t| !t.is_empty()));
    let description = schemas.iter().find_map(|s| description_of(s));
    let enum_value = value.and_then(|value| {
        schemas
            .iter()
            .find_map(|s| enum_description(s, value))
            .map(|text| (value, text))
    });

    let mut sections = Vec::new();
    if let Some(title) = title {
        sections.push(format!("**{}**", title));
    }
    if let Some(description) = description {
        sections.push(description.to_string());
    }
    if let Some((value, text)) = enum_value {
        sections.push(format!("`{}`: {}", value, text));
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

pub fn markdown_hover(markdown: String, range: Range) -> Hover {
    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: markdown,
        }),
        range: Some(range),
    }
}
