//! Completion items for schema-governed JSON.

use serde_json::Value;
use tower_lsp::lsp_types::*;

use super::hover::description_of;

/// Start of the word ending at `offset`.
///
/// A word is a run of characters that cannot be JSON punctuation, so bare
/// keys and partially typed quoted strings are both covered.
pub fn current_word_start(text: &str, offset: usize) -> usize {
    let offset = offset.min(text.len());
    let Some(before) = text.get(..offset) else {
        return offset;
    };
    let word_len: usize = before
        .chars()
        .rev()
        .take_while(|c| !c.is_whitespace() && !matches!(c, '"' | ':' | '{' | '[' | ',' | ']' | '}'))
        .map(char::len_utf8)
        .sum();
    offset - word_len
}

fn documentation(text: &str) -> Documentation {
    Documentation::MarkupContent(MarkupContent {
        kind: MarkupKind::Markdown,
        value: text.to_string(),
    })
}

/// Property name proposal. With `add_value` the item also inserts the colon.
pub fn property_item(key: &str, schema: &Value, range: Range, add_value: bool) -> CompletionItem {
    let quoted = Value::String(key.to_string()).to_string();
    let new_text = if add_value {
        format!("{}: ", quoted)
    } else {
        quoted.clone()
    };

    CompletionItem {
        label: key.to_string(),
        kind: Some(CompletionItemKind::PROPERTY),
        detail: schema
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string),
        documentation: description_of(schema).map(documentation),
        filter_text: Some(quoted),
        text_edit: Some(CompletionTextEdit::Edit(TextEdit { range, new_text })),
        ..Default::default()
    }
}

/// Value proposal. The label is the JSON text of the value.
pub fn value_item(value: &Value, description: Option<&str>, range: Range) -> CompletionItem {
    let label = value.to_string();
    let kind = match value {
        Value::String(_) => CompletionItemKind::ENUM_MEMBER,
        _ => CompletionItemKind::VALUE,
    };

    CompletionItem {
        label: label.clone(),
        kind: Some(kind),
        documentation: description.map(documentation),
        filter_text: Some(label.clone()),
        text_edit: Some(CompletionTextEdit::Edit(TextEdit {
            range,
            new_text: label,
        })),
        ..Default::default()
    }
}

/// Value proposals contributed by one schema: `const`, `enum`, booleans,
/// `default` and `null`.
pub fn schema_value_items(schema: &Value, range: Range) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    let description = description_of(schema);

    if let Some(constant) = schema.get("const") {
        items.push(value_item(constant, description, range));
    }

    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        let descriptions = schema
            .get("markdownEnumDescriptions")
            .or_else(|| schema.get("enumDescriptions"))
            .and_then(Value::as_array);
        for (i, option) in options.iter().enumerate() {
            let text = descriptions
                .and_then(|d| d.get(i))
                .and_then(Value::as_str)
                .or(description);
            items.push(value_item(option, text, range));
        }
    }

    if has_type(schema, "boolean") {
        items.push(value_item(&Value::Bool(true), None, range));
        items.push(value_item(&Value::Bool(false), None, range));
    }

    if let Some(default) = schema.get("default") {
        let mut item = value_item(default, description, range);
        item.detail = Some("Default value".to_string());
        items.push(item);
    }

    if has_type(schema, "null") {
        items.push(value_item(&Value::Null, None, range));
    }

    items
}

fn has_type(schema: &Value, name: &str) -> bool {
    match schema.get("type") {
        Some(Value::String(t)) => t == name,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(name)),
        _ => false,
    }
}
