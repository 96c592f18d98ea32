//! Diagnostics conversion from JSON syntax errors to LSP diagnostics.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString};

use crate::document::LineIndex;
use crate::json::ast::{ErrorCode, SyntaxError};

pub const DIAGNOSTIC_SOURCE: &str = "amis-json";

/// Convert syntax errors to LSP diagnostics.
///
/// Duplicate keys are reported as warnings, everything else as errors.
pub fn syntax_diagnostics(errors: &[SyntaxError], line_index: &LineIndex) -> Vec<Diagnostic> {
    errors
        .iter()
        .map(|error| {
            let severity = match error.code {
                ErrorCode::DuplicateKey => DiagnosticSeverity::WARNING,
                _ => DiagnosticSeverity::ERROR,
            };

            Diagnostic {
                range: line_index.span_to_range(&error.span),
                severity: Some(severity),
                code: Some(NumberOrString::Number(error.code.code() as i32)),
                code_description: None,
                source: Some(DIAGNOSTIC_SOURCE.to_string()),
                message: error.message.clone(),
                related_information: None,
                tags: None,
                data: None,
            }
        })
        .collect()
}
