//! Mode for host-language positions.

use super::{Capability, LanguageMode};

/// Answers every request with its null result.
///
/// Registered for the host language so positions outside embedded regions
/// resolve to a mode instead of nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMode;

#[tower_lsp::async_trait]
impl LanguageMode for NullMode {
    fn id(&self) -> &str {
        ""
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(
            capability,
            Capability::Hover
                | Capability::Completion
                | Capability::SignatureHelp
                | Capability::References
        )
    }
}
