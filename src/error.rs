//! Error taxonomy for the language server core.
//!
//! Per-request failures surface as [`Error`] values from the language modes and
//! are converted to null results at the service boundary. Nothing here is fatal
//! to the server process.

use std::path::PathBuf;

use thiserror::Error;
use tower_lsp::lsp_types::Url;

/// Errors produced by schema fetching, configuration and command handling.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure while fetching a schema over HTTP(S).
    #[error("failed to fetch schema '{uri}': {source}")]
    SchemaFetch {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    /// The schema server answered with a non-success status.
    #[error("schema '{uri}' returned HTTP status {status}")]
    SchemaStatus { uri: String, status: u16 },

    /// A `file://` schema could not be read.
    #[error("failed to read schema file '{}': {source}", .path.display())]
    SchemaRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The schema body is not valid JSON.
    #[error("schema '{uri}' is not valid JSON: {source}")]
    SchemaParse {
        uri: String,
        #[source]
        source: serde_json::Error,
    },

    /// The schema location uses a scheme we cannot load.
    #[error("unsupported schema location '{0}'")]
    UnsupportedSchemaUri(String),

    /// A command referenced a document that is not open.
    #[error("no open document for {0}")]
    DocumentNotFound(Url),

    /// A command referenced a region index the document does not have.
    #[error("document {uri} has no embedded region {index}")]
    RegionNotFound { uri: Url, index: usize },

    /// A command was invoked with arguments of the wrong shape.
    #[error("invalid arguments for command '{command}': {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    /// No mode handles the requested command.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A settings file could not be parsed.
    #[error("failed to parse settings: {0}")]
    Settings(#[from] toml::de::Error),
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_resource() {
        let err = Error::SchemaStatus {
            uri: "https://example.com/schema.json".to_string(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "schema 'https://example.com/schema.json' returned HTTP status 404"
        );

        let uri = Url::parse("file:///tmp/page.ts").unwrap();
        let err = Error::RegionNotFound { uri, index: 3 };
        assert_eq!(
            err.to_string(),
            "document file:///tmp/page.ts has no embedded region 3"
        );
    }
}
