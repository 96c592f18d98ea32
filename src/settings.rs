//! Settings infrastructure for amis-lsp.
//!
//! Settings come from three places, applied in order: built-in defaults, an
//! `amis-lsp.toml` file discovered from the workspace root, and the
//! `amisLanguageServer` section the client returns for `workspace/configuration`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::CacheOptions;
use crate::error::Result;

/// File name searched for by [`discover_settings`].
pub const SETTINGS_FILE: &str = "amis-lsp.toml";

/// Configuration section requested from the client.
pub const CONFIGURATION_SECTION: &str = "amisLanguageServer";

/// Label bound by the default settings.
pub const DEFAULT_SCHEMA_LABEL: &str = "amis";

/// Schema used for regions whose label has no binding.
pub const DEFAULT_SCHEMA_URI: &str = "https://fex-team.github.io/amis-editor-demo/schema.json";

/// Root settings structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Schema binding table.
    pub schema: SchemaSettings,

    /// Publish syntax errors of embedded regions as diagnostics.
    pub validate: bool,

    /// Artifact cache tuning.
    pub cache: CacheSettings,
}

impl Settings {
    /// Look up the binding for an annotation label.
    pub fn binding(&self, label: &str) -> Option<&SchemaBinding> {
        self.schema.map.iter().find(|b| b.label == label)
    }

    /// Schema URI for a region label, falling back to [`DEFAULT_SCHEMA_URI`].
    pub fn schema_uri_for(&self, label: Option<&str>) -> &str {
        label
            .and_then(|label| self.binding(label))
            .map(|b| b.schema.as_str())
            .unwrap_or(DEFAULT_SCHEMA_URI)
    }

    /// Parse settings from the JSON value returned by the client.
    ///
    /// Accepts either the section itself or an object wrapping it under
    /// [`CONFIGURATION_SECTION`], as sent by `workspace/didChangeConfiguration`.
    pub fn from_lsp_value(value: serde_json::Value) -> Option<Self> {
        let value = match value {
            serde_json::Value::Null => return None,
            serde_json::Value::Object(mut map) if map.contains_key(CONFIGURATION_SECTION) => {
                map.remove(CONFIGURATION_SECTION)?
            }
            other => other,
        };
        match serde_json::from_value(value) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!("ignoring malformed client configuration: {}", e);
                None
            }
        }
    }
}

/// The schema binding table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaSettings {
    pub map: Vec<SchemaBinding>,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            map: vec![SchemaBinding {
                label: DEFAULT_SCHEMA_LABEL.to_string(),
                schema: DEFAULT_SCHEMA_URI.to_string(),
                is_amis_style_schema: true,
            }],
        }
    }
}

/// Maps an annotation label to a schema location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaBinding {
    /// Comment text that marks a region, e.g. `amis` for `/** amis */`.
    pub label: String,

    /// Schema location (`http(s)://` or `file://`).
    #[serde(alias = "schemaUri")]
    pub schema: String,

    /// Point the fetched schema's root `$ref` at `#/definitions/SchemaObject`.
    #[serde(default, alias = "is_amis_style_schema")]
    pub is_amis_style_schema: bool,
}

/// Artifact cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Maximum number of documents held per cache.
    #[serde(alias = "max_entries")]
    pub max_entries: usize,

    /// Seconds between age sweeps; 0 disables the sweep.
    #[serde(alias = "cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Seconds an entry may go unused before the sweep drops it.
    /// Defaults to the cleanup interval.
    #[serde(alias = "ttl_secs")]
    pub ttl_secs: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 10,
            cleanup_interval_secs: 60,
            ttl_secs: None,
        }
    }
}

impl CacheSettings {
    pub fn options(&self) -> CacheOptions {
        CacheOptions {
            max_entries: self.max_entries.max(1),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
            ttl: Duration::from_secs(self.ttl_secs.unwrap_or(self.cleanup_interval_secs)),
        }
    }
}

/// Parse settings from TOML text.
pub fn parse_settings(content: &str) -> Result<Settings> {
    Ok(toml::from_str(content)?)
}

/// Load settings from an `amis-lsp.toml` file.
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(content) => match parse_settings(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("failed to load {}: {}", path.display(), e);
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

/// Discover `amis-lsp.toml` by searching up the directory tree, then direct children.
///
/// Search order:
/// 1. Walk up from `start_dir` to filesystem root
/// 2. If not found, check immediate child directories of `start_dir`
///
/// Returns `(settings, settings_dir)` where `settings_dir` is the directory
/// containing the found file. If not found, returns `(Settings::default(), start_dir)`.
pub fn discover_settings(start_dir: &Path) -> (Settings, PathBuf) {
    // Phase 1: Walk up from start_dir
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join(SETTINGS_FILE);
        if candidate.is_file() {
            debug!("using settings from {}", candidate.display());
            return (load_settings(&candidate), dir.to_path_buf());
        }
        current = dir.parent();
    }

    // Phase 2: Check immediate child directories
    if let Ok(entries) = std::fs::read_dir(start_dir) {
        for entry in entries.flatten() {
            if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                let candidate = entry.path().join(SETTINGS_FILE);
                if candidate.is_file() {
                    debug!("using settings from {}", candidate.display());
                    return (load_settings(&candidate), entry.path());
                }
            }
        }
    }

    (Settings::default(), start_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_bind_amis_label() {
        let settings = Settings::default();
        let binding = settings.binding("amis").unwrap();
        assert_eq!(binding.schema, DEFAULT_SCHEMA_URI);
        assert!(binding.is_amis_style_schema);
        assert!(!settings.validate);
        assert_eq!(settings.cache.max_entries, 10);
    }

    #[test]
    fn parse_toml_bindings() {
        let settings = parse_settings(
            r#"
validate = true

[[schema.map]]
label = "form"
schema = "file:///schemas/form.json"

[cache]
maxEntries = 4
cleanupIntervalSecs = 0
"#,
        )
        .unwrap();

        assert!(settings.validate);
        assert_eq!(settings.schema.map.len(), 1);
        let form = settings.binding("form").unwrap();
        assert_eq!(form.schema, "file:///schemas/form.json");
        assert!(!form.is_amis_style_schema);
        assert!(settings.binding("amis").is_none());
        assert_eq!(settings.cache.max_entries, 4);

        let options = settings.cache.options();
        assert_eq!(options.cleanup_interval, Duration::ZERO);
        assert_eq!(options.ttl, Duration::ZERO);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(parse_settings("validate = [").is_err());
    }

    #[test]
    fn schema_uri_falls_back_to_default() {
        let settings = Settings::default();
        assert_eq!(settings.schema_uri_for(Some("unknown")), DEFAULT_SCHEMA_URI);
        assert_eq!(settings.schema_uri_for(None), DEFAULT_SCHEMA_URI);
    }

    #[test]
    fn client_configuration_accepts_schema_uri_alias() {
        let value = json!({
            "amisLanguageServer": {
                "schema": {
                    "map": [{ "label": "crud", "schemaUri": "https://example.com/crud.json", "isAmisStyleSchema": true }]
                }
            }
        });
        let settings = Settings::from_lsp_value(value).unwrap();
        let crud = settings.binding("crud").unwrap();
        assert_eq!(crud.schema, "https://example.com/crud.json");
        assert!(crud.is_amis_style_schema);
        assert_eq!(settings.cache, CacheSettings::default());
    }

    #[test]
    fn client_configuration_rejects_garbage() {
        assert!(Settings::from_lsp_value(json!({ "validate": "yes" })).is_none());
        assert!(Settings::from_lsp_value(serde_json::Value::Null).is_none());
    }

    #[test]
    fn discover_walks_up() {
        let root = std::env::temp_dir().join(format!("amis-lsp-discover-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(SETTINGS_FILE), "validate = true\n").unwrap();

        let (settings, dir) = discover_settings(&nested);
        assert!(settings.validate);
        assert_eq!(dir, root);

        std::fs::remove_dir_all(&root).unwrap();
    }
}
