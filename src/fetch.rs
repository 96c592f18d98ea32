//! Schema loading over HTTP(S) and from local files.

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tower_lsp::lsp_types::Url;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::json::SchemaRequestService;
use crate::settings::Settings;

/// Definition every amis-style schema is narrowed to.
pub const AMIS_SCHEMA_REF: &str = "#/definitions/SchemaObject";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches schema text for the JSON language service.
pub struct SchemaFetcher {
    client: reqwest::Client,
    amis_style: RwLock<HashSet<String>>,
}

impl Default for SchemaFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            amis_style: RwLock::new(HashSet::new()),
        }
    }

    /// Remember which schema URIs get the amis-style rewrite.
    pub fn configure(&self, settings: &Settings) {
        let amis_style: HashSet<String> = settings
            .schema
            .map
            .iter()
            .filter(|binding| binding.is_amis_style_schema)
            .map(|binding| binding.schema.clone())
            .collect();
        info!("{} amis-style schema(s) configured", amis_style.len());
        *self.amis_style.write() = amis_style;
    }

    async fn fetch(&self, uri: &str) -> Result<String> {
        let url = Url::parse(uri).map_err(|_| Error::UnsupportedSchemaUri(uri.to_string()))?;
        match url.scheme() {
            "http" | "https" => {
                let response = self
                    .client
                    .get(uri)
                    .send()
                    .await
                    .map_err(|source| Error::SchemaFetch {
                        uri: uri.to_string(),
                        source,
                    })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::SchemaStatus {
                        uri: uri.to_string(),
                        status: status.as_u16(),
                    });
                }
                response.text().await.map_err(|source| Error::SchemaFetch {
                    uri: uri.to_string(),
                    source,
                })
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::UnsupportedSchemaUri(uri.to_string()))?;
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| Error::SchemaRead { path, source })
            }
            _ => Err(Error::UnsupportedSchemaUri(uri.to_string())),
        }
    }
}

#[tower_lsp::async_trait]
impl SchemaRequestService for SchemaFetcher {
    async fn request(&self, uri: &str) -> Result<String> {
        debug!("fetching schema {}", uri);
        let body = self.fetch(uri).await?;
        if self.amis_style.read().contains(uri) {
            Ok(rewrite_amis_style(body))
        } else {
            Ok(body)
        }
    }
}

/// Point the schema's root `$ref` at [`AMIS_SCHEMA_REF`].
///
/// A body that is not a JSON object is returned unchanged.
pub fn rewrite_amis_style(body: String) -> String {
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(mut schema)) => {
            schema.insert("$ref".to_string(), Value::String(AMIS_SCHEMA_REF.to_string()));
            Value::Object(schema).to_string()
        }
        _ => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{SchemaBinding, SchemaSettings};
    use serde_json::json;

    #[test]
    fn rewrites_root_ref() {
        let body = json!({"$ref": "#/definitions/Other", "definitions": {}}).to_string();
        let rewritten: Value = serde_json::from_str(&rewrite_amis_style(body)).unwrap();
        assert_eq!(rewritten["$ref"], AMIS_SCHEMA_REF);
        assert_eq!(rewritten["definitions"], json!({}));
    }

    #[test]
    fn non_json_passes_through() {
        assert_eq!(rewrite_amis_style("not json".into()), "not json");
        assert_eq!(rewrite_amis_style("[1]".into()), "[1]");
    }

    fn temp_schema(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("amis-lsp-fetch-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("schema.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn reads_file_uris_with_rewrite() {
        let path = temp_schema("rewrite", r#"{"definitions": {"SchemaObject": {}}}"#);
        let uri = Url::from_file_path(&path).unwrap().to_string();

        let fetcher = SchemaFetcher::new();
        let plain: Value = serde_json::from_str(&fetcher.request(&uri).await.unwrap()).unwrap();
        assert!(plain.get("$ref").is_none());

        fetcher.configure(&Settings {
            schema: SchemaSettings {
                map: vec![SchemaBinding {
                    label: "local".into(),
                    schema: uri.clone(),
                    is_amis_style_schema: true,
                }],
            },
            ..Default::default()
        });
        let rewritten: Value = serde_json::from_str(&fetcher.request(&uri).await.unwrap()).unwrap();
        assert_eq!(rewritten["$ref"], AMIS_SCHEMA_REF);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn rejects_unknown_locations() {
        let fetcher = SchemaFetcher::new();
        assert!(matches!(
            fetcher.request("ftp://example.com/schema.json").await,
            Err(Error::UnsupportedSchemaUri(_))
        ));
        assert!(matches!(
            fetcher.request("not a uri").await,
            Err(Error::UnsupportedSchemaUri(_))
        ));
        assert!(matches!(
            fetcher.request("file:///definitely/missing/amis-schema.json").await,
            Err(Error::SchemaRead { .. })
        ));
    }
}
