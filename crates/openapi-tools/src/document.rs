//! `OpenAPI` document loading.
//!
//! The document is loaded once at startup and never mutated afterwards (reload =
//! restart), so the parsed root can be shared freely across sessions.

use crate::error::{ApiLinkError, Result};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// A parsed `OpenAPI` document: the root of all reference resolution.
#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    location: String,
    root: Arc<Value>,
}

impl OpenApiDocument {
    /// Load a document from a file path or an http(s) URL.
    ///
    /// JSON is a valid subset of YAML, so parsing with `serde_yaml` alone covers both
    /// formats.
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be read/fetched or the content does not
    /// parse as a mapping-rooted document. Both are fatal startup conditions.
    pub async fn load(location: &str) -> Result<Self> {
        let content = if location.starts_with("http://") || location.starts_with("https://") {
            tracing::info!("fetching OpenAPI document from {location}");
            let url = Url::parse(location).map_err(|e| {
                ApiLinkError::OpenApi(format!("Invalid OpenAPI document URL '{location}': {e}"))
            })?;
            let resp = reqwest::Client::new().get(url).send().await.map_err(|e| {
                ApiLinkError::SpecFetch {
                    url: location.to_string(),
                    message: e.to_string(),
                }
            })?;
            resp.text().await.map_err(|e| ApiLinkError::SpecFetch {
                url: location.to_string(),
                message: e.to_string(),
            })?
        } else {
            tracing::info!("loading OpenAPI document from {location}");
            std::fs::read_to_string(location).map_err(|e| ApiLinkError::SpecReadFile {
                path: location.to_string(),
                source: e,
            })?
        };

        let root: Value =
            serde_yaml::from_str(&content).map_err(|e| ApiLinkError::SpecParse {
                location: location.to_string(),
                source: e,
            })?;

        Self::from_parts(location.to_string(), root)
    }

    /// Build a document from an already-parsed value (tests, embedded specs).
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not an object.
    pub fn from_value(root: Value) -> Result<Self> {
        Self::from_parts("<inline>".to_string(), root)
    }

    fn from_parts(location: String, root: Value) -> Result<Self> {
        if !root.is_object() {
            return Err(ApiLinkError::OpenApi(format!(
                "Document root of '{location}' is not an object",
            )));
        }
        Ok(Self {
            location,
            root: Arc::new(root),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The `info.title` of the document, if present.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.root.pointer("/info/title").and_then(Value::as_str)
    }

    /// The first absolute server URL declared by the document, if any.
    ///
    /// Relative server URLs (e.g. "/api/v3") are resolved against the document URL
    /// when the document itself was fetched over HTTP; otherwise they are ignored and
    /// the caller must configure a base URL explicitly.
    #[must_use]
    pub fn default_server_url(&self) -> Option<String> {
        let server = self
            .root
            .pointer("/servers/0/url")
            .and_then(Value::as_str)?;

        if server.starts_with("http://") || server.starts_with("https://") {
            return Some(server.to_string());
        }

        if self.location.starts_with("http://") || self.location.starts_with("https://") {
            let mut doc_url = Url::parse(&self.location).ok()?;
            doc_url.set_fragment(None);
            return doc_url.join(server).ok().map(|u| u.to_string());
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write as _;

    #[test]
    fn from_value_rejects_non_object_root() {
        assert!(OpenApiDocument::from_value(json!([1, 2, 3])).is_err());
        assert!(OpenApiDocument::from_value(json!({"openapi": "3.0.0"})).is_ok());
    }

    #[tokio::test]
    async fn load_reads_json_and_yaml_files() {
        let mut json_file = tempfile::NamedTempFile::new().expect("temp file");
        write!(json_file, r#"{{"openapi":"3.0.0","info":{{"title":"t"}}}}"#).expect("write");
        let doc = OpenApiDocument::load(json_file.path().to_str().expect("utf-8 path"))
            .await
            .expect("load json");
        assert_eq!(doc.title(), Some("t"));

        let mut yaml_file = tempfile::NamedTempFile::new().expect("temp file");
        write!(yaml_file, "openapi: 3.0.0\ninfo:\n  title: t\n").expect("write");
        let doc = OpenApiDocument::load(yaml_file.path().to_str().expect("utf-8 path"))
            .await
            .expect("load yaml");
        assert_eq!(doc.title(), Some("t"));
    }

    #[tokio::test]
    async fn load_rejects_missing_file() {
        let err = OpenApiDocument::load("/nonexistent/openapi.json")
            .await
            .expect_err("missing file must fail");
        assert!(matches!(err, ApiLinkError::SpecReadFile { .. }));
    }

    #[test]
    fn default_server_url_requires_absolute_for_file_documents() {
        let doc = OpenApiDocument::from_value(json!({
            "servers": [{"url": "/api/v3"}]
        }))
        .expect("document");
        assert_eq!(doc.default_server_url(), None);

        let doc = OpenApiDocument::from_value(json!({
            "servers": [{"url": "https://api.example.com/v1"}]
        }))
        .expect("document");
        assert_eq!(
            doc.default_server_url().as_deref(),
            Some("https://api.example.com/v1")
        );
    }
}
