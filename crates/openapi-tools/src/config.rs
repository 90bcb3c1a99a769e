use serde::{Deserialize, Serialize};

fn default_timeout_secs() -> u64 {
    30
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

/// Resolved configuration for one upstream API.
///
/// The core never reads environment variables or files; the server binary resolves
/// everything and hands it over as plain values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// `OpenAPI` document location (URL or file path).
    pub spec: String,

    /// Default base URL for API calls; falls back to the document's first server entry.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Per-call timeout for outbound requests, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApiConfig {
    #[must_use]
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            base_url: None,
            auth: AuthConfig::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// How to inject credentials into outbound requests.
///
/// The credential is sent as `{header}: {prefix}{token}` whenever a token is
/// available (per-call override or the configured default).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Header name the target API expects.
    #[serde(default = "default_auth_header")]
    pub header: String,

    /// Value prefix, e.g. "Bearer ".
    #[serde(default)]
    pub prefix: String,

    /// Default credential; per-call `token` input overrides it.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            header: default_auth_header(),
            prefix: String::new(),
            token: None,
        }
    }
}
