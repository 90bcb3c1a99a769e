//! Request execution.
//!
//! Turns a validated tool call into exactly one outbound HTTP request and maps the
//! outcome to a [`CallToolResult`]. Any received response, whatever its status code,
//! is a success result carrying `{status, statusText, headers, data}`; callers
//! inspect `status` themselves. Only precondition failures and transport failures
//! (no response at all) produce error results.

use crate::config::AuthConfig;
use crate::error::{ApiLinkError, Result};
use crate::operations::Operation;
use base64::Engine as _;
use rmcp::model::{CallToolResult, Content};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Deserialized tool-call arguments. Validation against the compiled contract has
/// already happened by the time this is built.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallInput {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub path_params: Option<Map<String, Value>>,
    pub query: Option<Map<String, Value>>,
    pub body: Option<Value>,
    pub content_type: Option<String>,
}

impl CallInput {
    /// # Errors
    ///
    /// Returns a runtime error when the arguments do not deserialize, e.g. a
    /// non-object `headers` field.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| ApiLinkError::Runtime(format!("Invalid tool arguments: {e}")))
    }
}

/// Performs outbound HTTP calls for tool invocations.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    base_url: Option<String>,
    auth: AuthConfig,
}

impl RequestExecutor {
    /// # Errors
    ///
    /// Returns a startup error when the HTTP client cannot be built.
    pub fn new(base_url: Option<String>, auth: AuthConfig, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ApiLinkError::Startup(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    /// Executes one call. Never fails past this boundary; every failure comes back
    /// as an error-flagged [`CallToolResult`].
    pub async fn execute(&self, op: &Operation, input: &CallInput) -> CallToolResult {
        match self.perform(op, input).await {
            Ok(result) => result,
            Err(failure) => failure.into_result(),
        }
    }

    async fn perform(
        &self,
        op: &Operation,
        input: &CallInput,
    ) -> std::result::Result<CallToolResult, CallFailure> {
        let base = input
            .base_url
            .as_deref()
            .or(self.base_url.as_deref())
            .ok_or_else(|| {
                CallFailure::precondition(
                    "No base URL available: supply 'baseUrl' or configure a default",
                )
            })?;

        let empty = Map::new();
        let path_params = input.path_params.as_ref().unwrap_or(&empty);
        let missing: Vec<&str> = op
            .parameters
            .path
            .iter()
            .filter(|p| p.required && !path_params.contains_key(&p.name))
            .map(|p| p.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(CallFailure::precondition(format!(
                "Missing required path parameters: {}",
                missing.join(", "),
            )));
        }

        if op.request_body.as_ref().is_some_and(|b| b.required) && input.body.is_none() {
            return Err(CallFailure::precondition("Missing required request body"));
        }

        let url = join_url(base, &substitute_path(&op.path, path_params));

        let mut headers: Vec<(String, String)> = Vec::new();
        if let Some(extra) = &input.headers {
            for (name, value) in extra {
                headers.push((name.clone(), value.clone()));
            }
        }
        if !headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("accept")) {
            headers.push(("Accept".to_string(), mime::APPLICATION_JSON.to_string()));
        }
        if input.body.is_some()
            && !headers
                .iter()
                .any(|(n, _)| n.eq_ignore_ascii_case("content-type"))
        {
            let ct = input
                .content_type
                .clone()
                .or_else(|| {
                    op.request_body
                        .as_ref()
                        .and_then(|b| b.content_types.first().cloned())
                })
                .unwrap_or_else(|| mime::APPLICATION_JSON.to_string());
            headers.push(("Content-Type".to_string(), ct));
        }
        if let Some(token) = input.token.as_deref().or(self.auth.token.as_deref()) {
            headers.push((
                self.auth.header.clone(),
                format!("{}{token}", self.auth.prefix),
            ));
        }

        let mut query_pairs: Vec<(String, String)> = Vec::new();
        if let Some(query) = &input.query {
            for (name, value) in query {
                match value {
                    // Arrays become repeated keys: tags=a&tags=b.
                    Value::Array(items) => {
                        for item in items {
                            query_pairs.push((name.clone(), value_to_string(item)));
                        }
                    }
                    other => query_pairs.push((name.clone(), value_to_string(other))),
                }
            }
        }

        let method = reqwest::Method::from_bytes(op.method.to_uppercase().as_bytes())
            .map_err(|_| {
                CallFailure::precondition(format!("Unsupported HTTP method '{}'", op.method))
            })?;

        let context = request_context(
            method.as_str(),
            &url,
            &headers,
            &query_pairs,
            input.body.as_ref(),
            &self.auth,
        );

        let mut request = self.client.request(method.clone(), &url);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !query_pairs.is_empty() {
            request = request.query(&query_pairs);
        }
        if let Some(body) = &input.body {
            request = request.json(body);
        }

        tracing::debug!("{method} {url}");
        let response = request.send().await.map_err(|e| CallFailure {
            message: format!("Request failed: {e}"),
            request: Some(context.clone()),
        })?;

        let status = response.status();
        let response_headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    json!(value.to_str().unwrap_or("<binary>")),
                )
            })
            .collect();
        let content_type = response_headers
            .get("content-type")
            .and_then(Value::as_str)
            .map(String::from);

        let bytes = response.bytes().await.map_err(|e| CallFailure {
            message: format!("Failed to read response body (status {status}): {e}"),
            request: Some(context),
        })?;

        let data = match serde_json::from_slice::<Value>(&bytes) {
            Ok(v) => v,
            Err(_) => bytes_to_text_or_base64(&bytes, content_type.as_deref()),
        };
        let text = match &data {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        let structured = json!({
            "status": status.as_u16(),
            "statusText": status.canonical_reason().unwrap_or_default(),
            "headers": response_headers,
            "data": data,
        });

        Ok(CallToolResult {
            content: vec![Content::text(text)],
            structured_content: Some(structured),
            is_error: Some(false),
            meta: None,
        })
    }
}

/// A failure before or during the outbound call, carried back to the caller as an
/// error result rather than an exception.
#[derive(Debug)]
struct CallFailure {
    message: String,
    /// Redacted request context, present for transport failures only.
    request: Option<Value>,
}

impl CallFailure {
    fn precondition(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            request: None,
        }
    }

    fn into_result(self) -> CallToolResult {
        let mut text = self.message;
        let structured = self.request.map(|req| {
            if let Ok(pretty) = serde_json::to_string_pretty(&req) {
                text.push_str("\nRequest: ");
                text.push_str(&pretty);
            }
            json!({"request": req})
        });
        CallToolResult {
            content: vec![Content::text(text)],
            structured_content: structured,
            is_error: Some(true),
            meta: None,
        }
    }
}

/// Request context for diagnostics, with the credential header redacted.
fn request_context(
    method: &str,
    url: &str,
    headers: &[(String, String)],
    query: &[(String, String)],
    body: Option<&Value>,
    auth: &AuthConfig,
) -> Value {
    let headers: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            let shown = if name.eq_ignore_ascii_case(&auth.header) {
                "<redacted>"
            } else {
                value.as_str()
            };
            (name.clone(), json!(shown))
        })
        .collect();
    json!({
        "method": method,
        "url": url,
        "headers": headers,
        "query": query,
        "body": body,
    })
}

/// Replaces each `{name}` placeholder with the URL-encoded string form of the
/// supplied value. Unsupplied optional placeholders are left as-is.
fn substitute_path(template: &str, params: &Map<String, Value>) -> String {
    let mut path = template.to_string();
    for (name, value) in params {
        path = path.replace(
            &format!("{{{name}}}"),
            &encode_path_component(&value_to_string(value)),
        );
    }
    path
}

/// Joins base URL and path with exactly one separating slash.
fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/'),
    )
}

/// Percent-encodes everything except RFC 3986 unreserved characters.
fn encode_path_component(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn is_unreserved(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~')
}

/// String form of a parameter value: strings pass through unquoted, primitives use
/// their display form, structured values fall back to compact JSON.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// UTF-8 bodies become plain strings; anything else is wrapped as base64 with its
/// advertised media type.
fn bytes_to_text_or_base64(bytes: &[u8], content_type: Option<&str>) -> Value {
    if let Ok(s) = std::str::from_utf8(bytes) {
        Value::String(s.to_string())
    } else {
        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
        json!({
            "encoding": "base64",
            "mimeType": content_type,
            "data": b64,
        })
    }
}
