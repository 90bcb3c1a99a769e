//! Streamable HTTP transport with anti-rebinding checks.

use crate::service::ApiLinkService;
use crate::session::TrackedSessionManager;
use apilink_openapi_tools::executor::RequestExecutor;
use apilink_openapi_tools::registry::ToolRegistry;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use rmcp::transport::streamable_http_server::StreamableHttpService;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Resolved HTTP transport settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub bind: String,
    /// Path the MCP service is mounted on, e.g. `/mcp`.
    pub path: String,
    /// Host header allow-list; empty means any.
    pub allowed_hosts: Vec<String>,
    /// Origin header allow-list; empty means any.
    pub allowed_origins: Vec<String>,
}

/// DNS-rebinding protection: checks `Host` and `Origin` against allow-lists.
///
/// Browser-originated rebinding attacks carry an attacker-controlled Host and, for
/// cross-origin requests, an Origin. Non-browser clients typically send no Origin,
/// so an absent Origin passes while an absent Host fails when a host list is set.
#[derive(Debug, Clone, Default)]
pub struct RebindGuard {
    allowed_hosts: Vec<String>,
    allowed_origins: Vec<String>,
}

impl RebindGuard {
    #[must_use]
    pub fn new(allowed_hosts: Vec<String>, allowed_origins: Vec<String>) -> Self {
        Self {
            allowed_hosts,
            allowed_origins,
        }
    }

    fn host_allowed(&self, host: Option<&str>) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        let Some(host) = host else {
            return false;
        };
        // Accept entries with or without an explicit port.
        let bare = host.rsplit_once(':').map_or(host, |(h, _)| h);
        self.allowed_hosts
            .iter()
            .any(|allowed| allowed == host || allowed == bare)
    }

    fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        let Some(origin) = origin else {
            return true;
        };
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}

async fn rebind_guard_middleware(
    State(guard): State<Arc<RebindGuard>>,
    request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok());
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    if !guard.host_allowed(host) {
        tracing::warn!(host = host.unwrap_or("<none>"), "rejected host header");
        return StatusCode::FORBIDDEN.into_response();
    }
    if !guard.origin_allowed(origin) {
        tracing::warn!(origin = origin.unwrap_or("<none>"), "rejected origin header");
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(request).await
}

/// Builds the transport router: the MCP service mounted on `path`, a `/health`
/// endpoint and the rebind guard in front of both.
#[must_use]
pub fn build_router(
    registry: Arc<ToolRegistry>,
    executor: Arc<RequestExecutor>,
    config: &HttpConfig,
) -> Router {
    let tool_count = registry.len();
    let session_manager = Arc::new(TrackedSessionManager::default());
    let service = StreamableHttpService::new(
        move || Ok(ApiLinkService::new(registry.clone(), executor.clone())),
        session_manager.clone(),
        Default::default(),
    );

    let guard = Arc::new(RebindGuard::new(
        config.allowed_hosts.clone(),
        config.allowed_origins.clone(),
    ));
    Router::new()
        .nest_service(&config.path, service)
        .route(
            "/health",
            get(move || {
                let sessions = session_manager.clone();
                async move {
                    Json(json!({
                        "status": "ok",
                        "tools": tool_count,
                        "activeSessions": sessions.active_sessions(),
                    }))
                }
            }),
        )
        .layer(middleware::from_fn_with_state(guard, rebind_guard_middleware))
}

/// Serves the MCP service over streamable HTTP until ctrl-c.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn run_http(
    registry: Arc<ToolRegistry>,
    executor: Arc<RequestExecutor>,
    config: HttpConfig,
) -> anyhow::Result<()> {
    let router = build_router(registry, executor, &config);

    let listener = TcpListener::bind(&config.bind).await?;
    let addr = listener.local_addr()?;
    tracing::info!(bind = %addr, path = %config.path, "listening on streamable HTTP");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_lists_accept_everything() {
        let guard = RebindGuard::default();
        assert!(guard.host_allowed(Some("evil.example")));
        assert!(guard.host_allowed(None));
        assert!(guard.origin_allowed(Some("http://evil.example")));
    }

    #[test]
    fn host_list_matches_with_and_without_port() {
        let guard = RebindGuard::new(vec!["localhost".to_string()], Vec::new());
        assert!(guard.host_allowed(Some("localhost")));
        assert!(guard.host_allowed(Some("localhost:8080")));
        assert!(!guard.host_allowed(Some("rebound.example")));
        assert!(!guard.host_allowed(None));
    }

    #[test]
    fn origin_list_rejects_foreign_origins_but_not_absent_ones() {
        let guard = RebindGuard::new(Vec::new(), vec!["http://localhost:8080".to_string()]);
        assert!(guard.origin_allowed(Some("http://localhost:8080")));
        assert!(!guard.origin_allowed(Some("http://evil.example")));
        // curl and friends send no Origin.
        assert!(guard.origin_allowed(None));
    }
}
