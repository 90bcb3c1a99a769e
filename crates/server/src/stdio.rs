//! Stdio transport: one implicit session over stdin/stdout.

use crate::service::ApiLinkService;
use apilink_openapi_tools::executor::RequestExecutor;
use apilink_openapi_tools::registry::ToolRegistry;
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use std::sync::Arc;

/// Serves the MCP service over stdio until the client disconnects.
///
/// # Errors
///
/// Returns an error if the transport fails to start or terminates abnormally.
pub async fn run_stdio(
    registry: Arc<ToolRegistry>,
    executor: Arc<RequestExecutor>,
) -> anyhow::Result<()> {
    tracing::info!("serving on stdio");
    let service = ApiLinkService::new(registry, executor)
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;
    service.waiting().await?;
    Ok(())
}
