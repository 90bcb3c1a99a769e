//! The MCP server handler: `tools/list` and `tools/call` over one compiled registry.

use apilink_openapi_tools::executor::{CallInput, RequestExecutor};
use apilink_openapi_tools::registry::ToolRegistry;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData as McpError, ServerHandler};
use serde_json::Value;
use std::sync::Arc;

/// One MCP service instance. Cheap to clone: the registry and executor are shared,
/// read-only state, so every session gets an independent handler over the same
/// compiled tool set.
#[derive(Clone)]
pub struct ApiLinkService {
    registry: Arc<ToolRegistry>,
    executor: Arc<RequestExecutor>,
}

impl ApiLinkService {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, executor: Arc<RequestExecutor>) -> Self {
        Self { registry, executor }
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

impl ServerHandler for ApiLinkService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Tools generated from an OpenAPI document. Each call accepts optional \
                 'baseUrl', 'token' and 'headers' overrides.\n\n{}",
                self.registry.summary(),
            )),
            ..ServerInfo::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.registry.list_tools(),
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let name = request.name.as_ref();
        let Some(tool) = self.registry.get(name) else {
            return Err(McpError::invalid_params(
                format!("Unknown tool: {name}"),
                None,
            ));
        };

        let arguments = request
            .arguments
            .map(Value::Object)
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        // Contract violations are tool-level errors, not protocol errors: the
        // session keeps serving.
        if let Err(violations) = tool.contract.validate(&arguments) {
            tracing::debug!(tool = name, "rejected arguments");
            return Ok(error_result(format!(
                "Invalid arguments:\n{}",
                violations.join("\n"),
            )));
        }

        let input = match CallInput::from_value(arguments) {
            Ok(input) => input,
            Err(e) => return Ok(error_result(e.to_string())),
        };

        tracing::info!(
            tool = name,
            method = %tool.operation.method,
            path = %tool.operation.path,
            "executing tool call",
        );
        Ok(self.executor.execute(&tool.operation, &input).await)
    }
}

fn error_result(message: String) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(message)],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}
