//! MCP tool-calling bridge.
//!
//! Exposes the [`ToolRegistry`] as MCP tools over the rmcp Streamable
//! HTTP transport mounted at `POST /mcp`. Protocol framing, `initialize`,
//! and the standard JSON-RPC error codes come from rmcp; this module only
//! maps the `agentlayer_*` tools onto `list_tools` / `call_tool`.
//!
//! The transport runs stateless: every POST is answered on its own, so
//! clients may call `tools/list` or `tools/call` without a session.
//! Unknown tools and tool failures are reported as JSON-RPC internal
//! errors (`-32603`) carrying the cause.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{ErrorData as McpError, ServerHandler};
use serde_json::{json, Value};

use crate::traits::{ToolContext, ToolRegistry};

/// Bridges the tool registry to the MCP JSON-RPC protocol.
///
/// Each request gets a clone of this struct; everything is behind `Arc`.
#[derive(Clone)]
pub struct McpBridge {
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
}

impl McpBridge {
    pub fn new(tools: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self { tools, ctx }
    }

    /// Wrap the bridge in the Streamable HTTP service served at `/mcp`.
    pub fn into_service(self) -> StreamableHttpService<McpBridge, LocalSessionManager> {
        let mut config = StreamableHttpServerConfig::default();
        config.stateful_mode = false;
        StreamableHttpService::new(
            move || Ok(self.clone()),
            LocalSessionManager::default().into(),
            config,
        )
    }

    /// Convert a registered tool into an rmcp `Tool` descriptor.
    fn to_mcp_tool(tool: &dyn crate::traits::Tool) -> Tool {
        let input_schema: Arc<serde_json::Map<String, Value>> = match tool.parameters_schema() {
            Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(tool.is_read_only())),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    pub fn tool_descriptors(&self) -> Vec<Tool> {
        self.tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect()
    }

    /// Run a tool by name; the result is pretty-printed into one text item.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(name).ok_or_else(|| {
            McpError::new(
                ErrorCode::INTERNAL_ERROR,
                format!("Unknown tool: {}", name),
                None,
            )
        })?;

        let params = Value::Object(arguments.unwrap_or_default());
        let result = tool.execute(params, &self.ctx).await.map_err(|e| {
            tracing::warn!(tool = name, error = %e, "tool call failed");
            McpError::new(ErrorCode::INTERNAL_ERROR, format!("{}: {}", name, e), None)
        })?;

        let text = serde_json::to_string_pretty(&result)
            .map_err(|e| McpError::new(ErrorCode::INTERNAL_ERROR, e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    /// Body of `GET /mcp/health`.
    pub fn health(&self) -> Value {
        json!({
            "status": "ok",
            "protocol": "mcp-streamable-http",
            "protocolVersion": ProtocolVersion::LATEST,
            "tools": self.tools.len(),
        })
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "agent-layer".to_string(),
                title: Some("Agent Layer".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Search places across verticals with agentlayer_search, inspect one with \
                 agentlayer_get_place, compare 2-5 with agentlayer_compare, and capture a \
                 request with agentlayer_create_lead."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(self.tool_descriptors())))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.invoke(&request.name, request.arguments).await
    }
}
