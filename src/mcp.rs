//! MCP JSON-RPC protocol bridge for the gateway.
//!
//! Serves the [`ToolRegistry`] helpers over the MCP Streamable HTTP endpoint
//! and proxies every upstream Airtable tool alongside them, so an agent sees
//! one tool list. Local helpers shadow upstream tools with the same name.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};
use serde_json::Value;

use crate::client::{CapabilityInfo, RemoteSession};
use crate::traits::{validate_params, ToolContext, ToolRegistry};

/// Each MCP session receives a clone of this struct; everything is behind
/// `Arc`, so all sessions share one registry and one upstream session.
#[derive(Clone)]
pub struct McpBridge {
    name: String,
    tools: Arc<ToolRegistry>,
    upstream: Arc<dyn RemoteSession>,
}

impl McpBridge {
    pub fn new(name: String, tools: Arc<ToolRegistry>, upstream: Arc<dyn RemoteSession>) -> Self {
        Self {
            name,
            tools,
            upstream,
        }
    }

    fn object_schema(schema: Value) -> Arc<serde_json::Map<String, Value>> {
        match schema {
            Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        }
    }

    /// Convert a gateway tool into an rmcp `Tool` descriptor.
    fn to_mcp_tool(tool: &dyn crate::traits::Tool) -> Tool {
        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema: Self::object_schema(tool.parameters_schema()),
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(true)),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    /// Convert a proxied upstream capability into an rmcp `Tool` descriptor.
    fn upstream_to_mcp_tool(cap: CapabilityInfo) -> Tool {
        Tool {
            name: Cow::Owned(cap.name),
            title: None,
            description: cap.description.map(Cow::Owned),
            input_schema: Self::object_schema(cap.input_schema),
            output_schema: None,
            annotations: None,
            execution: None,
            icons: None,
            meta: None,
        }
    }

    fn text_result(value: &Value) -> CallToolResult {
        let text = match value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_default(),
        };
        CallToolResult::success(vec![Content::text(text)])
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mcp-control-plane-gateway".to_string(),
                title: Some(self.name.clone()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Airtable gateway. Start with airtable_discover_schema to find bases, tables \
                 and text fields; use airtable_build_formula for filters and \
                 airtable_list_records_safe to fetch records with diagnostics. \
                 Upstream Airtable tools are also available directly."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let mut tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();

        let upstream = self.upstream.list_capabilities().await.map_err(|e| {
            McpError::new(
                ErrorCode::INTERNAL_ERROR,
                format!("upstream tool listing failed: {:#}", e),
                None,
            )
        })?;
        for cap in upstream {
            if self.tools.find(&cap.name).is_none() {
                tools.push(Self::upstream_to_mcp_tool(cap));
            }
        }

        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let params = request
            .arguments
            .map(Value::Object)
            .unwrap_or(Value::Object(serde_json::Map::new()));

        let Some(tool) = self.tools.find(&request.name) else {
            // Not a local helper: the upstream reply is passed through as-is.
            return match self.upstream.call_raw(&request.name, params).await {
                Ok(result) => Ok(result),
                Err(e) => Ok(CallToolResult::error(vec![Content::text(format!("{:#}", e))])),
            };
        };

        let params = validate_params(&tool.parameters_schema(), &params)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let ctx = ToolContext::new(self.upstream.clone());
        match tool.execute(params, &ctx).await {
            Ok(result) => Ok(Self::text_result(&result)),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!("{:#}", e))])),
        }
    }
}
