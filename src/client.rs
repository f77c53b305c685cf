//! Remote-capability client.
//!
//! The control plane and the gateway talk to tool servers only through the
//! [`RemoteConnector`] / [`RemoteSession`] traits. [`McpConnector`] is the
//! production implementation, built on `rmcp`:
//!
//! * `http` and `sse` servers must have an `http://` or `https://` endpoint and
//!   use the streamable HTTP client transport.
//! * `stdio` servers have a command line that is spawned as a child process
//!   (e.g. `npx -y airtable-mcp-server`). No other type spawns anything.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rmcp::model::{CallToolRequestParams, CallToolResult};
use rmcp::service::RunningService;
use rmcp::transport::{ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::Error;
use crate::models::TransportType;

/// Descriptor of one capability (tool) offered by a remote server.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityInfo {
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema of the capability's arguments.
    pub input_schema: Value,
}

/// Opens sessions to remote tool servers.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(
        &self,
        transport: TransportType,
        endpoint: &str,
    ) -> Result<Box<dyn RemoteSession>>;
}

/// An open session with a remote tool server.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Inventory of callable capabilities.
    async fn list_capabilities(&self) -> Result<Vec<CapabilityInfo>>;

    /// Invokes `name` with a JSON object of arguments and returns its decoded reply.
    async fn call_capability(&self, name: &str, arguments: Value) -> Result<Value>;

    /// Invokes `name` and returns the reply exactly as the server sent it.
    ///
    /// The default wraps [`call_capability`](Self::call_capability) as
    /// structured content, for sessions without a native MCP reply.
    async fn call_raw(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let value = self.call_capability(name, arguments).await?;
        Ok(CallToolResult::structured(value))
    }

    async fn disconnect(&self) -> Result<()>;
}

/// Where and how to reach a tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Url(String),
    Process {
        program: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
    },
}

impl Target {
    /// Resolves a registered server's endpoint under its transport type.
    ///
    /// Only `stdio` servers become [`Target::Process`].
    pub fn for_server(transport: TransportType, endpoint: &str) -> crate::error::Result<Self> {
        transport.check_endpoint(endpoint)?;
        let endpoint = endpoint.trim();
        match transport {
            TransportType::Http | TransportType::Sse => Ok(Target::Url(endpoint.to_string())),
            TransportType::Stdio => {
                let mut parts = endpoint.split_whitespace().map(str::to_string);
                let program = parts
                    .next()
                    .ok_or_else(|| Error::Validation("stdio endpoint must be a command line".into()))?;
                Ok(Target::Process {
                    program,
                    args: parts.collect(),
                    env: Vec::new(),
                })
            }
        }
    }
}

/// `rmcp`-backed [`RemoteConnector`].
#[derive(Debug, Default, Clone)]
pub struct McpConnector;

#[async_trait]
impl RemoteConnector for McpConnector {
    async fn connect(
        &self,
        transport: TransportType,
        endpoint: &str,
    ) -> Result<Box<dyn RemoteSession>> {
        let target = Target::for_server(transport, endpoint)?;
        Ok(Box::new(McpSession::open(&target).await?))
    }
}

/// A running `rmcp` client session.
pub struct McpSession {
    service: RunningService<RoleClient, ()>,
}

impl McpSession {
    pub async fn open(target: &Target) -> Result<Self> {
        let service = match target {
            Target::Url(url) => {
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());
                ().serve(transport)
                    .await
                    .with_context(|| format!("failed to connect to {}", url))?
            }
            Target::Process { program, args, env } => {
                let command = tokio::process::Command::new(program).configure(|cmd| {
                    cmd.args(args);
                    cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                });
                let transport = TokioChildProcess::new(command)
                    .with_context(|| format!("failed to spawn {}", program))?;
                ().serve(transport)
                    .await
                    .with_context(|| format!("failed to initialize session with {}", program))?
            }
        };
        Ok(Self { service })
    }
}

#[async_trait]
impl RemoteSession for McpSession {
    async fn list_capabilities(&self) -> Result<Vec<CapabilityInfo>> {
        let tools = self.service.list_all_tools().await?;
        Ok(tools
            .into_iter()
            .map(|t| CapabilityInfo {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: Value::Object((*t.input_schema).clone()),
            })
            .collect())
    }

    async fn call_capability(&self, name: &str, arguments: Value) -> Result<Value> {
        let result = self.call_raw(name, arguments).await?;
        decode_tool_reply(name, serde_json::to_value(&result)?)
    }

    async fn call_raw(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => bail!("arguments for '{}' must be an object, got {}", name, other),
        };
        // Built from JSON so optional protocol fields keep their defaults.
        let request: CallToolRequestParams =
            serde_json::from_value(json!({ "name": name, "arguments": arguments }))?;
        Ok(self.service.call_tool(request).await?)
    }

    async fn disconnect(&self) -> Result<()> {
        self.service.cancellation_token().cancel();
        Ok(())
    }
}

/// Turns a serialized `CallToolResult` into the JSON payload it carries.
///
/// Error replies become `Err`. Structured content wins over text; text content
/// is parsed as JSON when possible and returned as a string otherwise.
pub fn decode_tool_reply(name: &str, reply: Value) -> Result<Value> {
    let text = reply
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| {
            blocks
                .iter()
                .find_map(|b| b.get("text").and_then(Value::as_str))
        })
        .map(str::to_string);

    if reply.get("isError").and_then(Value::as_bool) == Some(true) {
        let message = text.unwrap_or_else(|| "tool reported an error".to_string());
        return Err(Error::Transport(format!("{}: {}", name, message)).into());
    }

    if let Some(structured) = reply.get("structuredContent").filter(|v| !v.is_null()) {
        return Ok(structured.clone());
    }

    Ok(match text {
        Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        None => Value::Null,
    })
}
