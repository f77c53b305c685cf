//! Airtable gateway helpers.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`formula`] | `filterByFormula` construction |
//! | [`schema`] | Field summaries and base/table discovery |
//! | [`records`] | Search-then-list record retrieval |
//! | [`tools`] | [`Tool`](crate::traits::Tool) wrappers served by the gateway |

pub mod formula;
pub mod records;
pub mod schema;
pub mod tools;

use std::sync::Arc;

use anyhow::Result;

use crate::client::{McpSession, RemoteSession, Target};
use crate::config::{GatewayConfig, GatewayCredentials};
use crate::traits::ToolRegistry;

/// Registers the three Airtable helper tools.
pub fn register_builtins(registry: &mut ToolRegistry) {
    registry.register(Box::new(tools::DiscoverSchemaTool));
    registry.register(Box::new(tools::BuildFormulaTool));
    registry.register(Box::new(tools::ListRecordsSafeTool));
}

/// Spawns the upstream Airtable MCP server with the resolved credentials.
pub async fn connect_upstream(
    gateway: &GatewayConfig,
    credentials: &GatewayCredentials,
) -> Result<Arc<dyn RemoteSession>> {
    let upstream = &gateway.upstream;
    let target = Target::Process {
        program: upstream.command.clone(),
        args: upstream.args.clone(),
        env: credentials.upstream_env(upstream),
    };
    tracing::info!(command = %upstream.command, args = ?upstream.args, "starting upstream Airtable MCP server");
    let session = McpSession::open(&target).await?;
    Ok(Arc::new(session))
}
