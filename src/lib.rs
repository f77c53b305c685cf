//! # MCP Control Plane
//!
//! A registry and health checker for Model Context Protocol (MCP) servers,
//! plus an authenticated gateway that fronts an Airtable MCP server with
//! agent-friendly helper tools.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ REST API /   │──▶│ RegistryStore│──▶│  SQLite  │
//! │ CLI (mcpctl) │   │ + Prober     │   │ servers  │
//! └──────────────┘   └──────┬───────┘   │ + logs   │
//!                           │           └──────────┘
//!                           ▼
//!                   remote MCP servers
//!
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ MCP agents   │──▶│ Gateway      │──▶│ airtable-mcp-    │
//! │ (Bearer)     │   │ helpers+proxy│   │ server (stdio)   │
//! └──────────────┘   └──────────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mcpctl init
//! mcpctl servers add docs https://docs.example.com/mcp --type http
//! mcpctl servers check <id>
//! mcpctl serve api
//! mcpctl serve gateway          # needs AIRTABLE_API_KEY and MCP_AUTH_TOKEN
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and gateway credentials |
//! | [`error`] | Domain error type |
//! | [`models`] | Server records, log entries, check results |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema setup |
//! | [`store`] | Server registry with bounded log history |
//! | [`client`] | Remote MCP client abstraction |
//! | [`probe`] | Connectivity checks |
//! | [`gateway`] | Airtable helpers (formula, schema, records) |
//! | [`traits`] | Tool trait and registry |
//! | [`mcp`] | MCP protocol bridge for the gateway |
//! | [`server`] | HTTP servers |
//! | [`observability`] | Tracing setup |

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod observability;
pub mod probe;
pub mod server;
pub mod store;
pub mod traits;
