//! # MCP Control Plane CLI (`mcpctl`)
//!
//! ## Usage
//!
//! ```bash
//! mcpctl --config ./config/mcpctl.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mcpctl init` | Create the SQLite database and schema |
//! | `mcpctl servers list` | List registered servers with their last check |
//! | `mcpctl servers add <name> <endpoint> --type <t>` | Register a server |
//! | `mcpctl servers remove <id>` | Remove a server and its logs |
//! | `mcpctl servers logs <id>` | Show a server's log history |
//! | `mcpctl servers check <id>` | Probe a server and record the result |
//! | `mcpctl serve api` | Start the control-plane HTTP API |
//! | `mcpctl serve gateway` | Start the authenticated Airtable gateway |
//! | `mcpctl formula <term> <field>` | Print an Airtable `filterByFormula` |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use mcp_control_plane::client::McpConnector;
use mcp_control_plane::config;
use mcp_control_plane::gateway::formula::{build_formula, MatchMode};
use mcp_control_plane::migrate;
use mcp_control_plane::observability::init_tracing;
use mcp_control_plane::probe::{check_server, HealthProber};
use mcp_control_plane::server;
use mcp_control_plane::store::RegistryStore;

/// MCP Control Plane: register MCP servers, check their reachability, and
/// run an authenticated Airtable MCP gateway.
#[derive(Parser)]
#[command(name = "mcpctl", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mcpctl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage registered MCP servers.
    Servers {
        #[command(subcommand)]
        action: ServersAction,
    },

    /// Start an HTTP service.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Build an Airtable filterByFormula expression. Needs no config.
    Formula {
        /// Text to match.
        term: String,
        /// Field name, with or without `{braces}`.
        field: String,
        /// `contains`, `equals`, or `starts_with`.
        #[arg(long, default_value = "contains")]
        mode: String,
        /// Compare with the original casing instead of lowercasing both sides.
        #[arg(long)]
        case_sensitive: bool,
    },
}

#[derive(Subcommand)]
enum ServersAction {
    /// List servers, newest first.
    List,
    /// Register a server.
    Add {
        name: String,
        /// URL for `http`/`sse` servers, or a command line for `stdio`.
        endpoint: String,
        /// Transport type: `stdio`, `http`, or `sse`.
        #[arg(long = "type", default_value = "http")]
        transport: String,
    },
    /// Remove a server and its log history.
    Remove { id: String },
    /// Show log history, newest first.
    Logs { id: String },
    /// Run a connectivity check and record the result.
    Check { id: String },
}

#[derive(Subcommand)]
enum ServeService {
    /// Control-plane REST API on `[server].bind`.
    Api,
    /// Airtable MCP gateway on `[gateway].bind`.
    Gateway,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Formula {
            term,
            field,
            mode,
            case_sensitive,
        } => {
            let mode: MatchMode = mode.parse().unwrap_or_default();
            let built = build_formula(&term, &field, mode, !case_sensitive);
            println!("{}", built.formula);
            for note in &built.notes {
                println!("  note: {}", note);
            }
            return Ok(());
        }
        other => other,
    };

    let cfg = config::load_config(&cli.config)?;

    match command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Servers { action } => run_servers(&cfg, action).await?,
        Commands::Serve { service } => match service {
            ServeService::Api => server::run_server(&cfg).await?,
            ServeService::Gateway => server::run_gateway(&cfg).await?,
        },
        Commands::Formula { .. } => {}
    }

    Ok(())
}

async fn run_servers(cfg: &config::Config, action: ServersAction) -> anyhow::Result<()> {
    let store = RegistryStore::open(cfg).await?;

    match action {
        ServersAction::List => {
            let servers = store.list().await?;
            if servers.is_empty() {
                println!("No servers registered.");
            }
            for s in servers {
                let last = match s.last_check() {
                    Some(c) => format!("{} ({}ms) at {}", c.status, c.latency_ms, c.at),
                    None => "never checked".to_string(),
                };
                println!("{}  {:<20} {:<5} {}", s.id, s.name, s.transport, s.endpoint);
                println!("    last check: {}", last);
            }
        }
        ServersAction::Add {
            name,
            endpoint,
            transport,
        } => {
            let server = store.create(&name, &endpoint, &transport).await?;
            println!("Registered {} ({}).", server.name, server.id);
        }
        ServersAction::Remove { id } => {
            store.delete(&id).await?;
            println!("Removed {}.", id);
        }
        ServersAction::Logs { id } => {
            let logs = store.logs(&id).await?;
            if logs.is_empty() {
                println!("No logs.");
            }
            for entry in logs {
                println!(
                    "{} [{}] {}",
                    entry.timestamp,
                    entry.level.as_str().to_uppercase(),
                    entry.message
                );
            }
        }
        ServersAction::Check { id } => {
            let prober = HealthProber::new(Arc::new(McpConnector), cfg.probe.timeout());
            let outcome = check_server(&store, &prober, &id).await?;
            println!(
                "{} ({}ms) - {}",
                outcome.status, outcome.latency_ms, outcome.detail
            );
        }
    }

    store.close().await;
    Ok(())
}
