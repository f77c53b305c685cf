use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Browser origins allowed to call the control-plane API. Empty disables CORS.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProbeConfig {
    /// Upper bound on a single connectivity check. Unset means the probe waits
    /// as long as the underlying transport does.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_path")]
    pub path: String,
    #[serde(default = "default_gateway_name")]
    pub name: String,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            path: default_gateway_path(),
            name: default_gateway_name(),
            upstream: UpstreamConfig::default(),
        }
    }
}

fn default_gateway_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_gateway_path() -> String {
    "/mcp".to_string()
}
fn default_gateway_name() -> String {
    "Airtable MCP Gateway".to_string()
}

/// How to launch the upstream Airtable MCP server and where its credentials live.
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_command")]
    pub command: String,
    #[serde(default = "default_upstream_args")]
    pub args: Vec<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_url_env")]
    pub api_url_env: String,
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            command: default_upstream_command(),
            args: default_upstream_args(),
            api_key_env: default_api_key_env(),
            api_url_env: default_api_url_env(),
            auth_token_env: default_auth_token_env(),
        }
    }
}

fn default_upstream_command() -> String {
    "npx".to_string()
}
fn default_upstream_args() -> Vec<String> {
    vec!["-y".to_string(), "airtable-mcp-server".to_string()]
}
fn default_api_key_env() -> String {
    "AIRTABLE_API_KEY".to_string()
}
fn default_api_url_env() -> String {
    "AIRTABLE_API_URL".to_string()
}
fn default_auth_token_env() -> String {
    "MCP_AUTH_TOKEN".to_string()
}

/// Secrets the gateway needs, resolved once at process start.
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub api_key: String,
    pub api_url: Option<String>,
    pub auth_token: String,
}

impl GatewayCredentials {
    /// Environment handed to the upstream process.
    pub fn upstream_env(&self, upstream: &UpstreamConfig) -> Vec<(String, String)> {
        let mut env = vec![(upstream.api_key_env.clone(), self.api_key.clone())];
        if let Some(url) = &self.api_url {
            env.push((upstream.api_url_env.clone(), url.clone()));
        }
        env
    }
}

impl GatewayConfig {
    /// Resolves credentials from the process environment.
    pub fn credentials(&self) -> crate::error::Result<GatewayCredentials> {
        self.credentials_with(|key| std::env::var(key).ok())
    }

    /// Resolves credentials through `lookup`; blank values count as missing.
    pub fn credentials_with<F>(&self, lookup: F) -> crate::error::Result<GatewayCredentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let upstream = &self.upstream;

        let api_key = get(&upstream.api_key_env).ok_or_else(|| {
            Error::Configuration(format!(
                "{} is required to run the Airtable MCP server.",
                upstream.api_key_env
            ))
        })?;
        let auth_token = get(&upstream.auth_token_env).ok_or_else(|| {
            Error::Configuration(format!(
                "{} is required to protect the gateway endpoint.",
                upstream.auth_token_env
            ))
        })?;

        Ok(GatewayCredentials {
            api_key,
            api_url: get(&upstream.api_url_env),
            auth_token,
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.probe.timeout_secs == Some(0) {
        anyhow::bail!("probe.timeout_secs must be > 0 when set");
    }

    if !config.gateway.path.starts_with('/') {
        anyhow::bail!(
            "gateway.path must start with '/', got '{}'",
            config.gateway.path
        );
    }

    if config.gateway.upstream.command.trim().is_empty() {
        anyhow::bail!("gateway.upstream.command must not be empty");
    }

    Ok(config)
}
