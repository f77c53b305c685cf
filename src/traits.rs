//! Tool extension trait and registry for the gateway.
//!
//! Every helper the gateway serves implements [`Tool`] and is registered in a
//! [`ToolRegistry`]. The same registry backs both the MCP endpoint and the
//! REST surface (`GET /tools/list`, `POST /tools/{name}`).
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌──────────────┐   ┌─────────────────┐  │
//! │  │ Airtable     │   │  Custom (Rust)  │  │
//! │  │ helpers      │   │  Tools          │  │
//! │  └──────────────┘   └─────────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     run_gateway() → MCP + HTTP API
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::client::RemoteSession;

/// A tool that agents can discover and call through the gateway.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use mcp_control_plane::traits::{Tool, ToolContext};
///
/// pub struct CapabilityCount;
///
/// #[async_trait]
/// impl Tool for CapabilityCount {
///     fn name(&self) -> &str { "capability_count" }
///     fn description(&self) -> &str { "Count upstream capabilities" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         let caps = ctx.upstream().list_capabilities().await?;
///         Ok(json!({ "count": caps.len() }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route segment and MCP tool name, e.g. `"airtable_build_formula"`.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether the tool ships with the gateway. Defaults to `false`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema (`type: "object"`) of the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Runs the tool with parameters already checked by [`validate_params`].
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Per-invocation context handed to [`Tool::execute`].
pub struct ToolContext {
    upstream: Arc<dyn RemoteSession>,
}

impl ToolContext {
    pub fn new(upstream: Arc<dyn RemoteSession>) -> Self {
        Self { upstream }
    }

    /// Session with the upstream Airtable MCP server.
    pub fn upstream(&self) -> &dyn RemoteSession {
        self.upstream.as_ref()
    }
}

/// Serializable tool descriptor returned by `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            builtin: tool.is_builtin(),
            parameters: tool.parameters_schema(),
        }
    }
}

/// Ordered collection of [`Tool`]s; the first registration of a name wins.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry pre-loaded with the Airtable helper tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::gateway::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks `params` against a tool's JSON Schema and fills in defaults.
///
/// Supports `required`, primitive `type` checks, and `enum`. Absent optional
/// properties that declare a `default` get it injected.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("parameters must be a JSON object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<String> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    for req_field in &required {
        if !params_obj.contains_key(req_field) {
            bail!("missing required parameter: {}", req_field);
        }
    }

    let mut result = params_obj.clone();

    for (prop_name, prop_schema) in &properties {
        match params_obj.get(prop_name) {
            Some(Value::Null) => {}
            Some(value) => {
                if let Some(expected_type) = prop_schema.get("type").and_then(|t| t.as_str()) {
                    let type_ok = match expected_type {
                        "string" => value.is_string(),
                        "integer" => value.is_i64() || value.is_u64(),
                        "number" => value.is_number(),
                        "boolean" => value.is_boolean(),
                        "array" => value.is_array(),
                        "object" => value.is_object(),
                        _ => true,
                    };
                    if !type_ok {
                        bail!(
                            "parameter '{}' must be of type '{}', got {}",
                            prop_name,
                            expected_type,
                            json_type_name(value)
                        );
                    }
                }

                if let Some(enum_values) = prop_schema.get("enum").and_then(|e| e.as_array()) {
                    if !enum_values.contains(value) {
                        let allowed: Vec<String> =
                            enum_values.iter().map(|v| v.to_string()).collect();
                        bail!(
                            "parameter '{}' must be one of [{}], got {}",
                            prop_name,
                            allowed.join(", "),
                            value
                        );
                    }
                }
            }
            None => {
                if let Some(default) = prop_schema.get("default") {
                    result.insert(prop_name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_term": { "type": "string" },
                "max_records": { "type": "integer", "default": 200 },
                "detail_level": { "type": "string", "enum": ["full", "identifiersOnly"] }
            },
            "required": ["search_term"]
        })
    }

    #[test]
    fn test_missing_required() {
        let err = validate_params(&schema(), &json!({})).unwrap_err();
        assert!(err.to_string().contains("missing required parameter: search_term"));
    }

    #[test]
    fn test_type_mismatch() {
        let err =
            validate_params(&schema(), &json!({ "search_term": "a", "max_records": "ten" }))
                .unwrap_err();
        assert!(err.to_string().contains("must be of type 'integer'"));
    }

    #[test]
    fn test_enum_violation() {
        let err = validate_params(
            &schema(),
            &json!({ "search_term": "a", "detail_level": "everything" }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be one of"));
    }

    #[test]
    fn test_defaults_injected() {
        let params = validate_params(&schema(), &json!({ "search_term": "a" })).unwrap();
        assert_eq!(params["max_records"], 200);
        assert!(params.get("detail_level").is_none());
    }

    #[test]
    fn test_registry_builtins_are_registered() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_empty());
        assert!(ToolRegistry::new().is_empty());
        assert!(registry.find("airtable_build_formula").is_some());
        assert!(registry.find("airtable_discover_schema").is_some());
        assert!(registry.find("airtable_list_records_safe").is_some());
        assert!(registry.find("search").is_none());
    }
}
