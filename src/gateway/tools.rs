//! The gateway's Airtable helper tools.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::formula::{build_formula, MatchMode};
use super::records::{list_records_safe, ListRecordsRequest, DEFAULT_MAX_RECORDS};
use super::schema::discover_schema;
use crate::error::Error;
use crate::traits::{Tool, ToolContext};

fn opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    match params.get(key).and_then(Value::as_str) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Validation(format!("{} must not be empty", key)).into()),
    }
}

/// Lists bases, and with `base_id`, tables plus per-table field summaries.
pub struct DiscoverSchemaTool;

#[async_trait]
impl Tool for DiscoverSchemaTool {
    fn name(&self) -> &str {
        "airtable_discover_schema"
    }

    fn description(&self) -> &str {
        "Discover Airtable bases, tables and searchable fields"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "base_id": { "type": "string", "description": "Base to inspect; omit to list bases only" },
                "detail_level": {
                    "type": "string",
                    "enum": ["tableIdentifiersOnly", "identifiersOnly", "full"],
                    "default": "full"
                }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let base_id = opt_str(&params, "base_id");
        let detail_level = params["detail_level"].as_str().unwrap_or("full");
        let result = discover_schema(ctx.upstream(), base_id.as_deref(), detail_level).await?;
        Ok(serde_json::to_value(result)?)
    }
}

/// Builds a `filterByFormula` expression. Does not call the upstream server.
pub struct BuildFormulaTool;

#[async_trait]
impl Tool for BuildFormulaTool {
    fn name(&self) -> &str {
        "airtable_build_formula"
    }

    fn description(&self) -> &str {
        "Build a safe Airtable filterByFormula for a search term and field"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_term": { "type": "string", "description": "Text to match" },
                "field_name": { "type": "string", "description": "Field name, with or without {braces}" },
                "mode": {
                    "type": "string",
                    "description": "contains (default), equals, or starts_with",
                    "default": "contains"
                },
                "case_insensitive": { "type": "boolean", "default": true }
            },
            "required": ["search_term", "field_name"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value> {
        let search_term = params["search_term"].as_str().unwrap_or("");
        let field_name = required_str(&params, "field_name")?;
        let mode: MatchMode = params["mode"]
            .as_str()
            .unwrap_or("contains")
            .parse()
            .unwrap_or_default();
        let case_insensitive = params["case_insensitive"].as_bool().unwrap_or(true);

        let built = build_formula(search_term, field_name, mode, case_insensitive);
        Ok(serde_json::to_value(built)?)
    }
}

/// Lists records, preferring `search_records` and falling back to a formula.
pub struct ListRecordsSafeTool;

#[async_trait]
impl Tool for ListRecordsSafeTool {
    fn name(&self) -> &str {
        "airtable_list_records_safe"
    }

    fn description(&self) -> &str {
        "List Airtable records with search fallback and query diagnostics"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "base_id": { "type": "string" },
                "table_id": { "type": "string" },
                "filter_by_formula": { "type": "string" },
                "max_records": { "type": "integer", "default": DEFAULT_MAX_RECORDS },
                "search_term": { "type": "string" },
                "search_field": { "type": "string", "description": "Field name used to build a formula" },
                "search_field_id": { "type": "string", "description": "Field id passed to search_records" },
                "use_search_records": { "type": "boolean", "default": false },
                "sort": { "type": "array", "description": "[{\"field\": ..., \"direction\": \"asc\"|\"desc\"}]" }
            },
            "required": ["base_id", "table_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let mut request = ListRecordsRequest::new(
            required_str(&params, "base_id")?,
            required_str(&params, "table_id")?,
        );
        request.filter_by_formula = opt_str(&params, "filter_by_formula");
        request.max_records = match params.get("max_records").and_then(Value::as_u64) {
            Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
            None => DEFAULT_MAX_RECORDS,
        };
        request.search_term = opt_str(&params, "search_term");
        request.search_field = opt_str(&params, "search_field");
        request.search_field_id = opt_str(&params, "search_field_id");
        request.use_search_records = params["use_search_records"].as_bool().unwrap_or(false);
        request.sort = params.get("sort").filter(|s| !s.is_null()).cloned();

        let result = list_records_safe(ctx.upstream(), &request).await?;
        Ok(serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CapabilityInfo, RemoteSession};
    use std::sync::Arc;

    struct Unreachable;

    #[async_trait]
    impl RemoteSession for Unreachable {
        async fn list_capabilities(&self) -> Result<Vec<CapabilityInfo>> {
            bail!("upstream not running")
        }
        async fn call_capability(&self, name: &str, _arguments: Value) -> Result<Value> {
            bail!("upstream not running: {}", name)
        }
        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_build_formula_tool_defaults() {
        let ctx = ToolContext::new(Arc::new(Unreachable));
        let result = BuildFormulaTool
            .execute(json!({ "search_term": "Defenx", "field_name": "Team Name" }), &ctx)
            .await
            .unwrap();
        assert_eq!(result["formula"], r#"SEARCH("defenx", LOWER({Team Name}))"#);
        assert!(result["notes"].as_array().is_some());
    }

    #[tokio::test]
    async fn test_build_formula_tool_equals_case_sensitive() {
        let ctx = ToolContext::new(Arc::new(Unreachable));
        let result = BuildFormulaTool
            .execute(
                json!({
                    "search_term": "x\"y",
                    "field_name": "F",
                    "mode": "equals",
                    "case_insensitive": false
                }),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result["formula"], r#"F = "x\"y""#);
    }

    #[tokio::test]
    async fn test_list_records_tool_requires_ids() {
        let ctx = ToolContext::new(Arc::new(Unreachable));
        let err = ListRecordsSafeTool
            .execute(json!({ "base_id": "base_1", "table_id": " " }), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("table_id must not be empty"));
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_discover_tool_surfaces_upstream_failure() {
        let ctx = ToolContext::new(Arc::new(Unreachable));
        let err = DiscoverSchemaTool.execute(json!({}), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("list_bases"));
    }
}
