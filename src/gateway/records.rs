//! Record listing with a search-then-list fallback.
//!
//! `search_records` on the upstream server only works against text fields and
//! fails outright otherwise. [`list_records_safe`] treats that failure as a
//! diagnostic, falls back to `list_records` with a formula, and reports what
//! it did so the caller can tell a genuinely empty table from a bad query.

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::formula::{build_formula, MatchMode};
use super::schema::extract_list;
use crate::client::RemoteSession;

/// Below this many records a filtered listing may miss matches.
pub const DEFAULT_MAX_RECORDS: u32 = 200;

const RECORD_SHAPES: &[&[&str]] = &[&["records"], &["data", "records"], &["items"]];

pub const SEARCH_TOOL: &str = "search_records";
pub const LIST_TOOL: &str = "list_records";

#[derive(Debug, Clone)]
pub struct ListRecordsRequest {
    pub base_id: String,
    pub table_id: String,
    pub filter_by_formula: Option<String>,
    pub max_records: u32,
    pub search_term: Option<String>,
    pub search_field: Option<String>,
    pub search_field_id: Option<String>,
    pub use_search_records: bool,
    pub sort: Option<Value>,
}

impl ListRecordsRequest {
    pub fn new(base_id: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            base_id: base_id.into(),
            table_id: table_id.into(),
            filter_by_formula: None,
            max_records: DEFAULT_MAX_RECORDS,
            search_term: None,
            search_field: None,
            search_field_id: None,
            use_search_records: false,
            sort: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListDiagnostics {
    pub used_tool: String,
    pub fallback_used: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryEcho {
    pub base_id: String,
    pub table_id: String,
    pub filter_by_formula: Option<String>,
    pub max_records: u32,
    pub search_term: Option<String>,
    pub search_field: Option<String>,
    pub sort: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafeListResult {
    /// Upstream reply, unmodified.
    pub records: Value,
    pub diagnostics: ListDiagnostics,
    pub suggestions: Vec<String>,
    pub query: QueryEcho,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn record_count(reply: &Value) -> usize {
    match reply {
        Value::Array(items) => items.len(),
        other => extract_list(other, RECORD_SHAPES).len(),
    }
}

pub async fn list_records_safe(
    upstream: &dyn RemoteSession,
    request: &ListRecordsRequest,
) -> Result<SafeListResult> {
    let search_term = non_blank(&request.search_term);
    let mut formula = non_blank(&request.filter_by_formula).map(str::to_string);
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();
    let mut fallback_used = false;

    let echo = |formula: Option<String>| QueryEcho {
        base_id: request.base_id.clone(),
        table_id: request.table_id.clone(),
        filter_by_formula: formula,
        max_records: request.max_records,
        search_term: request.search_term.clone(),
        search_field: request.search_field.clone(),
        sort: request.sort.clone(),
    };

    if let (true, Some(term)) = (request.use_search_records, search_term) {
        let mut args = json!({
            "baseId": request.base_id,
            "tableId": request.table_id,
            "searchTerm": term,
            "maxRecords": request.max_records,
        });
        if let Some(field_id) = non_blank(&request.search_field_id) {
            args["fieldIds"] = json!([field_id]);
        }

        match upstream.call_capability(SEARCH_TOOL, args).await {
            Ok(records) => {
                return Ok(SafeListResult {
                    records,
                    diagnostics: ListDiagnostics {
                        used_tool: SEARCH_TOOL.to_string(),
                        fallback_used: false,
                        warnings,
                    },
                    suggestions,
                    query: echo(formula),
                });
            }
            Err(e) => {
                tracing::warn!(table_id = %request.table_id, error = %e, "search_records failed, falling back to list_records");
                warnings.push(format!(
                    "search_records failed ({:#}); fell back to list_records.",
                    e
                ));
                fallback_used = true;
            }
        }
    }

    if formula.is_none() {
        if let (Some(term), Some(field)) = (search_term, non_blank(&request.search_field)) {
            let built = build_formula(term, field, MatchMode::Contains, true);
            suggestions.push(format!(
                "filterByFormula was built automatically from search_term and search_field: {}",
                built.formula
            ));
            formula = Some(built.formula);
        }
    }

    let mut args = Map::new();
    args.insert("baseId".to_string(), json!(request.base_id));
    args.insert("tableId".to_string(), json!(request.table_id));
    args.insert("maxRecords".to_string(), json!(request.max_records));
    if let Some(f) = &formula {
        args.insert("filterByFormula".to_string(), json!(f));
    }
    if let Some(sort) = &request.sort {
        args.insert("sort".to_string(), sort.clone());
    }

    let records = upstream
        .call_capability(LIST_TOOL, Value::Object(args))
        .await?;

    if formula.is_none() && search_term.is_none() {
        warnings.push(
            "No filterByFormula or search_term supplied; results may be broad.".to_string(),
        );
    }
    if request.max_records < DEFAULT_MAX_RECORDS {
        warnings.push(format!(
            "max_records is {} (< {}); the listing may miss matches.",
            request.max_records, DEFAULT_MAX_RECORDS
        ));
    }
    if record_count(&records) == 0 {
        warnings.push("No records matched.".to_string());
        suggestions.push(
            "Inspect the table schema with airtable_discover_schema to confirm field names and types."
                .to_string(),
        );
    }

    Ok(SafeListResult {
        records,
        diagnostics: ListDiagnostics {
            used_tool: LIST_TOOL.to_string(),
            fallback_used,
            warnings,
        },
        suggestions,
        query: echo(formula),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CapabilityInfo;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records calls; `search_records` fails when `fail_search` is set.
    struct FakeAirtable {
        fail_search: bool,
        records: Value,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl FakeAirtable {
        fn new(fail_search: bool, records: Value) -> Self {
            Self {
                fail_search,
                records,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteSession for FakeAirtable {
        async fn list_capabilities(&self) -> Result<Vec<CapabilityInfo>> {
            Ok(vec![])
        }

        async fn call_capability(&self, name: &str, arguments: Value) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            if name == SEARCH_TOOL && self.fail_search {
                bail!("No text fields available to search.");
            }
            Ok(self.records.clone())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_builds_formula_from_search_field() {
        let upstream = FakeAirtable::new(false, json!({ "records": [{ "id": "rec_1" }] }));
        let mut request = ListRecordsRequest::new("base_1", "table_1");
        request.search_term = Some("Alice".to_string());
        request.search_field = Some("Owner".to_string());

        let result = list_records_safe(&upstream, &request).await.unwrap();

        let expected = build_formula("Alice", "Owner", MatchMode::Contains, true).formula;
        let calls = upstream.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, LIST_TOOL);
        assert_eq!(calls[0].1["filterByFormula"], json!(expected));
        assert_eq!(result.records["records"][0]["id"], "rec_1");
        assert_eq!(result.query.filter_by_formula.as_deref(), Some(expected.as_str()));
        assert_eq!(result.diagnostics.used_tool, LIST_TOOL);
        assert!(result.suggestions[0].contains("built automatically"));
        assert!(result.diagnostics.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_falls_back_to_list() {
        let upstream = FakeAirtable::new(true, json!({ "records": [] }));
        let mut request = ListRecordsRequest::new("base_1", "table_1");
        request.search_term = Some("Alpha".to_string());
        request.use_search_records = true;
        request.max_records = 50;

        let result = list_records_safe(&upstream, &request).await.unwrap();

        assert!(result.diagnostics.fallback_used);
        assert_eq!(result.diagnostics.used_tool, LIST_TOOL);
        let warnings = &result.diagnostics.warnings;
        assert!(warnings[0].contains("No text fields available"));
        assert!(warnings.iter().any(|w| w.contains("may miss matches")));
        assert!(warnings.iter().any(|w| w.contains("No records matched")));
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.contains("airtable_discover_schema")));
        // Search term alone, no field: nothing to build a formula from.
        assert!(result.query.filter_by_formula.is_none());
        assert_eq!(upstream.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_successful_search_returns_immediately() {
        let upstream = FakeAirtable::new(false, json!({ "records": [{ "id": "rec_9" }] }));
        let mut request = ListRecordsRequest::new("base_1", "table_1");
        request.search_term = Some("Alpha".to_string());
        request.search_field_id = Some("fldName".to_string());
        request.use_search_records = true;

        let result = list_records_safe(&upstream, &request).await.unwrap();

        let calls = upstream.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, SEARCH_TOOL);
        assert_eq!(calls[0].1["fieldIds"], json!(["fldName"]));
        assert_eq!(result.diagnostics.used_tool, SEARCH_TOOL);
        assert!(!result.diagnostics.fallback_used);
    }

    #[tokio::test]
    async fn test_explicit_formula_wins_and_unfiltered_warns() {
        let upstream = FakeAirtable::new(false, json!({ "records": [{ "id": "r" }] }));
        let mut request = ListRecordsRequest::new("base_1", "table_1");
        request.filter_by_formula = Some("{Status} = \"Open\"".to_string());
        request.search_term = Some("ignored".to_string());
        request.search_field = Some("Name".to_string());
        request.sort = Some(json!([{ "field": "Name", "direction": "asc" }]));

        let result = list_records_safe(&upstream, &request).await.unwrap();
        let calls = upstream.calls();
        assert_eq!(calls[0].1["filterByFormula"], "{Status} = \"Open\"");
        assert_eq!(calls[0].1["sort"][0]["field"], "Name");
        assert!(result.suggestions.is_empty());

        let broad = FakeAirtable::new(false, json!({ "records": [{ "id": "r" }] }));
        let plain = ListRecordsRequest::new("base_1", "table_1");
        let result = list_records_safe(&broad, &plain).await.unwrap();
        assert!(broad.calls()[0].1.get("filterByFormula").is_none());
        assert!(result
            .diagnostics
            .warnings
            .iter()
            .any(|w| w.contains("results may be broad")));
    }
}
