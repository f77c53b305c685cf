//! Airtable schema discovery.
//!
//! Walks `list_bases` → `list_tables` → `describe_table` on the upstream
//! server and condenses each table's fields into a [`FieldSummary`] so a
//! caller can pick sensible search fields without reading raw schema JSON.

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::client::RemoteSession;

/// Field types whose values can be text-searched.
const TEXT_FIELD_TYPES: &[&str] = &[
    "singleLineText",
    "multilineText",
    "richText",
    "email",
    "url",
    "phoneNumber",
];
const LINKED_RECORD_TYPE: &str = "multipleRecordLinks";
const LOOKUP_TYPE: &str = "lookup";
const ROLLUP_TYPE: &str = "rollup";

/// Reply shapes that may carry a table list, tried in order.
const TABLE_SHAPES: &[&[&str]] = &[&["tables"], &["data", "tables"], &["records"], &["items"]];
/// Reply shapes that may carry a base list, tried in order.
const BASE_SHAPES: &[&[&str]] = &[&["bases"], &["data", "bases"], &["items"]];

const FORMULA_NOTE: &str = "For non-text fields (numbers, dates, links, lookups) filter with \
     filterByFormula via airtable_build_formula instead of search_records.";
const SEARCH_FIELD_SUGGESTION: &str = "search_records only matches text fields; pass \
     search_field_id with one of the text_fields ids, or use airtable_list_records_safe with \
     search_field to build a formula.";

/// Field names grouped by how they can be queried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    pub text_fields: Vec<String>,
    pub linked_record_fields: Vec<String>,
    pub lookup_fields: Vec<String>,
    pub rollup_fields: Vec<String>,
    pub field_types: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: FieldSummary,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResult {
    pub bases: Vec<Value>,
    pub tables: Vec<Value>,
    pub tables_summary: Vec<TableSummary>,
    pub diagnostics: Diagnostics,
    pub suggestions: Vec<String>,
}

/// Classifies fields (`{name|id, type|fieldType}` objects) by type.
pub fn summarize_fields(fields: &[Value]) -> FieldSummary {
    let mut summary = FieldSummary::default();

    for field in fields {
        let name = field
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| field.get("id").and_then(Value::as_str))
            .unwrap_or("unknown")
            .to_string();
        let field_type = field
            .get("type")
            .and_then(Value::as_str)
            .or_else(|| field.get("fieldType").and_then(Value::as_str));

        let Some(field_type) = field_type else {
            continue;
        };
        summary
            .field_types
            .insert(name.clone(), field_type.to_string());

        if TEXT_FIELD_TYPES.contains(&field_type) {
            summary.text_fields.push(name);
        } else if field_type == LINKED_RECORD_TYPE {
            summary.linked_record_fields.push(name);
        } else if field_type == LOOKUP_TYPE {
            summary.lookup_fields.push(name);
        } else if field_type == ROLLUP_TYPE {
            summary.rollup_fields.push(name);
        }
    }

    summary
}

/// First array found at one of `shapes` inside `reply`.
pub(crate) fn extract_list(reply: &Value, shapes: &[&[&str]]) -> Vec<Value> {
    shapes
        .iter()
        .find_map(|path| {
            path.iter()
                .try_fold(reply, |node, key| node.get(*key))
                .and_then(Value::as_array)
        })
        .cloned()
        .unwrap_or_default()
}

fn inline_fields(table: &Value) -> Option<&Vec<Value>> {
    table
        .get("fields")
        .and_then(Value::as_array)
        .filter(|fields| !fields.is_empty())
}

/// Discovers bases and, when `base_id` is given, the tables of that base.
///
/// Upstream failures propagate; there are no retries.
pub async fn discover_schema(
    upstream: &dyn RemoteSession,
    base_id: Option<&str>,
    detail_level: &str,
) -> Result<DiscoveryResult> {
    let bases_reply = upstream.call_capability("list_bases", json!({})).await?;
    let bases = extract_list(&bases_reply, BASE_SHAPES);

    let mut diagnostics = Diagnostics::default();
    let mut suggestions = Vec::new();

    let Some(base_id) = base_id.filter(|b| !b.trim().is_empty()) else {
        diagnostics.warnings.push(
            "No base_id provided; only bases were listed. Tables are discovered per base."
                .to_string(),
        );
        suggestions
            .push("Call airtable_discover_schema again with base_id set to one of the bases.".to_string());
        return Ok(DiscoveryResult {
            bases,
            tables: Vec::new(),
            tables_summary: Vec::new(),
            diagnostics,
            suggestions,
        });
    };

    let tables_reply = upstream
        .call_capability(
            "list_tables",
            json!({ "baseId": base_id, "detailLevel": detail_level }),
        )
        .await?;
    let mut tables = extract_list(&tables_reply, TABLE_SHAPES);

    for table in tables.iter_mut() {
        if inline_fields(table).is_some() {
            continue;
        }
        let Some(table_id) = table.get("id").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };

        let described = upstream
            .call_capability(
                "describe_table",
                json!({ "baseId": base_id, "tableId": table_id, "detailLevel": detail_level }),
            )
            .await?;
        let first = extract_list(&described, TABLE_SHAPES)
            .into_iter()
            .next()
            .unwrap_or(described);
        if let (Some(fields), Some(obj)) = (first.get("fields").cloned(), table.as_object_mut()) {
            obj.insert("fields".to_string(), fields);
        }
    }

    let tables_summary = tables
        .iter()
        .map(|table| TableSummary {
            id: table.get("id").and_then(Value::as_str).map(str::to_string),
            name: table.get("name").and_then(Value::as_str).map(str::to_string),
            fields: summarize_fields(
                table
                    .get("fields")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default(),
            ),
        })
        .collect();

    diagnostics.notes.push(FORMULA_NOTE.to_string());
    suggestions.push(SEARCH_FIELD_SUGGESTION.to_string());

    Ok(DiscoveryResult {
        bases,
        tables,
        tables_summary,
        diagnostics,
        suggestions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CapabilityInfo;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned replies per tool name and records every call.
    struct ScriptedUpstream {
        replies: Vec<(&'static str, Value)>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedUpstream {
        fn new(replies: Vec<(&'static str, Value)>) -> Self {
            Self {
                replies,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteSession for ScriptedUpstream {
        async fn list_capabilities(&self) -> Result<Vec<CapabilityInfo>> {
            Ok(vec![])
        }

        async fn call_capability(&self, name: &str, arguments: Value) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            match self.replies.iter().find(|(n, _)| *n == name) {
                Some((_, reply)) => Ok(reply.clone()),
                None => bail!("unexpected tool call: {}", name),
            }
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_summarize_classifies_fields() {
        let fields = vec![
            json!({ "name": "Name", "type": "singleLineText" }),
            json!({ "name": "Notes", "type": "multilineText" }),
            json!({ "name": "Owner", "type": "multipleRecordLinks" }),
            json!({ "id": "fldLookup", "fieldType": "lookup" }),
            json!({ "name": "Total", "type": "rollup" }),
            json!({ "name": "Count", "type": "number" }),
            json!({ "type": "email" }),
            json!({ "name": "Untyped" }),
        ];
        let summary = summarize_fields(&fields);
        assert_eq!(summary.text_fields, vec!["Name", "Notes", "unknown"]);
        assert_eq!(summary.linked_record_fields, vec!["Owner"]);
        assert_eq!(summary.lookup_fields, vec!["fldLookup"]);
        assert_eq!(summary.rollup_fields, vec!["Total"]);
        assert_eq!(summary.field_types.get("Count").map(String::as_str), Some("number"));
        assert!(!summary.field_types.contains_key("Untyped"));
    }

    #[test]
    fn test_extract_list_tries_shapes_in_order() {
        assert_eq!(extract_list(&json!({ "tables": [1] }), TABLE_SHAPES), vec![json!(1)]);
        assert_eq!(
            extract_list(&json!({ "data": { "tables": [2] } }), TABLE_SHAPES),
            vec![json!(2)]
        );
        assert_eq!(extract_list(&json!({ "records": [3] }), TABLE_SHAPES), vec![json!(3)]);
        assert_eq!(extract_list(&json!({ "items": [4] }), TABLE_SHAPES), vec![json!(4)]);
        assert!(extract_list(&json!({ "tables": "nope" }), TABLE_SHAPES).is_empty());
        assert!(extract_list(&json!("text"), TABLE_SHAPES).is_empty());
    }

    #[tokio::test]
    async fn test_discover_without_base_lists_bases_only() {
        let upstream = ScriptedUpstream::new(vec![(
            "list_bases",
            json!({ "bases": [{ "id": "base_1", "name": "Main" }] }),
        )]);

        let result = discover_schema(&upstream, None, "full").await.unwrap();

        assert_eq!(result.bases[0]["id"], "base_1");
        assert!(result.tables.is_empty());
        assert!(!result.diagnostics.warnings.is_empty());
        assert!(!result.suggestions.is_empty());
        assert_eq!(upstream.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_discover_describes_tables_without_fields() {
        let upstream = ScriptedUpstream::new(vec![
            ("list_bases", json!({ "bases": [{ "id": "base_1" }] })),
            (
                "list_tables",
                json!({ "data": { "tables": [
                    { "id": "tbl_inline", "name": "People", "fields": [
                        { "name": "Name", "type": "singleLineText" }
                    ] },
                    { "id": "tbl_bare", "name": "Projects" }
                ] } }),
            ),
            (
                "describe_table",
                json!({ "tables": [{ "id": "tbl_bare", "fields": [
                    { "name": "Lead", "type": "multipleRecordLinks" },
                    { "name": "Budget", "type": "rollup" }
                ] }] }),
            ),
        ]);

        let result = discover_schema(&upstream, Some("base_1"), "full")
            .await
            .unwrap();

        let calls = upstream.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].1, json!({ "baseId": "base_1", "detailLevel": "full" }));
        assert_eq!(calls[2].0, "describe_table");
        assert_eq!(calls[2].1["tableId"], "tbl_bare");

        assert_eq!(result.tables.len(), 2);
        assert_eq!(result.tables_summary[0].fields.text_fields, vec!["Name"]);
        assert_eq!(
            result.tables_summary[1].fields.linked_record_fields,
            vec!["Lead"]
        );
        assert_eq!(result.tables_summary[1].fields.rollup_fields, vec!["Budget"]);
        assert_eq!(result.diagnostics.notes.len(), 1);
        assert_eq!(result.suggestions.len(), 1);
    }

    #[tokio::test]
    async fn test_discover_propagates_upstream_failure() {
        let upstream = ScriptedUpstream::new(vec![("list_bases", json!({ "bases": [] }))]);
        let err = discover_schema(&upstream, Some("base_1"), "full")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("list_tables"));
    }
}
