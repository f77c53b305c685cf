//! Airtable `filterByFormula` construction.
//!
//! Only double quotes in the search term are escaped. Other formula syntax in
//! the term is passed through as-is.

use serde::Serialize;
use std::str::FromStr;

/// How the search term is compared against the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    Contains,
    Equals,
    StartsWith,
}

impl FromStr for MatchMode {
    type Err = std::convert::Infallible;

    /// Unknown modes fall back to [`MatchMode::Contains`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "equals" => MatchMode::Equals,
            "starts_with" => MatchMode::StartsWith,
            _ => MatchMode::Contains,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuiltFormula {
    pub formula: String,
    pub notes: Vec<String>,
}

/// Builds a filter expression matching `search_term` against `field_name`.
pub fn build_formula(
    search_term: &str,
    field_name: &str,
    mode: MatchMode,
    case_insensitive: bool,
) -> BuiltFormula {
    let escaped = search_term.replace('"', "\\\"");
    let mut notes = Vec::new();

    let (term, field_expr) = if case_insensitive {
        notes.push(
            "Case-insensitive: the search term is lowercased and the field is wrapped in LOWER()."
                .to_string(),
        );
        (
            escaped.to_lowercase(),
            format!("LOWER({})", field_reference(field_name)),
        )
    } else {
        (escaped, field_name.to_string())
    };

    let formula = match mode {
        MatchMode::Equals => format!("{} = \"{}\"", field_expr, term),
        MatchMode::StartsWith => format!(
            "LEFT({}, LEN(\"{}\")) = \"{}\"",
            field_expr, term, term
        ),
        MatchMode::Contains => format!("SEARCH(\"{}\", {})", term, field_expr),
    };

    notes.push(
        "Only double quotes in the search term are escaped; other formula syntax is used verbatim."
            .to_string(),
    );

    BuiltFormula { formula, notes }
}

/// `{Field}` reference syntax; names already in braces are kept as-is.
fn field_reference(field_name: &str) -> String {
    if field_name.starts_with('{') && field_name.ends_with('}') {
        field_name.to_string()
    } else {
        format!("{{{}}}", field_name.trim())
    }
}
