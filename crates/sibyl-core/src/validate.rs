//! SQL safety validator.
//!
//! Every SQL string must pass through [`validate`] before it can reach an
//! executor; the returned [`SafeSql`] newtype is the executor's only
//! accepted input, so there is no bypass path to misuse.
//!
//! The checks are textual (regex word-boundary scans), not a SQL parse.
//! That trades precision for simplicity: a forbidden keyword inside a
//! string literal false-positives, and creative casing inside quoted
//! identifiers can slip through. This layer is defense in depth in front of
//! a read-only database role, not the sole access-control boundary.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::TableSchema;

/// Verbs that disqualify a query outright, matched as whole words.
pub const FORBIDDEN_KEYWORDS: [&str; 7] = [
    "drop", "delete", "update", "insert", "alter", "truncate", "create",
];

/// Row bound appended to queries that carry no LIMIT of their own.
pub const DEFAULT_MAX_ROWS: u32 = 1000;

/// Validation failures, in check order.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("only SELECT queries are allowed")]
    NotAReadQuery,
    #[error("query contains forbidden operation: {0}")]
    ForbiddenOperation(String),
    #[error("unauthorized table used: {0}")]
    UnauthorizedTable(String),
}

/// A SQL string that has passed validation. Only constructed here.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct SafeSql(String);

impl SafeSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SafeSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase-normalized set of table names a query may reference.
///
/// An empty set disables the table-scope check (used by tool-style callers
/// that execute against the full catalog).
#[derive(Clone, Debug, Default)]
pub struct AllowedTableSet {
    names: HashSet<String>,
}

impl AllowedTableSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Allow every table in the given schemas.
    pub fn from_schemas(schemas: &[TableSchema]) -> Self {
        Self::new(schemas.iter().map(|schema| schema.name.as_str()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in unspecified order, for prompt rendering.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// True when the statement starts with `select` or `with`.
pub fn is_read_query(sql: &str) -> bool {
    let clean = sql.trim().to_lowercase();
    clean.starts_with("select") || clean.starts_with("with")
}

/// First forbidden verb appearing as a whole word, if any.
fn forbidden_keyword(sql: &str) -> Option<&'static str> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let regex = PATTERN.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b({})\b", FORBIDDEN_KEYWORDS.join("|")))
            .expect("forbidden keyword pattern")
    });
    let matched = regex.find(sql)?;
    let lowered = matched.as_str().to_lowercase();
    FORBIDDEN_KEYWORDS
        .iter()
        .find(|keyword| **keyword == lowered)
        .copied()
}

/// Identifiers following a `from` or `join` keyword, lowercased, in order.
pub fn referenced_tables(sql: &str) -> Vec<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let regex = PATTERN
        .get_or_init(|| Regex::new(r"(?i)\b(?:from|join)\s+(\w+)").expect("table scan pattern"));
    regex
        .captures_iter(sql)
        .map(|captures| captures[1].to_lowercase())
        .collect()
}

/// Append `LIMIT max_rows` when the query carries no LIMIT keyword.
///
/// Idempotent: a second application is a no-op because the first inserted
/// the keyword.
pub fn enforce_limit(sql: &str, max_rows: u32) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let regex = PATTERN.get_or_init(|| Regex::new(r"(?i)\blimit\b").expect("limit pattern"));
    if regex.is_match(sql) {
        return sql.to_string();
    }
    let trimmed = sql.trim_end().trim_end_matches(';').trim_end();
    format!("{trimmed} LIMIT {max_rows};")
}

/// Validate `sql` against `allowed`, using the default row bound.
pub fn validate(sql: &str, allowed: &AllowedTableSet) -> Result<SafeSql, ValidationError> {
    validate_with_limit(sql, allowed, DEFAULT_MAX_ROWS)
}

/// Validate `sql` against `allowed`, bounding unbounded results to `max_rows`.
///
/// Checks run in order and short-circuit on the first failure:
/// statement kind, keyword denylist, table scope, result bounding.
pub fn validate_with_limit(
    sql: &str,
    allowed: &AllowedTableSet,
    max_rows: u32,
) -> Result<SafeSql, ValidationError> {
    if !is_read_query(sql) {
        return Err(ValidationError::NotAReadQuery);
    }
    if let Some(keyword) = forbidden_keyword(sql) {
        return Err(ValidationError::ForbiddenOperation(keyword.to_string()));
    }
    if !allowed.is_empty() {
        for table in referenced_tables(sql) {
            if !allowed.contains(&table) {
                return Err(ValidationError::UnauthorizedTable(table));
            }
        }
    }
    Ok(SafeSql(enforce_limit(sql, max_rows)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_only() -> AllowedTableSet {
        AllowedTableSet::new(["orders"])
    }

    #[test]
    fn test_rejects_non_read_statements() {
        let err = validate("DELETE FROM users;", &AllowedTableSet::default()).unwrap_err();
        assert_eq!(err, ValidationError::NotAReadQuery);
        assert_eq!(
            validate("  update orders set x = 1", &orders_only()).unwrap_err(),
            ValidationError::NotAReadQuery
        );
    }

    #[test]
    fn test_accepts_with_prefix() {
        let safe = validate("WITH t AS (SELECT 1) SELECT * FROM orders", &orders_only()).unwrap();
        assert!(safe.as_str().starts_with("WITH"));
    }

    #[test]
    fn test_denylist_matches_whole_words_anywhere() {
        let err = validate("SELECT 1; DROP TABLE orders", &orders_only()).unwrap_err();
        // Statement kind passes (starts with select), denylist catches it.
        assert_eq!(err, ValidationError::ForbiddenOperation("drop".to_string()));
    }

    #[test]
    fn test_denylist_ignores_substrings() {
        // "created_at" contains "create" but not as a whole word.
        let safe = validate("SELECT created_at FROM orders", &orders_only()).unwrap();
        assert!(safe.as_str().contains("created_at"));
    }

    #[test]
    fn test_denylist_false_positive_in_string_literal() {
        // Documented tradeoff of textual filtering: the keyword is inside a
        // literal, yet the query is still rejected.
        let err = validate("SELECT * FROM orders WHERE note = 'please delete me'", &orders_only())
            .unwrap_err();
        assert_eq!(err, ValidationError::ForbiddenOperation("delete".to_string()));
    }

    #[test]
    fn test_table_scope_names_offender() {
        let err = validate("SELECT * FROM customers", &orders_only()).unwrap_err();
        assert_eq!(err, ValidationError::UnauthorizedTable("customers".to_string()));

        let err = validate(
            "SELECT * FROM orders o JOIN customers c ON o.id = c.order_id",
            &orders_only(),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::UnauthorizedTable("customers".to_string()));
    }

    #[test]
    fn test_table_scope_false_negative_on_quoted_identifiers() {
        // Documented tradeoff: the lexical scan only sees bare identifiers,
        // so a quoted table name slips past the scope check. The read-only
        // database role is the real boundary behind this filter.
        let result = validate(r#"SELECT * FROM "customers""#, &orders_only());
        assert!(result.is_ok());
    }

    #[test]
    fn test_table_scope_is_case_insensitive() {
        let allowed = AllowedTableSet::new(["Orders"]);
        assert!(validate("SELECT * FROM ORDERS", &allowed).is_ok());
    }

    #[test]
    fn test_empty_allowlist_skips_scope_check() {
        let safe = validate("SELECT * FROM anything", &AllowedTableSet::default()).unwrap();
        assert_eq!(safe.as_str(), "SELECT * FROM anything LIMIT 1000;");
    }

    #[test]
    fn test_limit_appended_when_missing() {
        let safe = validate("SELECT * FROM orders", &orders_only()).unwrap();
        assert_eq!(safe.as_str(), "SELECT * FROM orders LIMIT 1000;");
    }

    #[test]
    fn test_enforce_limit_is_idempotent() {
        let once = enforce_limit("SELECT * FROM orders", 1000);
        let twice = enforce_limit(&once, 1000);
        assert_eq!(once, twice);

        let already = "SELECT * FROM orders LIMIT 5";
        assert_eq!(enforce_limit(already, 1000), already);
    }

    #[test]
    fn test_referenced_tables_extraction() {
        let tables = referenced_tables(
            "SELECT * FROM Orders o JOIN customers c ON o.id = c.order_id JOIN items i ON 1=1",
        );
        assert_eq!(tables, vec!["orders", "customers", "items"]);
    }

    #[test]
    fn test_custom_row_bound() {
        let safe = validate_with_limit("SELECT * FROM orders", &orders_only(), 50).unwrap();
        assert_eq!(safe.as_str(), "SELECT * FROM orders LIMIT 50;");
    }
}
