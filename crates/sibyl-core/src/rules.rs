//! Rule-based matcher: canned SQL for count/list/sum questions.
//!
//! The first catalog table whose name appears as a substring of the
//! normalized question wins, in catalog load order; the match is not
//! relevance-ranked. Questions that name no table, or a sum question over a
//! table with no obvious numeric column, fall through to the LLM path.

use serde::Serialize;

use crate::catalog::{Catalog, TableSchema};

/// Where a candidate SQL string came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    RuleEngine,
    LlmGenerated,
    LlmRepaired,
}

/// A candidate SQL string plus provenance. Lives only within one
/// resolution attempt; never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqlCandidate {
    pub sql: String,
    pub provenance: Provenance,
}

impl SqlCandidate {
    pub fn rule(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            provenance: Provenance::RuleEngine,
        }
    }

    pub fn generated(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            provenance: Provenance::LlmGenerated,
        }
    }

    pub fn repaired(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            provenance: Provenance::LlmRepaired,
        }
    }
}

fn find_table_mention<'a>(question: &str, catalog: &'a Catalog) -> Option<&'a TableSchema> {
    catalog
        .tables()
        .iter()
        .find(|table| question.contains(&table.name.to_lowercase()))
}

/// Match `question` against the canned intent templates.
pub fn match_rule(question: &str, catalog: &Catalog) -> Option<SqlCandidate> {
    let q = question.trim().to_lowercase();
    let table = find_table_mention(&q, catalog)?;

    if q.contains("how many") || q.contains("count") {
        return Some(SqlCandidate::rule(format!(
            "SELECT COUNT(*) FROM {};",
            table.name
        )));
    }

    if q.contains("list") || q.contains("show") {
        return Some(SqlCandidate::rule(format!(
            "SELECT * FROM {} LIMIT 100;",
            table.name
        )));
    }

    if q.contains("total") || q.contains("sum") {
        let numeric = table.columns.iter().find(|column| {
            let c = column.to_lowercase();
            c.contains("amount") || c.contains("price") || c.contains("total")
        })?;
        return Some(SqlCandidate::rule(format!(
            "SELECT SUM({}) FROM {};",
            numeric, table.name
        )));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableSchema;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            TableSchema::new("orders", vec!["id", "amount"]),
            TableSchema::new("customers", vec!["id", "name"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_count_intent() {
        let candidate = match_rule("How many orders do we have?", &catalog()).unwrap();
        assert_eq!(candidate.sql, "SELECT COUNT(*) FROM orders;");
        assert_eq!(candidate.provenance, Provenance::RuleEngine);
    }

    #[test]
    fn test_list_intent() {
        let candidate = match_rule("list customers", &catalog()).unwrap();
        assert_eq!(candidate.sql, "SELECT * FROM customers LIMIT 100;");
    }

    #[test]
    fn test_sum_intent_picks_first_numeric_column() {
        let candidate = match_rule("total amount orders", &catalog()).unwrap();
        assert_eq!(candidate.sql, "SELECT SUM(amount) FROM orders;");
    }

    #[test]
    fn test_sum_without_numeric_column_falls_through() {
        assert!(match_rule("total customers", &catalog()).is_none());
    }

    #[test]
    fn test_no_table_mention_falls_through() {
        assert!(match_rule("tell me a joke", &catalog()).is_none());
    }

    #[test]
    fn test_first_match_wins_in_catalog_order() {
        let catalog = Catalog::new(vec![
            TableSchema::new("orders", vec!["id"]),
            TableSchema::new("orders_archive", vec!["id", "price"]),
        ])
        .unwrap();
        // "orders" is a substring hit before "orders_archive" is considered.
        let candidate = match_rule("count orders_archive", &catalog).unwrap();
        assert_eq!(candidate.sql, "SELECT COUNT(*) FROM orders;");
    }
}
