//! Execution results and presentation-ready response payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single result cell, coerced to JSON-safe values at the executor
/// boundary (decimal columns become floats before they get here).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("NULL"),
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Int(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

/// Columns and rows returned by the executor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl ExecutionResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Self {
        Self { columns, rows }
    }
}

/// Presentation-ready payload: a short text answer or a full table.
///
/// Invariant: `Text` is chosen iff there are no rows, or there is exactly
/// one column and one row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Text {
        message: String,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Scalar>>,
        insight: Option<String>,
    },
}

/// Shape an execution result into a response payload.
pub fn build_response(result: ExecutionResult, insight: Option<String>) -> ResponsePayload {
    if result.rows.is_empty() {
        return ResponsePayload::Text {
            message: "No results found.".to_string(),
        };
    }

    if result.columns.len() == 1 && result.rows.len() == 1 {
        return ResponsePayload::Text {
            message: format!("The result is {}.", result.rows[0][0]),
        };
    }

    ResponsePayload::Table {
        columns: result.columns,
        rows: result.rows,
        insight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_is_text() {
        let payload = build_response(ExecutionResult::new(vec!["count".into()], vec![]), None);
        assert_eq!(
            payload,
            ResponsePayload::Text {
                message: "No results found.".to_string()
            }
        );
    }

    #[test]
    fn test_single_cell_is_text() {
        let result = ExecutionResult::new(vec!["count".into()], vec![vec![Scalar::Int(42)]]);
        let payload = build_response(result, None);
        assert_eq!(
            payload,
            ResponsePayload::Text {
                message: "The result is 42.".to_string()
            }
        );
    }

    #[test]
    fn test_multi_row_is_table_with_insight() {
        let result = ExecutionResult::new(
            vec!["id".into(), "amount".into()],
            vec![
                vec![Scalar::Int(1), Scalar::Float(9.5)],
                vec![Scalar::Int(2), Scalar::Null],
            ],
        );
        let payload = build_response(result.clone(), Some("Amounts vary.".to_string()));
        match payload {
            ResponsePayload::Table {
                columns,
                rows,
                insight,
            } => {
                assert_eq!(columns, result.columns);
                assert_eq!(rows, result.rows);
                assert_eq!(insight.as_deref(), Some("Amounts vary."));
            }
            other => panic!("expected table payload, got {other:?}"),
        }
    }

    #[test]
    fn test_single_column_many_rows_is_table() {
        let result = ExecutionResult::new(
            vec!["name".into()],
            vec![vec![Scalar::from("a")], vec![Scalar::from("b")]],
        );
        assert!(matches!(
            build_response(result, None),
            ResponsePayload::Table { .. }
        ));
    }

    #[test]
    fn test_scalar_serializes_to_plain_json() {
        let row = vec![
            Scalar::Null,
            Scalar::Int(1),
            Scalar::Float(2.5),
            Scalar::from("x"),
            Scalar::Bool(true),
        ];
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json, serde_json::json!([null, 1, 2.5, "x", true]));
    }
}
