//! Static table catalog used to scope queries.
//!
//! The catalog is loaded once from a JSON metadata file (a flat list of
//! `{table, description, columns}` records) and is read-only for the
//! lifetime of the process. Table identity is the name, compared
//! case-insensitively.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors raised while loading or constructing a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog metadata: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate table in catalog: {0}")]
    DuplicateTable(String),
}

/// Schema for a single table: name, ordered column list, optional description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(rename = "table")]
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TableSchema {
    /// Create a schema with the given name and columns.
    pub fn new<N, C>(name: N, columns: Vec<C>) -> Self
    where
        N: Into<String>,
        C: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            description: None,
        }
    }

    /// Set the free-text description used for relevance ranking.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Description text, falling back to a generated one when absent.
    pub fn description_text(&self) -> String {
        match &self.description {
            Some(text) => text.clone(),
            None => format!(
                "Table {} containing columns: {}",
                self.name,
                self.columns.join(", ")
            ),
        }
    }
}

/// Read-only directory of table schemas, in load order.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    tables: Vec<TableSchema>,
}

impl Catalog {
    /// Build a catalog from schemas, rejecting duplicate names.
    pub fn new(tables: Vec<TableSchema>) -> Result<Self, CatalogError> {
        let mut seen = std::collections::HashSet::new();
        for table in &tables {
            if !seen.insert(table.name.to_lowercase()) {
                return Err(CatalogError::DuplicateTable(table.name.clone()));
            }
        }
        Ok(Self { tables })
    }

    /// Load the catalog from a JSON metadata file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let tables: Vec<TableSchema> = serde_json::from_str(&raw)?;
        Self::new(tables)
    }

    /// Look up a table by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|table| table.name.eq_ignore_ascii_case(name))
    }

    /// All schemas in load order.
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// All table names in load order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|table| table.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Render the schema blocks for the given tables, for prompt context.
    ///
    /// Tables not present in the catalog are skipped silently.
    pub fn schema_context(&self, selected: &[String]) -> String {
        let mut context = String::new();
        for name in selected {
            if let Some(table) = self.get(name) {
                context.push_str(&format!(
                    "Table: {}\nColumns: {}\n\n",
                    table.name,
                    table.columns.join(", ")
                ));
            }
        }
        context
    }
}
