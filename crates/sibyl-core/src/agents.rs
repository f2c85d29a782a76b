//! Collaborator trait seams consumed by the orchestrator.
//!
//! Implementations live outside the core (network LLM clients, the
//! database executor); tests substitute stubs. All traits are object-safe
//! and shared behind `Arc<dyn ...>` handles injected at construction.

use async_trait::async_trait;

use crate::response::ExecutionResult;
use crate::validate::{AllowedTableSet, SafeSql};

/// Failures crossing a collaborator boundary.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unusable response: {0}")]
    Protocol(String),
    #[error("database error: {0}")]
    Database(String),
}

/// Ranks catalog tables by relevance to a question. May return empty.
#[async_trait]
pub trait TableSelector: Send + Sync {
    async fn select(&self, question: &str, top_k: usize) -> Result<Vec<String>, AgentError>;
}

/// Produces candidate SQL for a question, and repairs broken candidates.
#[async_trait]
pub trait SqlAuthor: Send + Sync {
    async fn author(
        &self,
        question: &str,
        allowed: &AllowedTableSet,
        schema_context: &str,
    ) -> Result<String, AgentError>;

    /// Attempt to fix a query that failed validation. `None` means the
    /// collaborator produced nothing usable.
    async fn repair(
        &self,
        bad_sql: &str,
        allowed: &AllowedTableSet,
        schema_context: &str,
    ) -> Result<Option<String>, AgentError>;
}

/// Runs validated SQL against the database.
///
/// Accepting only [`SafeSql`] makes the validator impossible to bypass.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &SafeSql) -> Result<ExecutionResult, AgentError>;
}

/// Best-effort natural-language annotation for multi-row results.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn insight(
        &self,
        question: &str,
        result: &ExecutionResult,
    ) -> Result<String, AgentError>;
}
