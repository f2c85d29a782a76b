//! LLM-backed SQL author and repairer.

use std::sync::Arc;

use async_trait::async_trait;

use sibyl_core::agents::{AgentError, SqlAuthor};
use sibyl_core::validate::AllowedTableSet;

use crate::llm::{clean_sql, LlmClient};
use crate::prompts;

/// Authors candidate SQL via chat completion; repairs broken candidates
/// with a dedicated fix prompt.
pub struct LlmSqlAuthor {
    client: Arc<LlmClient>,
}

impl LlmSqlAuthor {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SqlAuthor for LlmSqlAuthor {
    async fn author(
        &self,
        question: &str,
        _allowed: &AllowedTableSet,
        schema_context: &str,
    ) -> Result<String, AgentError> {
        let prompt = prompts::sql_generation(schema_context, question);
        let completion = self.client.chat(&prompt).await?;
        let sql = clean_sql(&completion);
        if sql.is_empty() {
            return Err(AgentError::Protocol("empty SQL completion".to_string()));
        }
        Ok(sql)
    }

    async fn repair(
        &self,
        bad_sql: &str,
        _allowed: &AllowedTableSet,
        schema_context: &str,
    ) -> Result<Option<String>, AgentError> {
        let prompt = prompts::sql_repair(schema_context, bad_sql);
        let completion = match self.client.chat(&prompt).await {
            Ok(text) => text,
            // A failed repair round is "nothing usable", not a hard error;
            // the orchestrator falls back to a clarification turn.
            Err(err) => {
                tracing::warn!(error = %err, "repair completion failed");
                return Ok(None);
            }
        };
        let sql = clean_sql(&completion);
        if sql.is_empty() {
            return Ok(None);
        }
        Ok(Some(sql))
    }
}
