//! Best-effort insight annotation for multi-row results.

use std::sync::Arc;

use async_trait::async_trait;

use sibyl_core::agents::{AgentError, InsightGenerator};
use sibyl_core::response::ExecutionResult;

use crate::llm::LlmClient;
use crate::prompts;

/// Rows handed to the model; keeps the prompt small.
const SAMPLE_ROWS: usize = 10;

pub struct LlmInsightAgent {
    client: Arc<LlmClient>,
}

impl LlmInsightAgent {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InsightGenerator for LlmInsightAgent {
    async fn insight(
        &self,
        question: &str,
        result: &ExecutionResult,
    ) -> Result<String, AgentError> {
        let sample: Vec<_> = result.rows.iter().take(SAMPLE_ROWS).collect();
        let columns_json = serde_json::to_string(&result.columns)
            .map_err(|err| AgentError::Protocol(err.to_string()))?;
        let rows_json = serde_json::to_string(&sample)
            .map_err(|err| AgentError::Protocol(err.to_string()))?;

        let prompt = prompts::insight(question, &columns_json, &rows_json);
        let text = self.client.chat(&prompt).await?;
        Ok(text)
    }
}
