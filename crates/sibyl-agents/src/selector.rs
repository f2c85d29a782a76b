//! Embedding-based table selector.
//!
//! Each catalog table's description is embedded once at construction; a
//! question is answered by embedding it and scanning for the nearest
//! descriptions by L2 distance. The catalog is small (an in-memory scan
//! beats an index until thousands of tables), and the selector stays an
//! opaque collaborator behind the [`TableSelector`] trait.

use std::sync::Arc;

use async_trait::async_trait;

use sibyl_core::agents::{AgentError, TableSelector};
use sibyl_core::catalog::Catalog;

use crate::llm::{LlmClient, LlmError};

struct TableEmbedding {
    name: String,
    vector: Vec<f32>,
}

pub struct EmbeddingTableSelector {
    client: Arc<LlmClient>,
    entries: Vec<TableEmbedding>,
}

impl EmbeddingTableSelector {
    /// Embed every catalog table description up front.
    pub async fn build(client: Arc<LlmClient>, catalog: &Catalog) -> Result<Self, LlmError> {
        let mut entries = Vec::with_capacity(catalog.len());
        for table in catalog.tables() {
            let vector = client.embed(&table.description_text()).await?;
            entries.push(TableEmbedding {
                name: table.name.clone(),
                vector,
            });
        }
        Ok(Self { client, entries })
    }
}

#[async_trait]
impl TableSelector for EmbeddingTableSelector {
    async fn select(&self, question: &str, top_k: usize) -> Result<Vec<String>, AgentError> {
        if self.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let query = self.client.embed(question).await?;
        Ok(rank_by_distance(&self.entries, &query, top_k))
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn rank_by_distance(entries: &[TableEmbedding], query: &[f32], top_k: usize) -> Vec<String> {
    let mut scored: Vec<(f32, &str)> = entries
        .iter()
        .map(|entry| (l2_distance(&entry.vector, query), entry.name.as_str()))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored
        .into_iter()
        .take(top_k)
        .map(|(_, name)| name.to_string())
        .collect()
}
