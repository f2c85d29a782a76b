//! Query-resolution orchestrator.
//!
//! One state machine per incoming question:
//! cache check → rule match → table selection → bounded
//! generate/validate/repair loop → execute → shape → write-through cache.
//! A clarification turn is the terminal alternative when table selection
//! comes back empty, when the author replies with a question instead of
//! SQL, or when repair produces nothing usable. Conversation state lets the
//! caller answer a clarification and resume the flow.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::agents::{InsightGenerator, SqlAuthor, SqlExecutor, TableSelector};
use crate::cache;
use crate::catalog::Catalog;
use crate::conversation::{
    conversation_key, ClarifyClassifier, ConversationState, HeuristicClassifier,
};
use crate::response::{build_response, ExecutionResult, ResponsePayload};
use crate::rules::{match_rule, SqlCandidate};
use crate::store::KvStore;
use crate::validate::{self, AllowedTableSet, SafeSql};

/// Tunables for one resolver instance.
#[derive(Clone, Copy, Debug)]
pub struct ResolverOptions {
    /// Tables requested from the selector.
    pub top_k: usize,
    /// Bound on the generate/validate/repair loop.
    pub max_iterations: u32,
    /// TTL for memoized answers.
    pub cache_ttl: Duration,
    /// TTL for conversation state.
    pub conversation_ttl: Duration,
    /// Row bound enforced on unbounded queries.
    pub max_rows: u32,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            top_k: 2,
            max_iterations: 3,
            cache_ttl: Duration::from_secs(3600),
            conversation_ttl: Duration::from_secs(3600),
            max_rows: validate::DEFAULT_MAX_ROWS,
        }
    }
}

/// An incoming question, possibly resuming a clarification.
#[derive(Clone, Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub followup: Option<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            conversation_id: None,
            followup: None,
        }
    }

    pub fn followup(
        question: impl Into<String>,
        conversation_id: impl Into<String>,
        followup: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            conversation_id: Some(conversation_id.into()),
            followup: Some(followup.into()),
        }
    }
}

/// Which stage produced an outcome, as exposed on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    RuleEngine,
    DeepAgent,
    LlmGeneration,
    Execution,
    AgentNotConfigured,
}

impl Source {
    /// Stable wire/metrics label, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::RuleEngine => "rule_engine",
            Source::DeepAgent => "deep_agent",
            Source::LlmGeneration => "llm_generation",
            Source::Execution => "execution",
            Source::AgentNotConfigured => "agent_not_configured",
        }
    }
}

/// Terminal outcome of one resolution turn.
///
/// Business failures are data, not errors: the API reports them in a 200
/// payload with a `source` tag so callers can tell "ask a human" from
/// "something broke".
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Answer {
        answer: ResponsePayload,
        sql_used: Option<String>,
        tables_used: Option<Vec<String>>,
        source: Source,
    },
    Clarify {
        conversation_id: String,
        question: String,
        options: Vec<String>,
    },
    Error {
        message: String,
        source: Option<Source>,
    },
}

/// Context for one pass through the agent path.
struct AgentTurn {
    /// The caller's question as originally asked this turn.
    original_question: String,
    /// Text handed to the table selector.
    selection_text: String,
    /// Text handed to the SQL author (history-rendered on resumed turns).
    author_text: String,
    /// Conversation id supplied by the caller, if any.
    conversation_id: Option<String>,
    /// Loaded conversation state; `Some` only on resumed turns.
    state: Option<ConversationState>,
    /// Answer-cache key; `None` on resumed turns, which are never memoized.
    cache_key: Option<String>,
}

/// The orchestrator. Collaborators are injected trait objects; the catalog
/// and options are fixed at construction.
pub struct QueryResolver {
    catalog: Arc<Catalog>,
    selector: Arc<dyn TableSelector>,
    author: Arc<dyn SqlAuthor>,
    executor: Arc<dyn SqlExecutor>,
    insight: Option<Arc<dyn InsightGenerator>>,
    store: Arc<dyn KvStore>,
    classifier: Arc<dyn ClarifyClassifier>,
    options: ResolverOptions,
}

impl QueryResolver {
    pub fn new(
        catalog: Arc<Catalog>,
        selector: Arc<dyn TableSelector>,
        author: Arc<dyn SqlAuthor>,
        executor: Arc<dyn SqlExecutor>,
        store: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            catalog,
            selector,
            author,
            executor,
            insight: None,
            store,
            classifier: Arc::new(HeuristicClassifier),
            options: ResolverOptions::default(),
        }
    }

    /// Attach a best-effort insight generator for multi-row results.
    pub fn with_insight(mut self, insight: Arc<dyn InsightGenerator>) -> Self {
        self.insight = Some(insight);
        self
    }

    /// Replace the clarification classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn ClarifyClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve one turn end to end. Never panics; every outcome is a
    /// [`Resolution`].
    pub async fn resolve(&self, request: &AskRequest) -> Resolution {
        let question = request.question.trim().to_string();
        if question.is_empty() {
            return Resolution::Error {
                message: "Question is required".to_string(),
                source: None,
            };
        }

        if let (Some(id), Some(followup)) =
            (request.conversation_id.as_deref(), request.followup.as_deref())
        {
            if !followup.trim().is_empty() {
                return self.resume(&question, id, followup.trim()).await;
            }
        }

        self.resolve_fresh(&question, request.conversation_id.as_deref())
            .await
    }

    async fn resolve_fresh(&self, question: &str, conversation_id: Option<&str>) -> Resolution {
        let key = cache::cache_key(question);
        match self.store.get(&key).await {
            Ok(Some(value)) => match serde_json::from_value::<ResponsePayload>(value) {
                Ok(payload) => {
                    tracing::debug!(%key, "answer cache hit");
                    return Resolution::Answer {
                        answer: payload,
                        sql_used: None,
                        tables_used: None,
                        source: Source::Cache,
                    };
                }
                Err(err) => {
                    tracing::warn!(%key, error = %err, "discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "cache read failed, continuing uncached");
            }
        }

        if let Some(candidate) = match_rule(question, &self.catalog) {
            return self.run_rule_path(&key, candidate).await;
        }

        let turn = AgentTurn {
            original_question: question.to_string(),
            selection_text: question.to_string(),
            author_text: question.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            state: None,
            cache_key: Some(key),
        };
        self.run_agent_path(turn).await
    }

    /// Resume a clarification: append the follow-up to stored history and
    /// re-enter generation with the accumulated context.
    ///
    /// The load-append-persist sequence is not atomic; callers are expected
    /// to serialize turns per conversation id, and racing follow-ups are
    /// last-write-wins on the stored state.
    async fn resume(&self, question: &str, id: &str, followup: &str) -> Resolution {
        let key = conversation_key(id);
        let stored = match self.store.get(&key).await {
            Ok(value) => value,
            Err(err) => {
                return Resolution::Error {
                    message: format!("Conversation lookup failed: {err}"),
                    source: Some(Source::DeepAgent),
                };
            }
        };

        let state = stored.and_then(|value| {
            serde_json::from_value::<ConversationState>(value)
                .map_err(|err| tracing::warn!(%key, error = %err, "dropping undecodable conversation state"))
                .ok()
        });

        // A cleared (finished) conversation reads back as empty and is not
        // replayable, same as an expired one.
        let mut state = match state {
            Some(state) if !state.is_empty() => state,
            _ => {
                return Resolution::Error {
                    message: "Conversation not found or expired. Please ask the question again."
                        .to_string(),
                    source: Some(Source::DeepAgent),
                };
            }
        };

        state.note_followup(followup);
        self.persist_conversation(id, &state).await;

        let turn = AgentTurn {
            original_question: question.to_string(),
            selection_text: format!("{question}\n{followup}"),
            author_text: state.rendered_history(),
            conversation_id: Some(id.to_string()),
            state: Some(state),
            cache_key: None,
        };
        self.run_agent_path(turn).await
    }

    /// Execute a rule-engine candidate. The candidate still goes through
    /// the validator; the allowlist is the full catalog since rule SQL only
    /// ever references catalog tables.
    async fn run_rule_path(&self, cache_key: &str, candidate: SqlCandidate) -> Resolution {
        let allowed = AllowedTableSet::from_schemas(self.catalog.tables());
        let safe =
            match validate::validate_with_limit(&candidate.sql, &allowed, self.options.max_rows) {
                Ok(safe) => safe,
                Err(err) => {
                    return Resolution::Error {
                        message: format!("Rule-based SQL failed validation: {err}"),
                        source: Some(Source::RuleEngine),
                    };
                }
            };

        match self.executor.execute(&safe).await {
            Ok(result) => {
                let payload = build_response(result, None);
                self.write_cache(cache_key, &payload).await;
                Resolution::Answer {
                    answer: payload,
                    sql_used: Some(safe.into_string()),
                    tables_used: None,
                    source: Source::RuleEngine,
                }
            }
            Err(err) => Resolution::Error {
                message: format!("Rule-based execution failed: {err}"),
                source: Some(Source::RuleEngine),
            },
        }
    }

    async fn run_agent_path(&self, turn: AgentTurn) -> Resolution {
        let selected = match self
            .selector
            .select(&turn.selection_text, self.options.top_k)
            .await
        {
            Ok(tables) => tables,
            Err(err) => {
                return Resolution::Error {
                    message: format!("Table selection failed: {err}"),
                    source: Some(Source::DeepAgent),
                };
            }
        };

        // Generation must never run with an empty allowlist; offer the full
        // catalog and ask the caller to choose instead.
        if selected.is_empty() {
            let names = self.catalog.table_names();
            let prompt = format!(
                "I couldn't determine which table you meant. Which of these tables should I use? {}",
                names.join(", ")
            );
            return self.clarify(&turn, prompt, names).await;
        }

        let allowed = AllowedTableSet::new(&selected);
        let schema_context = self.catalog.schema_context(&selected);

        let mut candidate: Option<SqlCandidate> = None;
        for iteration in 0..self.options.max_iterations {
            let current = match candidate.take() {
                Some(existing) => existing,
                None => {
                    let text = match self
                        .author
                        .author(&turn.author_text, &allowed, &schema_context)
                        .await
                    {
                        Ok(text) => text,
                        Err(err) => {
                            return Resolution::Error {
                                message: format!("SQL generation failed: {err}"),
                                source: Some(Source::LlmGeneration),
                            };
                        }
                    };
                    // The author answered with a question of its own, not SQL.
                    if self.classifier.is_clarification(&text) {
                        return self.clarify(&turn, text, selected.clone()).await;
                    }
                    SqlCandidate::generated(text)
                }
            };

            match validate::validate_with_limit(&current.sql, &allowed, self.options.max_rows) {
                Ok(safe) => return self.execute_and_shape(&turn, safe, &selected).await,
                Err(err) => {
                    tracing::debug!(
                        iteration,
                        provenance = ?current.provenance,
                        error = %err,
                        "candidate failed validation, attempting repair"
                    );
                    let repaired = match self
                        .author
                        .repair(&current.sql, &allowed, &schema_context)
                        .await
                    {
                        Ok(Some(sql)) if !sql.trim().is_empty() => Some(sql),
                        Ok(_) => None,
                        Err(repair_err) => {
                            tracing::warn!(error = %repair_err, "repair attempt failed");
                            None
                        }
                    };
                    match repaired {
                        Some(sql) => candidate = Some(SqlCandidate::repaired(sql)),
                        None => {
                            return self
                                .clarify(
                                    &turn,
                                    "I could not fix the SQL — can you clarify the desired columns or table?"
                                        .to_string(),
                                    selected.clone(),
                                )
                                .await;
                        }
                    }
                }
            }
        }

        Resolution::Error {
            message: "Unable to produce a valid SQL after multiple attempts.".to_string(),
            source: Some(Source::DeepAgent),
        }
    }

    async fn execute_and_shape(
        &self,
        turn: &AgentTurn,
        safe: SafeSql,
        selected: &[String],
    ) -> Resolution {
        let result = match self.executor.execute(&safe).await {
            Ok(result) => result,
            // Execution failures are terminal: retrying could mask
            // non-idempotent side effects even though only SELECTs reach
            // this point.
            Err(err) => {
                return Resolution::Error {
                    message: format!("Execution failed: {err}"),
                    source: Some(Source::Execution),
                };
            }
        };

        let insight = if result.rows.len() > 1 {
            self.try_insight(&turn.original_question, &result).await
        } else {
            None
        };
        let payload = build_response(result, insight);

        if let Some(key) = &turn.cache_key {
            self.write_cache(key, &payload).await;
        }
        if turn.state.is_some() {
            if let Some(id) = &turn.conversation_id {
                self.clear_conversation(id).await;
            }
        }

        Resolution::Answer {
            answer: payload,
            sql_used: Some(safe.into_string()),
            tables_used: Some(selected.to_vec()),
            source: Source::DeepAgent,
        }
    }

    /// Terminal clarification turn: persist state so a follow-up can
    /// resume, then surface the question. Never writes the answer cache.
    async fn clarify(
        &self,
        turn: &AgentTurn,
        question_text: String,
        options: Vec<String>,
    ) -> Resolution {
        let id = turn
            .conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut state = turn
            .state
            .clone()
            .unwrap_or_else(|| ConversationState::opened_with(&turn.original_question));
        state.note_clarification(&question_text, options.clone());
        self.persist_conversation(&id, &state).await;

        Resolution::Clarify {
            conversation_id: id,
            question: question_text,
            options,
        }
    }

    async fn try_insight(&self, question: &str, result: &ExecutionResult) -> Option<String> {
        let agent = self.insight.as_ref()?;
        match agent.insight(question, result).await {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::warn!(error = %err, "insight generation failed, continuing without");
                None
            }
        }
    }

    async fn write_cache(&self, key: &str, payload: &ResponsePayload) {
        match serde_json::to_value(payload) {
            Ok(value) => {
                if let Err(err) = self.store.set(key, value, self.options.cache_ttl).await {
                    tracing::warn!(%key, error = %err, "cache write failed");
                }
            }
            Err(err) => tracing::warn!(%key, error = %err, "cache encode failed"),
        }
    }

    async fn persist_conversation(&self, id: &str, state: &ConversationState) {
        match serde_json::to_value(state) {
            Ok(value) => {
                let key = conversation_key(id);
                if let Err(err) = self
                    .store
                    .set(&key, value, self.options.conversation_ttl)
                    .await
                {
                    tracing::warn!(%key, error = %err, "conversation persist failed");
                }
            }
            Err(err) => tracing::warn!(error = %err, "conversation encode failed"),
        }
    }

    async fn clear_conversation(&self, id: &str) {
        self.persist_conversation(id, &ConversationState::default())
            .await;
    }
}
