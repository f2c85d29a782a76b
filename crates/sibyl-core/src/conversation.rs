//! Conversation state for multi-turn clarification.
//!
//! A clarification turn creates an entry under `conv:<id>`; each follow-up
//! appends to its history and bumps the turn counter; a final answer resets
//! the entry to empty so a stale id cannot replay a finished turn. Lifetime
//! is bounded by the store TTL, so abandoned clarifications expire silently.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One history entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Per-conversation bookkeeping. `turns` only increments; `history` is
/// append-only until the entry is cleared.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub history: Vec<Turn>,
    pub turns: u32,
    pub last_clarify: Option<String>,
    pub options: Vec<String>,
}

impl ConversationState {
    /// Start a conversation from the user's original question.
    pub fn opened_with(question: &str) -> Self {
        let mut state = Self::default();
        state.history.push(Turn {
            role: Role::User,
            content: question.to_string(),
        });
        state
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty() && self.turns == 0
    }

    /// Record a clarification question asked by the assistant.
    pub fn note_clarification(&mut self, question: &str, options: Vec<String>) {
        self.history.push(Turn {
            role: Role::Assistant,
            content: question.to_string(),
        });
        self.turns += 1;
        self.last_clarify = Some(question.to_string());
        self.options = options;
    }

    /// Record the caller's follow-up answer.
    pub fn note_followup(&mut self, followup: &str) {
        self.history.push(Turn {
            role: Role::User,
            content: followup.to_string(),
        });
        self.turns += 1;
    }

    /// Render the accumulated history for an authoring prompt.
    pub fn rendered_history(&self) -> String {
        self.history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                format!("{role}: {}", turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Store key for a conversation id.
pub fn conversation_key(id: &str) -> String {
    format!("conv:{id}")
}

/// Decides whether a collaborator's reply is itself a clarifying question.
///
/// Pluggable so the textual heuristic can be replaced by a structured
/// requires-input signal from the authoring collaborator without touching
/// the orchestrator's state machine.
pub trait ClarifyClassifier: Send + Sync {
    fn is_clarification(&self, text: &str) -> bool;
}

const CLARIFY_PHRASES: [&str; 9] = [
    "please specify",
    "could you",
    "which",
    "do you mean",
    "clarify",
    "which metric",
    "do you want",
    "would you like",
    "which of the following",
];

/// Default heuristic: a question mark, or any of a fixed phrase list.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicClassifier;

impl ClarifyClassifier for HeuristicClassifier {
    fn is_clarification(&self, text: &str) -> bool {
        if text.contains('?') {
            return true;
        }
        let lowered = text.to_lowercase();
        CLARIFY_PHRASES.iter().any(|phrase| lowered.contains(phrase))
    }
}
