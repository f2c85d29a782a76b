//! Sibyl core: the query-resolution pipeline and its safety layer.
//!
//! This crate holds everything with real invariants: the table catalog, the
//! SQL safety validator, the rule-based matcher, response shaping, the
//! TTL key/value store abstraction, conversation state, and the orchestrator
//! that sequences them. External collaborators (table selection, SQL
//! authoring, execution, insight generation) are trait seams implemented
//! elsewhere; nothing in this crate performs network or database I/O.

pub mod agents;
pub mod cache;
pub mod catalog;
pub mod conversation;
pub mod resolver;
pub mod response;
pub mod rules;
pub mod store;
pub mod validate;

pub use agents::{AgentError, InsightGenerator, SqlAuthor, SqlExecutor, TableSelector};
pub use catalog::{Catalog, CatalogError, TableSchema};
pub use conversation::{ClarifyClassifier, ConversationState, HeuristicClassifier};
pub use resolver::{AskRequest, QueryResolver, Resolution, ResolverOptions, Source};
pub use response::{ExecutionResult, ResponsePayload, Scalar};
pub use store::{KvStore, MemoryStore, StoreError};
pub use validate::{AllowedTableSet, SafeSql, ValidationError};
