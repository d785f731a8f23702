//! External collaborator interfaces.
//!
//! The orchestrator drives four out-of-tree collaborators: the agent
//! configuration loader, the knowledge store, the tool invoker and the
//! completion provider. Each is an object-safe `async_trait`; every call
//! reports its value together with usage metadata so the orchestrator can
//! feed health and performance signals without knowing collaborator
//! internals. Call timeouts are applied by the orchestrator, not by
//! implementations.
//!
//! In-memory reference implementations live in
//! [`memory`](crate::collaborators::memory) and back local development and
//! the test suite.

pub mod memory;

use crate::types::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Usage metadata attached to every collaborator response.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Time the collaborator spent servicing the call, in milliseconds
    pub elapsed_ms: u64,
}

/// A collaborator result value plus its usage metadata.
#[derive(Debug, Clone)]
pub struct Measured<T> {
    /// The call's value
    pub value: T,
    /// How the call went
    pub usage: Usage,
}

impl<T> Measured<T> {
    /// Wrap a value with a measured elapsed time.
    pub fn new(value: T, elapsed: Duration) -> Self {
        Self {
            value,
            usage: Usage {
                elapsed_ms: elapsed.as_millis() as u64,
            },
        }
    }
}

/// Immutable per-agent configuration, loaded once per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt prepended to completion requests
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Tools the agent is allowed to call
    #[serde(default)]
    pub tools: Vec<String>,
    /// Per-agent step ceiling override
    #[serde(default)]
    pub max_steps: Option<u32>,
    /// Free-form extras the step function may read
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            tools: Vec::new(),
            max_steps: None,
            extra: HashMap::new(),
        }
    }
}

/// Loads immutable agent configuration by agent name.
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// Fetch the configuration for `agent_name`, or `NotFound`.
    async fn load(&self, agent_name: &str) -> Result<AgentConfig>;
}

/// One entity in the knowledge store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntity {
    /// Store-assigned identifier (empty on first write)
    #[serde(default)]
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Opaque attribute payload
    pub attributes: serde_json::Value,
}

/// A directed, labeled edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRelation {
    /// Source entity id
    pub from: String,
    /// Relation label
    pub relation: String,
    /// Target entity id
    pub to: String,
}

/// One ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeHit {
    /// The matching entity
    pub entity: KnowledgeEntity,
    /// Relevance, higher is better
    pub score: f64,
}

/// A connected slice of the knowledge graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    /// Entities reached by the traversal
    pub entities: Vec<KnowledgeEntity>,
    /// Edges walked
    pub relations: Vec<KnowledgeRelation>,
}

/// Knowledge store consumed by the orchestrator.
///
/// Search and traverse are read-only and may be retried once on timeout;
/// write mutates external state and is never retried.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Ranked search over stored entities.
    async fn search(&self, query: &str, limit: usize) -> Result<Measured<Vec<KnowledgeHit>>>;

    /// Store an entity, returning its id.
    async fn write(&self, entity: KnowledgeEntity) -> Result<Measured<String>>;

    /// Walk relations from an entity up to `depth` hops.
    async fn traverse(
        &self,
        entity_id: &str,
        relation: &str,
        depth: usize,
    ) -> Result<Measured<Subgraph>>;
}

/// Tool invocation surface consumed by the orchestrator.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Execute a named tool with JSON parameters.
    async fn invoke(&self, tool: &str, params: serde_json::Value) -> Result<Measured<serde_json::Value>>;

    /// Whether a tool declares itself safe to retry.
    fn is_idempotent(&self, tool: &str) -> bool;
}

/// Prompt material handed to a completion provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptContext {
    /// Optional system prompt
    #[serde(default)]
    pub system: Option<String>,
    /// The user-visible prompt
    pub prompt: String,
}

/// Language-model completion surface consumed by the orchestrator.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce a completion for the given context.
    async fn complete(&self, context: &PromptContext) -> Result<Measured<String>>;
}
