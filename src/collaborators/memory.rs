//! In-memory reference collaborators.
//!
//! These back local development and the test suite: a knowledge store with
//! token-overlap ranking and a relation graph, a tool registry, a scripted
//! completion provider, and a static configuration loader. None of them
//! performs I/O, so their usage figures are honest but tiny.

use crate::collaborators::{
    AgentConfig, CompletionProvider, ConfigLoader, KnowledgeEntity, KnowledgeHit,
    KnowledgeRelation, KnowledgeStore, Measured, PromptContext, Subgraph, ToolInvoker,
};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

// ============= Configuration Loader =============

/// Configuration loader over a fixed in-process map.
#[derive(Default)]
pub struct StaticConfigLoader {
    agents: RwLock<HashMap<String, AgentConfig>>,
}

impl StaticConfigLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the loader from named agent configurations.
    pub fn from_agents(agents: HashMap<String, AgentConfig>) -> Self {
        Self {
            agents: RwLock::new(agents),
        }
    }

    /// Add or replace one agent configuration.
    pub fn insert(&self, name: &str, config: AgentConfig) {
        self.agents.write().insert(name.to_string(), config);
    }
}

#[async_trait]
impl ConfigLoader for StaticConfigLoader {
    async fn load(&self, agent_name: &str) -> Result<AgentConfig> {
        self.agents
            .read()
            .get(agent_name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("agent '{agent_name}'")))
    }
}

// ============= Knowledge Store =============

/// Embedded knowledge store with naive token-overlap ranking.
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    entities: RwLock<HashMap<String, KnowledgeEntity>>,
    relations: RwLock<Vec<KnowledgeRelation>>,
}

impl InMemoryKnowledgeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a relation between two stored entities.
    pub fn relate(&self, from: &str, relation: &str, to: &str) {
        self.relations.write().push(KnowledgeRelation {
            from: from.to_string(),
            relation: relation.to_string(),
            to: to.to_string(),
        });
    }

    fn tokens(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    fn score(entity: &KnowledgeEntity, query_tokens: &HashSet<String>) -> f64 {
        if query_tokens.is_empty() {
            return 0.0;
        }
        let haystack = format!("{} {}", entity.name, entity.attributes);
        let entity_tokens = Self::tokens(&haystack);
        let overlap = query_tokens.intersection(&entity_tokens).count();
        overlap as f64 / query_tokens.len() as f64
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn search(&self, query: &str, limit: usize) -> Result<Measured<Vec<KnowledgeHit>>> {
        let started = Instant::now();
        let query_tokens = Self::tokens(query);

        let mut hits: Vec<KnowledgeHit> = self
            .entities
            .read()
            .values()
            .filter_map(|entity| {
                let score = Self::score(entity, &query_tokens);
                (score > 0.0).then(|| KnowledgeHit {
                    entity: entity.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);

        Ok(Measured::new(hits, started.elapsed()))
    }

    async fn write(&self, mut entity: KnowledgeEntity) -> Result<Measured<String>> {
        let started = Instant::now();
        if entity.name.is_empty() {
            return Err(AppError::InvalidInput(
                "knowledge entity needs a name".to_string(),
            ));
        }
        if entity.id.is_empty() {
            entity.id = uuid::Uuid::new_v4().to_string();
        }
        let id = entity.id.clone();
        self.entities.write().insert(id.clone(), entity);
        Ok(Measured::new(id, started.elapsed()))
    }

    async fn traverse(
        &self,
        entity_id: &str,
        relation: &str,
        depth: usize,
    ) -> Result<Measured<Subgraph>> {
        let started = Instant::now();
        let entities = self.entities.read();
        if !entities.contains_key(entity_id) {
            return Err(AppError::NotFound(format!("entity '{entity_id}'")));
        }

        let relations = self.relations.read();
        let mut subgraph = Subgraph::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = vec![entity_id.to_string()];
        visited.insert(entity_id.to_string());

        for _ in 0..depth {
            let mut next = Vec::new();
            for source in &frontier {
                for edge in relations
                    .iter()
                    .filter(|e| e.from == *source && e.relation == relation)
                {
                    subgraph.relations.push(edge.clone());
                    if visited.insert(edge.to.clone()) {
                        next.push(edge.to.clone());
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        subgraph.entities = visited
            .iter()
            .filter_map(|id| entities.get(id).cloned())
            .collect();

        Ok(Measured::new(subgraph, started.elapsed()))
    }
}

// ============= Tools =============

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used for invocation.
    fn name(&self) -> &str;
    /// One-line description.
    fn description(&self) -> &str;
    /// Whether repeating a call with the same parameters is safe.
    fn idempotent(&self) -> bool {
        false
    }
    /// Run the tool.
    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value>;
}

/// Registry of tools, itself the in-process [`ToolInvoker`].
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in tools.
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(ClockTool));
        registry
    }

    /// Add a tool under its own name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Names of all registered tools.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    async fn invoke(
        &self,
        tool: &str,
        params: serde_json::Value,
    ) -> Result<Measured<serde_json::Value>> {
        let started = Instant::now();
        let tool = self
            .tools
            .get(tool)
            .ok_or_else(|| AppError::NotFound(format!("tool '{tool}'")))?;
        let value = tool.execute(params).await?;
        Ok(Measured::new(value, started.elapsed()))
    }

    fn is_idempotent(&self, tool: &str) -> bool {
        self.tools.get(tool).is_some_and(|t| t.idempotent())
    }
}

/// Returns its parameters unchanged.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given parameters unchanged"
    }

    fn idempotent(&self) -> bool {
        true
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        Ok(params)
    }
}

/// Reports the current UTC time.
pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Return the current UTC time as RFC 3339"
    }

    fn idempotent(&self) -> bool {
        true
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "now": chrono::Utc::now().to_rfc3339() }))
    }
}

// ============= Completion Provider =============

/// Completion provider serving scripted responses, then a fixed default.
pub struct ScriptedCompletionProvider {
    responses: Mutex<VecDeque<String>>,
    default_response: String,
}

impl ScriptedCompletionProvider {
    /// Create a provider that always answers with `default_response`.
    pub fn new(default_response: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: default_response.to_string(),
        }
    }

    /// Queue one scripted response, served before the default.
    pub fn push_response(&self, response: &str) {
        self.responses.lock().push_back(response.to_string());
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletionProvider {
    async fn complete(&self, _context: &PromptContext) -> Result<Measured<String>> {
        let started = Instant::now();
        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());
        Ok(Measured::new(response, started.elapsed()))
    }
}

/// Completion provider that answers with the prompt itself.
///
/// The default wiring for local development, where no model is attached.
pub struct EchoCompletionProvider;

#[async_trait]
impl CompletionProvider for EchoCompletionProvider {
    async fn complete(&self, context: &PromptContext) -> Result<Measured<String>> {
        let started = Instant::now();
        Ok(Measured::new(context.prompt.clone(), started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, text: &str) -> KnowledgeEntity {
        KnowledgeEntity {
            id: String::new(),
            name: name.to_string(),
            attributes: serde_json::json!({ "text": text }),
        }
    }

    #[tokio::test]
    async fn test_search_ranks_by_overlap() {
        let store = InMemoryKnowledgeStore::new();
        store
            .write(entity("rust", "systems programming language"))
            .await
            .unwrap();
        store
            .write(entity("garden", "growing tomatoes outside"))
            .await
            .unwrap();

        let hits = store
            .search("systems programming", 10)
            .await
            .unwrap()
            .value;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity.name, "rust");
        assert!(hits[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_write_assigns_id() {
        let store = InMemoryKnowledgeStore::new();
        let id = store.write(entity("thing", "stuff")).await.unwrap().value;
        assert!(!id.is_empty());

        let err = store
            .write(KnowledgeEntity {
                id: String::new(),
                name: String::new(),
                attributes: serde_json::Value::Null,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_traverse_walks_relation_depth() {
        let store = InMemoryKnowledgeStore::new();
        for name in ["a", "b", "c", "d"] {
            store
                .write(KnowledgeEntity {
                    id: name.to_string(),
                    name: name.to_string(),
                    attributes: serde_json::Value::Null,
                })
                .await
                .unwrap();
        }
        store.relate("a", "knows", "b");
        store.relate("b", "knows", "c");
        store.relate("c", "knows", "d");
        store.relate("a", "owns", "d");

        let subgraph = store.traverse("a", "knows", 2).await.unwrap().value;
        assert_eq!(subgraph.relations.len(), 2);
        assert_eq!(subgraph.entities.len(), 3); // a, b, c

        let err = store.traverse("ghost", "knows", 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_tool_registry_invokes_and_reports_idempotence() {
        let registry = ToolRegistry::with_default_tools();

        let result = registry
            .invoke("echo", serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(result.value, serde_json::json!({"x": 1}));
        assert!(registry.is_idempotent("echo"));
        assert!(!registry.is_idempotent("missing"));

        let err = registry
            .invoke("missing", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_scripted_completions_then_default() {
        let provider = ScriptedCompletionProvider::new("fallback");
        provider.push_response("first");

        let context = PromptContext {
            system: None,
            prompt: "hello".to_string(),
        };
        assert_eq!(provider.complete(&context).await.unwrap().value, "first");
        assert_eq!(provider.complete(&context).await.unwrap().value, "fallback");
    }

    #[tokio::test]
    async fn test_static_config_loader() {
        let loader = StaticConfigLoader::new();
        loader.insert("writer", AgentConfig::default());

        assert!(loader.load("writer").await.is_ok());
        assert!(matches!(
            loader.load("ghost").await,
            Err(AppError::NotFound(_))
        ));
    }
}
