//! Execution state and agent actions.
//!
//! Agent logic is a pure state-transition function: given the agent's
//! immutable configuration and an [`ExecutionState`], it returns one
//! [`AgentAction`]. All I/O stays in the driver loop. The state is fully
//! serializable, with no live handles, so a process boundary can separate any
//! two steps.

use crate::collaborators::{KnowledgeEntity, PromptContext};
use crate::types::{AppError, Result};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where a request is in its execution lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// Configuration loaded, no step taken yet
    Loaded,
    /// Between steps, ready to advance
    Running,
    /// Suspended on an external operation
    AwaitingExternal,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
}

/// The external operation kinds a step can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Ranked knowledge-store search
    KnowledgeSearch,
    /// Knowledge-store write
    KnowledgeWrite,
    /// Tool invocation
    ToolCall,
    /// Language-model completion
    Completion,
}

/// A requested external operation, minus its continuation.
///
/// Recorded on the state while the driver is dispatching, so a serialized
/// state says exactly what it is waiting for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingOperation {
    /// Ranked search
    KnowledgeSearch {
        /// Query text
        query: String,
        /// Maximum hits
        limit: usize,
    },
    /// Entity write
    KnowledgeWrite {
        /// Entity to store
        entity: KnowledgeEntity,
    },
    /// Tool invocation
    ToolCall {
        /// Tool name
        tool: String,
        /// JSON parameters
        params: serde_json::Value,
    },
    /// Model completion
    Completion {
        /// Prompt material
        context: PromptContext,
    },
}

impl PendingOperation {
    /// The operation kind this request maps to.
    pub fn kind(&self) -> OperationKind {
        match self {
            PendingOperation::KnowledgeSearch { .. } => OperationKind::KnowledgeSearch,
            PendingOperation::KnowledgeWrite { .. } => OperationKind::KnowledgeWrite,
            PendingOperation::ToolCall { .. } => OperationKind::ToolCall,
            PendingOperation::Completion { .. } => OperationKind::Completion,
        }
    }

    /// Short label for traces and logs, e.g. `tool:echo`.
    pub fn label(&self) -> String {
        match self {
            PendingOperation::KnowledgeSearch { .. } => "knowledge_search".to_string(),
            PendingOperation::KnowledgeWrite { .. } => "knowledge_write".to_string(),
            PendingOperation::ToolCall { tool, .. } => format!("tool:{tool}"),
            PendingOperation::Completion { .. } => "completion".to_string(),
        }
    }
}

/// The outcome of one completed external operation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OperationOutcome {
    /// What kind of operation ran
    pub kind: OperationKind,
    /// Its JSON-encoded result
    pub value: serde_json::Value,
    /// How long the collaborator took, in milliseconds
    pub elapsed_ms: u64,
}

/// Serializable continuation state for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// The agent executing the request
    pub agent_id: String,
    /// The inbound request payload, verbatim
    pub original_request: serde_json::Value,
    /// Lifecycle phase marker
    pub phase: ExecutionPhase,
    /// Outcomes of prior external operations, oldest first
    pub accumulated_results: Vec<OperationOutcome>,
    /// The operation the state is suspended on, if any
    pub pending_operation: Option<PendingOperation>,
    /// Steps taken so far (driver-owned; see the orchestrator loop)
    pub steps_taken: u32,
}

impl ExecutionState {
    /// Fresh state for a request that has just been accepted.
    pub fn new(agent_id: &str, original_request: serde_json::Value) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            original_request,
            phase: ExecutionPhase::Loaded,
            accumulated_results: Vec::new(),
            pending_operation: None,
            steps_taken: 0,
        }
    }

    /// Outcomes of a given kind, oldest first.
    pub fn outcomes_of(
        &self,
        kind: OperationKind,
    ) -> impl DoubleEndedIterator<Item = &OperationOutcome> {
        self.accumulated_results
            .iter()
            .filter(move |o| o.kind == kind)
    }

    /// The most recent outcome, if any.
    pub fn last_outcome(&self) -> Option<&OperationOutcome> {
        self.accumulated_results.last()
    }

    /// Serialize for crossing a process boundary.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AppError::StateSerialization(e.to_string()))
    }

    /// Restore a state serialized with [`ExecutionState::to_json`].
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| AppError::StateSerialization(e.to_string()))
    }
}

/// What a step decides to do next.
///
/// Exactly one variant per step. Every non-`Complete` variant carries the
/// continuation state the driver resumes from once the operation finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentAction {
    /// Finish the request with this result
    Complete(serde_json::Value),
    /// Suspend on a ranked knowledge search
    RequestKnowledgeSearch {
        /// Query text
        query: String,
        /// Maximum hits
        limit: usize,
        /// State to resume from
        continuation: ExecutionState,
    },
    /// Suspend on a knowledge write
    RequestKnowledgeWrite {
        /// Entity to store
        entity: KnowledgeEntity,
        /// State to resume from
        continuation: ExecutionState,
    },
    /// Suspend on a tool invocation
    RequestToolCall {
        /// Tool name
        tool: String,
        /// JSON parameters
        params: serde_json::Value,
        /// State to resume from
        continuation: ExecutionState,
    },
    /// Suspend on a model completion
    RequestCompletion {
        /// Prompt material
        context: PromptContext,
        /// State to resume from
        continuation: ExecutionState,
    },
}

impl AgentAction {
    /// Split a non-complete action into its operation and continuation.
    pub(crate) fn into_parts(self) -> Option<(PendingOperation, ExecutionState)> {
        match self {
            AgentAction::Complete(_) => None,
            AgentAction::RequestKnowledgeSearch {
                query,
                limit,
                continuation,
            } => Some((PendingOperation::KnowledgeSearch { query, limit }, continuation)),
            AgentAction::RequestKnowledgeWrite {
                entity,
                continuation,
            } => Some((PendingOperation::KnowledgeWrite { entity }, continuation)),
            AgentAction::RequestToolCall {
                tool,
                params,
                continuation,
            } => Some((PendingOperation::ToolCall { tool, params }, continuation)),
            AgentAction::RequestCompletion {
                context,
                continuation,
            } => Some((PendingOperation::Completion { context }, continuation)),
        }
    }
}

/// One row of an execution trace.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TraceEntry {
    /// Step number, starting at 1
    pub step: u32,
    /// What the step did, e.g. `completion` or `tool:echo`
    pub label: String,
    /// Unix timestamp when the step ran
    pub timestamp: i64,
    /// Step duration in milliseconds
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = ExecutionState::new("writer", serde_json::json!({"text": "hi"}));
        state.accumulated_results.push(OperationOutcome {
            kind: OperationKind::Completion,
            value: serde_json::json!("hello"),
            elapsed_ms: 12,
        });
        state.pending_operation = Some(PendingOperation::ToolCall {
            tool: "echo".to_string(),
            params: serde_json::json!({"x": 1}),
        });
        state.phase = ExecutionPhase::AwaitingExternal;

        let raw = state.to_json().unwrap();
        let restored = ExecutionState::from_json(&raw).unwrap();

        assert_eq!(restored.agent_id, "writer");
        assert_eq!(restored.phase, ExecutionPhase::AwaitingExternal);
        assert_eq!(restored.accumulated_results.len(), 1);
        assert!(matches!(
            restored.pending_operation,
            Some(PendingOperation::ToolCall { .. })
        ));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = ExecutionState::from_json("{not json").unwrap_err();
        assert!(matches!(err, AppError::StateSerialization(_)));
    }

    #[test]
    fn test_action_split() {
        let state = ExecutionState::new("a", serde_json::Value::Null);
        let action = AgentAction::RequestCompletion {
            context: PromptContext {
                system: None,
                prompt: "hi".to_string(),
            },
            continuation: state,
        };
        let (pending, continuation) = action.into_parts().unwrap();
        assert_eq!(pending.kind(), OperationKind::Completion);
        assert_eq!(continuation.agent_id, "a");

        assert!(AgentAction::Complete(serde_json::Value::Null)
            .into_parts()
            .is_none());
    }

    #[test]
    fn test_outcome_filters() {
        let mut state = ExecutionState::new("a", serde_json::Value::Null);
        for kind in [
            OperationKind::KnowledgeSearch,
            OperationKind::Completion,
            OperationKind::Completion,
        ] {
            state.accumulated_results.push(OperationOutcome {
                kind,
                value: serde_json::Value::Null,
                elapsed_ms: 0,
            });
        }
        assert_eq!(state.outcomes_of(OperationKind::Completion).count(), 2);
        assert_eq!(
            state.last_outcome().unwrap().kind,
            OperationKind::Completion
        );
    }
}
