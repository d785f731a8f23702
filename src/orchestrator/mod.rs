//! Continuation-driven execution.
//!
//! The orchestrator is the imperative shell around pure agent logic. For
//! each request it loads the agent's configuration, then loops: call the
//! step function, and either finish (`Complete`) or dispatch the requested
//! external operation, fold the outcome back into a new state, and step
//! again. Suspension only ever happens at the one collaborator `await`
//! inside the loop, so a request reads as a straight line.
//!
//! The loop is the only impure component: it owns timeouts, the single
//! read-retry policy, error translation, and cycle protection (a hard step
//! ceiling plus a wall-clock budget, since collaborator timeouts alone cannot
//! bound total work).

pub mod state;

pub use state::{
    AgentAction, ExecutionPhase, ExecutionState, OperationKind, OperationOutcome,
    PendingOperation, TraceEntry,
};

use crate::collaborators::{
    AgentConfig, CompletionProvider, ConfigLoader, KnowledgeStore, Measured, PromptContext,
    ToolInvoker,
};
use crate::conversation::ConversationManager;
use crate::health::HealthMonitor;
use crate::routing::{Router, RoutingStrategy};
use crate::types::{
    AppError, Message, Performative, Result, SubmitMessageRequest, SubmitMessageResponse,
};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use utoipa::ToSchema;

/// Pure agent step logic.
///
/// Implementations must be deterministic and free of I/O: the same config
/// and state always yield the same action. Anything external (knowledge,
/// tools, model completions) is obtained by returning the matching request
/// action and reading the outcome from `accumulated_results` on the next
/// step.
pub trait AgentBehavior: Send + Sync {
    /// Decide the next action for this state.
    fn step(&self, config: &AgentConfig, state: &ExecutionState) -> AgentAction;
}

/// Orchestrator limits and policy.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard ceiling on steps per request
    pub max_steps: u32,
    /// Wall-clock budget per request
    pub wall_clock_budget: Duration,
    /// Timeout applied to each collaborator call
    pub call_timeout: Duration,
    /// Whether read-only calls are retried once on timeout
    pub retry_reads_once: bool,
    /// Strategy used when handling inbound messages
    pub default_strategy: RoutingStrategy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: 32,
            wall_clock_budget: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
            retry_reads_once: true,
            default_strategy: RoutingStrategy::Priority,
        }
    }
}

/// Result of a successfully completed execution.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecutionReport {
    /// The agent that ran
    pub agent_id: String,
    /// The step function's final result
    pub result: serde_json::Value,
    /// Steps taken, including the completing one
    pub steps: u32,
    /// Per-step timing trace
    pub trace: Vec<TraceEntry>,
    /// End-to-end execution time in milliseconds
    pub elapsed_ms: u64,
}

/// The continuation-loop driver.
pub struct Orchestrator {
    router: Arc<Router>,
    conversations: Arc<ConversationManager>,
    health: Arc<HealthMonitor>,
    config_loader: Arc<dyn ConfigLoader>,
    knowledge: Arc<dyn KnowledgeStore>,
    tools: Arc<dyn ToolInvoker>,
    completions: Arc<dyn CompletionProvider>,
    behaviors: RwLock<HashMap<String, Arc<dyn AgentBehavior>>>,
    default_behavior: Arc<dyn AgentBehavior>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Wire up an orchestrator over its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<Router>,
        conversations: Arc<ConversationManager>,
        health: Arc<HealthMonitor>,
        config_loader: Arc<dyn ConfigLoader>,
        knowledge: Arc<dyn KnowledgeStore>,
        tools: Arc<dyn ToolInvoker>,
        completions: Arc<dyn CompletionProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            router,
            conversations,
            health,
            config_loader,
            knowledge,
            tools,
            completions,
            behaviors: RwLock::new(HashMap::new()),
            default_behavior: Arc::new(CompletionAgent),
            config,
        }
    }

    /// Register the step logic for an agent. Replaces any previous behavior
    /// under the same name; agents without one get [`CompletionAgent`].
    pub fn register_behavior(&self, agent_id: &str, behavior: Arc<dyn AgentBehavior>) {
        self.behaviors
            .write()
            .insert(agent_id.to_string(), behavior);
    }

    fn behavior_for(&self, agent_id: &str) -> Arc<dyn AgentBehavior> {
        self.behaviors
            .read()
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_behavior))
    }

    /// Drive one request to completion or failure.
    ///
    /// Failures are terminal for this request only; the error kind says
    /// what went wrong (`ConfigLoad`, `ExternalCallTimeout`,
    /// `ExternalCallFailed`, `MaxStepsExceeded`, ...).
    pub async fn execute(
        &self,
        agent_id: &str,
        request: serde_json::Value,
    ) -> Result<ExecutionReport> {
        let started = Instant::now();

        let config = self
            .config_loader
            .load(agent_id)
            .await
            .map_err(|e| AppError::ConfigLoad(e.to_string()))?;
        let behavior = self.behavior_for(agent_id);
        let max_steps = config.max_steps.unwrap_or(self.config.max_steps);

        let mut state = ExecutionState::new(agent_id, request);
        state.phase = ExecutionPhase::Running;
        let mut steps: u32 = 0;
        let mut trace: Vec<TraceEntry> = Vec::new();

        loop {
            // Cycle protection. The driver's own counter is authoritative;
            // a step function replaying the same continuation cannot reset it.
            if steps >= max_steps {
                warn!(agent = %agent_id, steps, "step ceiling reached");
                return Err(AppError::MaxStepsExceeded(format!(
                    "step ceiling of {max_steps} reached"
                )));
            }
            if started.elapsed() > self.config.wall_clock_budget {
                warn!(agent = %agent_id, steps, "wall-clock budget exhausted");
                return Err(AppError::MaxStepsExceeded(format!(
                    "wall-clock budget of {:?} exhausted after {steps} steps",
                    self.config.wall_clock_budget
                )));
            }

            let step_started = Instant::now();
            let action = behavior.step(&config, &state);
            steps += 1;

            let (pending, mut continuation) = match action {
                AgentAction::Complete(result) => {
                    trace.push(TraceEntry {
                        step: steps,
                        label: "complete".to_string(),
                        timestamp: Utc::now().timestamp(),
                        duration_ms: step_started.elapsed().as_millis() as u64,
                    });
                    debug!(agent = %agent_id, steps, "execution completed");
                    return Ok(ExecutionReport {
                        agent_id: agent_id.to_string(),
                        result,
                        steps,
                        trace,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
                other => other.into_parts().expect("non-complete action has parts"),
            };

            let label = pending.label();
            continuation.phase = ExecutionPhase::AwaitingExternal;
            continuation.pending_operation = Some(pending.clone());

            let outcome = self.dispatch(&pending).await;
            let duration_ms = step_started.elapsed().as_millis() as u64;
            trace.push(TraceEntry {
                step: steps,
                label,
                timestamp: Utc::now().timestamp(),
                duration_ms,
            });

            let outcome = outcome?;

            continuation.accumulated_results.push(outcome);
            continuation.pending_operation = None;
            continuation.phase = ExecutionPhase::Running;
            continuation.steps_taken = steps;
            state = continuation;
        }
    }

    /// Dispatch one external operation with a bounded timeout.
    ///
    /// Read-only operations (search, traverse, completion) may retry once on
    /// timeout; writes never retry, and tool calls only when the tool
    /// declares idempotence.
    async fn dispatch(&self, pending: &PendingOperation) -> Result<OperationOutcome> {
        match pending {
            PendingOperation::KnowledgeSearch { query, limit } => {
                let measured = self
                    .call_bounded(true, || self.knowledge.search(query, *limit))
                    .await?;
                Self::outcome(OperationKind::KnowledgeSearch, &measured.value, measured.usage.elapsed_ms)
            }
            PendingOperation::KnowledgeWrite { entity } => {
                let measured = self
                    .call_bounded(false, || self.knowledge.write(entity.clone()))
                    .await?;
                Self::outcome(OperationKind::KnowledgeWrite, &measured.value, measured.usage.elapsed_ms)
            }
            PendingOperation::ToolCall { tool, params } => {
                let retryable = self.tools.is_idempotent(tool);
                let measured = self
                    .call_bounded(retryable, || self.tools.invoke(tool, params.clone()))
                    .await?;
                Self::outcome(OperationKind::ToolCall, &measured.value, measured.usage.elapsed_ms)
            }
            PendingOperation::Completion { context } => {
                let measured = self
                    .call_bounded(true, || self.completions.complete(context))
                    .await?;
                Self::outcome(OperationKind::Completion, &measured.value, measured.usage.elapsed_ms)
            }
        }
    }

    fn outcome<T: Serialize>(kind: OperationKind, value: &T, elapsed_ms: u64) -> Result<OperationOutcome> {
        Ok(OperationOutcome {
            kind,
            value: serde_json::to_value(value)
                .map_err(|e| AppError::StateSerialization(e.to_string()))?,
            elapsed_ms,
        })
    }

    /// Run one collaborator call under the per-call timeout, retrying once
    /// on timeout when the operation is declared retryable.
    async fn call_bounded<T, Fut>(
        &self,
        retryable: bool,
        make_call: impl Fn() -> Fut,
    ) -> Result<Measured<T>>
    where
        Fut: Future<Output = Result<Measured<T>>>,
    {
        match tokio::time::timeout(self.config.call_timeout, make_call()).await {
            Ok(Ok(measured)) => Ok(measured),
            Ok(Err(e)) => Err(AppError::ExternalCallFailed(e.to_string())),
            Err(_) if retryable && self.config.retry_reads_once => {
                debug!("external call timed out, retrying once");
                match tokio::time::timeout(self.config.call_timeout, make_call()).await {
                    Ok(Ok(measured)) => Ok(measured),
                    Ok(Err(e)) => Err(AppError::ExternalCallFailed(e.to_string())),
                    Err(_) => Err(AppError::ExternalCallTimeout(self.config.call_timeout)),
                }
            }
            Err(_) => Err(AppError::ExternalCallTimeout(self.config.call_timeout)),
        }
    }

    /// Handle one inbound message end to end.
    ///
    /// Attaches the message to its conversation, resolves the target
    /// capability, executes the selected agent, and records the reply:
    /// an `inform` on success, a `failure` before the error propagates.
    pub async fn handle_message(
        &self,
        request: SubmitMessageRequest,
    ) -> Result<SubmitMessageResponse> {
        let started = Instant::now();

        let conversation = self.conversations.open(request.conversation_id.as_deref())?;
        let conversation_id = conversation.conversation_id;

        let mut inbound = Message::new(
            request.performative,
            &request.sender,
            &request.capability,
            &conversation_id,
            request.content,
        );
        inbound.in_reply_to = request.in_reply_to;
        inbound.validate()?;
        self.conversations.append(&conversation_id, inbound.clone())?;

        let selection = self.router.resolve(
            &request.capability,
            self.config.default_strategy,
            &HashMap::new(),
        )?;
        let provider_id = selection.registration.provider_id.clone();

        self.health.call_started(&provider_id);
        let outcome = self.execute(&provider_id, inbound.content.clone()).await;
        self.health
            .call_finished(&provider_id, started.elapsed(), outcome.is_ok());

        match outcome {
            Ok(report) => {
                let reply = inbound.reply(Performative::Inform, &provider_id, report.result);
                self.conversations.append(&conversation_id, reply.clone())?;
                Ok(SubmitMessageResponse {
                    reply,
                    provider_id,
                    steps: report.steps as usize,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                })
            }
            Err(e) => {
                let reply = inbound.reply(
                    Performative::Failure,
                    &provider_id,
                    serde_json::json!({ "error": e.to_string() }),
                );
                if let Err(record_err) = self.conversations.append(&conversation_id, reply) {
                    warn!(error = %record_err, "failed to record failure reply");
                }
                Err(e)
            }
        }
    }
}

// ============= Built-in behaviors =============

/// Default behavior: one completion, then done.
///
/// Step one requests a completion for the request's `text` field (or the
/// whole payload rendered as a string); step two completes with the model's
/// answer.
pub struct CompletionAgent;

impl CompletionAgent {
    fn prompt_of(request: &serde_json::Value) -> String {
        request
            .get("text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| request.to_string())
    }
}

impl AgentBehavior for CompletionAgent {
    fn step(&self, config: &AgentConfig, state: &ExecutionState) -> AgentAction {
        if let Some(outcome) = state.outcomes_of(OperationKind::Completion).next_back() {
            return AgentAction::Complete(outcome.value.clone());
        }
        AgentAction::RequestCompletion {
            context: PromptContext {
                system: config.system_prompt.clone(),
                prompt: Self::prompt_of(&state.original_request),
            },
            continuation: state.clone(),
        }
    }
}

/// Behavior that grounds a completion in knowledge-store hits.
///
/// Searches first, folds the hits into the prompt, then completes.
pub struct RetrievalAgent {
    /// Maximum hits folded into the prompt
    pub search_limit: usize,
}

impl Default for RetrievalAgent {
    fn default() -> Self {
        Self { search_limit: 5 }
    }
}

impl AgentBehavior for RetrievalAgent {
    fn step(&self, config: &AgentConfig, state: &ExecutionState) -> AgentAction {
        if let Some(outcome) = state.outcomes_of(OperationKind::Completion).next_back() {
            return AgentAction::Complete(outcome.value.clone());
        }

        let prompt = CompletionAgent::prompt_of(&state.original_request);
        match state.outcomes_of(OperationKind::KnowledgeSearch).next_back() {
            Some(search) => AgentAction::RequestCompletion {
                context: PromptContext {
                    system: config.system_prompt.clone(),
                    prompt: format!("Context: {}\n\n{}", search.value, prompt),
                },
                continuation: state.clone(),
            },
            None => AgentAction::RequestKnowledgeSearch {
                query: prompt,
                limit: self.search_limit,
                continuation: state.clone(),
            },
        }
    }
}
