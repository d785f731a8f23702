//! # Switchyard
//!
//! A capability-routed multi-agent orchestration server. Agents advertise
//! *capabilities* ("summarize", "translate") instead of addresses; inbound
//! messages are routed to a healthy provider of the target capability, and
//! the provider's logic runs as a pure step function driven by a
//! continuation loop that performs all I/O on its behalf.
//!
//! ## Overview
//!
//! Switchyard can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `switchyard-server` binary
//! 2. **As a library** - Embed the registry, router and orchestrator in
//!    your own Rust project and bring your own collaborators
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use switchyard::{AppState, ConfigManager, SwitchyardConfig};
//! use switchyard::types::{Performative, SubmitMessageRequest, CapabilityRegistration};
//! use std::sync::Arc;
//!
//! let config = Arc::new(ConfigManager::from_config(SwitchyardConfig::default()));
//! let state = AppState::with_defaults(config);
//!
//! state.registry.register(
//!     CapabilityRegistration::new("writer", "summarize", 100)?,
//! )?;
//!
//! let response = state.orchestrator.handle_message(SubmitMessageRequest {
//!     performative: Performative::Request,
//!     sender: "client-1".to_string(),
//!     capability: "summarize".to_string(),
//!     conversation_id: None,
//!     in_reply_to: None,
//!     content: serde_json::json!({"text": "a long article"}),
//! }).await?;
//! ```
//!
//! ## Modules
//!
//! - [`registry`] - Capability registrations and snapshots
//! - [`health`] - Provider probing and performance snapshots
//! - [`routing`] - Strategy-based provider selection
//! - [`conversation`] - Multi-turn message threads
//! - [`orchestrator`] - The continuation-loop driver
//! - [`collaborators`] - External collaborator interfaces
//! - [`api`] - HTTP surface over the above
//! - [`types`] - Common types and error handling
//!
//! ## Architecture
//!
//! Agent logic never performs I/O. A step function maps `(config, state)`
//! to one action (complete, or request a knowledge lookup, a tool call or
//! a model completion) and the orchestrator dispatches that request,
//! folds the outcome back into the state, and steps again. Every
//! suspension point is a visible, typed request.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// External collaborator interfaces and in-memory references.
pub mod collaborators;
/// Conversation tracking and sweeping.
pub mod conversation;
/// Provider health monitoring.
pub mod health;
/// The continuation-loop execution driver.
pub mod orchestrator;
/// Capability registrations.
pub mod registry;
/// Strategy-based provider selection.
pub mod routing;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use conversation::{ConversationConfig, ConversationManager};
pub use health::{HealthConfig, HealthMonitor, HealthProbe, HttpProbe, NoopProbe};
pub use orchestrator::{AgentBehavior, ExecutionState, Orchestrator, OrchestratorConfig};
pub use registry::{CapabilityRegistry, RegistrySnapshot};
pub use routing::{Router, RoutingStrategy};
pub use types::{AppError, Result};
pub use utils::toml_config::{ConfigManager, SwitchyardConfig};

use crate::collaborators::memory::{
    EchoCompletionProvider, InMemoryKnowledgeStore, StaticConfigLoader, ToolRegistry,
};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hot-reloadable configuration
    pub config_manager: Arc<ConfigManager>,
    /// Capability registrations
    pub registry: Arc<CapabilityRegistry>,
    /// Probing and performance snapshots
    pub health: Arc<HealthMonitor>,
    /// Strategy-based provider selection
    pub router: Arc<Router>,
    /// Multi-turn message threads
    pub conversations: Arc<ConversationManager>,
    /// The continuation-loop driver
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Assemble a full state over the in-memory reference collaborators.
    ///
    /// Agents come from the configuration's `[agents.*]` sections; the
    /// knowledge store starts empty, the tool registry holds the built-in
    /// tools, and completions echo their prompt. Embedders wanting real
    /// collaborators construct the [`Orchestrator`] themselves.
    pub fn with_defaults(config_manager: Arc<ConfigManager>) -> Self {
        let config = config_manager.config();

        let registry = Arc::new(CapabilityRegistry::new());
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            Arc::new(HttpProbe::new()),
            config.health.to_health_config(),
        ));
        let router = Arc::new(Router::new(Arc::clone(&registry), Arc::clone(&health)));
        let conversations = Arc::new(ConversationManager::new(
            config.conversation.to_conversation_config(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&router),
            Arc::clone(&conversations),
            Arc::clone(&health),
            Arc::new(StaticConfigLoader::from_agents(config.agents.clone())),
            Arc::new(InMemoryKnowledgeStore::new()),
            Arc::new(ToolRegistry::with_default_tools()),
            Arc::new(EchoCompletionProvider),
            config
                .orchestrator
                .to_orchestrator_config(config.routing.default_strategy),
        ));

        Self {
            config_manager,
            registry,
            health,
            router,
            conversations,
            orchestrator,
        }
    }

    /// Spawn the background health monitor and conversation sweeper.
    pub fn spawn_background_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![self.health.spawn(), self.conversations.spawn_sweeper()]
    }
}
