//! TOML-based configuration for switchyard.
//!
//! Declarative configuration for the server, health monitoring, routing,
//! conversations, the orchestrator and named agents via a TOML file
//! (`switchyard.toml`).
//!
//! # Hot Reloading
//!
//! Configuration changes are detected and applied at runtime. Use
//! [`ConfigManager`] for thread-safe access to the current configuration.

use crate::collaborators::AgentConfig;
use crate::conversation::ConversationConfig;
use crate::health::HealthConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::routing::RoutingStrategy;
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from switchyard.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SwitchyardConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Health monitoring settings
    #[serde(default)]
    pub health: HealthSection,

    /// Routing settings
    #[serde(default)]
    pub routing: RoutingSection,

    /// Conversation settings
    #[serde(default)]
    pub conversation: ConversationSection,

    /// Orchestrator limits and policy
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    /// Named agent configurations
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
}

// ============= Server Configuration =============

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7450
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

// ============= Health Configuration =============

/// Health monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSection {
    /// Seconds between probe passes
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Per-probe timeout in seconds
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Consecutive probe failures before a registration turns unhealthy
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Concurrent calls a provider is assumed to absorb
    #[serde(default = "default_provider_capacity")]
    pub provider_capacity: u32,

    /// Recent outcomes the success rate is computed over
    #[serde(default = "default_success_window")]
    pub success_window: usize,
}

fn default_probe_interval_secs() -> u64 {
    15
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_provider_capacity() -> u32 {
    8
}

fn default_success_window() -> usize {
    20
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            failure_threshold: default_failure_threshold(),
            provider_capacity: default_provider_capacity(),
            success_window: default_success_window(),
        }
    }
}

impl HealthSection {
    /// Convert to the health monitor's runtime configuration.
    pub fn to_health_config(&self) -> HealthConfig {
        HealthConfig {
            probe_interval: Duration::from_secs(self.probe_interval_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            failure_threshold: self.failure_threshold,
            provider_capacity: self.provider_capacity,
            success_window: self.success_window,
            ..HealthConfig::default()
        }
    }
}

// ============= Routing Configuration =============

/// Router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSection {
    /// Strategy used when a query names none
    #[serde(default = "default_strategy")]
    pub default_strategy: RoutingStrategy,
}

fn default_strategy() -> RoutingStrategy {
    RoutingStrategy::Priority
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
        }
    }
}

// ============= Conversation Configuration =============

/// Conversation manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSection {
    /// Idle seconds before a conversation is swept
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,

    /// Seconds between sweeper runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Upper bound on live conversations
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,

    /// Upper bound on participants per conversation
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,
}

fn default_max_idle_secs() -> u64 {
    1800
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_conversations() -> usize {
    10_000
}

fn default_max_participants() -> usize {
    16
}

impl Default for ConversationSection {
    fn default() -> Self {
        Self {
            max_idle_secs: default_max_idle_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_conversations: default_max_conversations(),
            max_participants: default_max_participants(),
        }
    }
}

impl ConversationSection {
    /// Convert to the conversation manager's runtime configuration.
    pub fn to_conversation_config(&self) -> ConversationConfig {
        ConversationConfig {
            max_idle: Duration::from_secs(self.max_idle_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            max_conversations: self.max_conversations,
            max_participants: self.max_participants,
        }
    }
}

// ============= Orchestrator Configuration =============

/// Orchestrator limits and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSection {
    /// Hard ceiling on steps per request
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Wall-clock budget per request, in seconds
    #[serde(default = "default_wall_clock_budget_secs")]
    pub wall_clock_budget_secs: u64,

    /// Per-collaborator-call timeout, in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Whether read-only calls retry once on timeout
    #[serde(default = "default_retry_reads_once")]
    pub retry_reads_once: bool,
}

fn default_max_steps() -> u32 {
    32
}

fn default_wall_clock_budget_secs() -> u64 {
    30
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_retry_reads_once() -> bool {
    true
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            wall_clock_budget_secs: default_wall_clock_budget_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            retry_reads_once: default_retry_reads_once(),
        }
    }
}

impl OrchestratorSection {
    /// Convert to the orchestrator's runtime configuration.
    pub fn to_orchestrator_config(&self, default_strategy: RoutingStrategy) -> OrchestratorConfig {
        OrchestratorConfig {
            max_steps: self.max_steps,
            wall_clock_budget: Duration::from_secs(self.wall_clock_budget_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            retry_reads_once: self.retry_reads_once,
            default_strategy,
        }
    }
}

// ============= Loading and Validation =============

/// Errors raised while loading or watching configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl SwitchyardConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: SwitchyardConfig = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "health.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_steps must be at least 1".to_string(),
            ));
        }
        if self.conversation.max_participants == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.max_participants must be at least 1".to_string(),
            ));
        }
        for (name, agent) in &self.agents {
            if let Some(0) = agent.max_steps {
                return Err(ConfigError::ValidationError(format!(
                    "agent '{name}' has max_steps = 0"
                )));
            }
        }
        Ok(())
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support.
pub struct ConfigManager {
    config: Arc<ArcSwap<SwitchyardConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl ConfigManager {
    /// Create a manager and load the initial configuration from disk.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = SwitchyardConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Create a manager directly from a config (useful for testing).
    /// This one has no file watching.
    pub fn from_config(config: SwitchyardConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("switchyard.toml"),
            watcher: RwLock::new(None),
        }
    }

    /// Get the current configuration (lockless read).
    pub fn config(&self) -> Arc<SwitchyardConfig> {
        self.config.load_full()
    }

    /// Manually reload the configuration from disk.
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = SwitchyardConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching for configuration file changes.
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        // Watch the config file's parent directory
        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        // Reload handler with debouncing
        tokio::spawn(async move {
            let mut last_reload = std::time::Instant::now();
            let debounce = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                if last_reload.elapsed() < debounce {
                    continue;
                }

                // Give the writer a moment to finish
                tokio::time::sleep(Duration::from_millis(100)).await;

                match SwitchyardConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = std::time::Instant::now();
                    }
                    Err(e) => {
                        warn!("Failed to hot-reload config: {}. Keeping previous config.", e);
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes.
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            config_path: self.config_path.clone(),
            watcher: RwLock::new(None), // Watcher is not cloned
        }
    }
}
