//! Mock implementations for testing.
//!
//! Scripted probes and collaborators shared across the integration tests,
//! so individual test files don't each hand-roll their own.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use switchyard::collaborators::{CompletionProvider, Measured, PromptContext};
use switchyard::health::HealthProbe;
use switchyard::types::{AppError, CapabilityRegistration, Result};
use switchyard::{AppState, ConfigManager, SwitchyardConfig};

/// Health probe that serves scripted per-provider outcomes, then succeeds.
pub struct ScriptedProbe {
    outcomes: RwLock<HashMap<String, Vec<bool>>>,
    cursor: RwLock<HashMap<String, usize>>,
}

impl ScriptedProbe {
    /// Script outcomes per provider id; providers without a script pass.
    pub fn new(outcomes: HashMap<String, Vec<bool>>) -> Self {
        Self {
            outcomes: RwLock::new(outcomes),
            cursor: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, registration: &CapabilityRegistration) -> Result<()> {
        let mut cursor = self.cursor.write();
        let idx = cursor.entry(registration.provider_id.clone()).or_insert(0);
        let ok = self
            .outcomes
            .read()
            .get(&registration.provider_id)
            .and_then(|seq| seq.get(*idx).copied())
            .unwrap_or(true);
        *idx += 1;
        if ok {
            Ok(())
        } else {
            Err(AppError::ExternalCallFailed("scripted failure".to_string()))
        }
    }
}

/// Completion provider that always fails.
pub struct FailingCompletionProvider;

#[async_trait]
impl CompletionProvider for FailingCompletionProvider {
    async fn complete(&self, _context: &PromptContext) -> Result<Measured<String>> {
        Err(AppError::ExternalCallFailed(
            "mock completion failure".to_string(),
        ))
    }
}

/// Completion provider that sleeps past any sane test timeout.
pub struct HangingCompletionProvider;

#[async_trait]
impl CompletionProvider for HangingCompletionProvider {
    async fn complete(&self, _context: &PromptContext) -> Result<Measured<String>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Measured::new(String::new(), Duration::ZERO))
    }
}

/// Full default application state over an empty in-memory stack.
pub fn test_state() -> AppState {
    AppState::with_defaults(Arc::new(ConfigManager::from_config(
        SwitchyardConfig::default(),
    )))
}

/// Application state whose config carries the given agent sections as TOML.
pub fn test_state_with_config(toml_source: &str) -> AppState {
    let config: SwitchyardConfig = toml::from_str(toml_source).expect("valid test config");
    AppState::with_defaults(Arc::new(ConfigManager::from_config(config)))
}
