//! Provider health monitoring.
//!
//! The monitor probes every registration on a fixed interval through a
//! [`HealthProbe`] implementation. A configurable run of consecutive probe
//! failures transitions a registration `active → unhealthy`; a single
//! success transitions it back. Probe errors are never fatal to the monitor
//! itself; one provider failing does not stop probing of the others.
//!
//! The monitor also owns the derived performance snapshots (load score,
//! average response time, success rate). The orchestrator reports call
//! outcomes here; the router reads snapshots from here. Status changes are
//! published on a broadcast channel that observers may watch, but nothing
//! ever waits on a health transition synchronously.

use crate::registry::CapabilityRegistry;
use crate::types::{
    AppError, CapabilityRegistration, ProviderSnapshot, RegistrationStatus, Result,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Health monitoring configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// How often each registration is probed
    pub probe_interval: Duration,
    /// Per-probe timeout
    pub probe_timeout: Duration,
    /// Consecutive probe failures before a registration turns unhealthy
    pub failure_threshold: u32,
    /// Concurrent calls a provider is assumed to absorb (drives load score)
    pub provider_capacity: u32,
    /// Smoothing factor for the response-time average, in (0, 1]
    pub response_time_alpha: f64,
    /// Number of recent outcomes the success rate is computed over
    pub success_window: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(3),
            failure_threshold: 3,
            provider_capacity: 8,
            response_time_alpha: 0.2,
            success_window: 20,
        }
    }
}

/// A status transition observed by the monitor.
#[derive(Debug, Clone)]
pub struct HealthEvent {
    /// Provider whose registration changed
    pub provider_id: String,
    /// Capability the registration covers
    pub capability: String,
    /// Status before the transition
    pub from: RegistrationStatus,
    /// Status after the transition
    pub to: RegistrationStatus,
}

/// Probes one registration for liveness.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Check the provider behind the registration. `Ok(())` means alive.
    async fn probe(&self, registration: &CapabilityRegistration) -> Result<()>;
}

/// Probe that always succeeds.
///
/// With this probe, liveness derives solely from call outcomes reported by
/// the orchestrator; probe-driven transitions never fire.
pub struct NoopProbe;

#[async_trait]
impl HealthProbe for NoopProbe {
    async fn probe(&self, _registration: &CapabilityRegistration) -> Result<()> {
        Ok(())
    }
}

/// Probe that issues a GET against the registration's `health_check`
/// metadata URL. Registrations without one pass trivially.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Create an HTTP probe with its own client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, registration: &CapabilityRegistration) -> Result<()> {
        let Some(url) = registration.metadata.get("health_check") else {
            return Ok(());
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalCallFailed(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::ExternalCallFailed(format!(
                "health check returned {}",
                response.status()
            )))
        }
    }
}

/// Rolling per-provider performance figures.
struct ProviderStats {
    in_flight: u32,
    ewma_response_ms: f64,
    recent_outcomes: VecDeque<bool>,
}

impl ProviderStats {
    fn new() -> Self {
        Self {
            in_flight: 0,
            ewma_response_ms: 0.0,
            recent_outcomes: VecDeque::new(),
        }
    }

    fn record(&mut self, elapsed_ms: f64, ok: bool, config: &HealthConfig) {
        if ok {
            self.ewma_response_ms = if self.ewma_response_ms == 0.0 {
                elapsed_ms
            } else {
                config.response_time_alpha * elapsed_ms
                    + (1.0 - config.response_time_alpha) * self.ewma_response_ms
            };
        }
        self.recent_outcomes.push_back(ok);
        while self.recent_outcomes.len() > config.success_window {
            self.recent_outcomes.pop_front();
        }
    }

    fn snapshot(&self, config: &HealthConfig) -> ProviderSnapshot {
        let success_rate = if self.recent_outcomes.is_empty() {
            1.0
        } else {
            let ok = self.recent_outcomes.iter().filter(|o| **o).count();
            ok as f64 / self.recent_outcomes.len() as f64
        };
        ProviderSnapshot {
            load_score: (f64::from(self.in_flight) / f64::from(config.provider_capacity.max(1)))
                .clamp(0.0, 1.0),
            avg_response_time_ms: self.ewma_response_ms,
            success_rate,
        }
    }
}

/// Periodic prober and keeper of performance snapshots.
pub struct HealthMonitor {
    registry: Arc<CapabilityRegistry>,
    probe: Arc<dyn HealthProbe>,
    config: HealthConfig,
    stats: RwLock<HashMap<String, ProviderStats>>,
    consecutive_failures: RwLock<HashMap<(String, String), u32>>,
    events: broadcast::Sender<HealthEvent>,
}

impl HealthMonitor {
    /// Create a monitor over the given registry and probe.
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        probe: Arc<dyn HealthProbe>,
        config: HealthConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            registry,
            probe,
            config,
            stats: RwLock::new(HashMap::new()),
            consecutive_failures: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to status transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.events.subscribe()
    }

    /// Current snapshot for a provider. Unknown providers get the
    /// optimistic default.
    pub fn snapshot(&self, provider_id: &str) -> ProviderSnapshot {
        self.stats
            .read()
            .get(provider_id)
            .map(|s| s.snapshot(&self.config))
            .unwrap_or_default()
    }

    /// Record that an orchestrated call to a provider started.
    pub fn call_started(&self, provider_id: &str) {
        let mut stats = self.stats.write();
        stats
            .entry(provider_id.to_string())
            .or_insert_with(ProviderStats::new)
            .in_flight += 1;
    }

    /// Record that an orchestrated call finished, with its outcome.
    pub fn call_finished(&self, provider_id: &str, elapsed: Duration, ok: bool) {
        let mut stats = self.stats.write();
        let entry = stats
            .entry(provider_id.to_string())
            .or_insert_with(ProviderStats::new);
        entry.in_flight = entry.in_flight.saturating_sub(1);
        entry.record(elapsed.as_secs_f64() * 1000.0, ok, &self.config);
    }

    /// Run one probe pass over every registration.
    ///
    /// Only active and unhealthy registrations participate; draining and
    /// inactive ones are administrative states the monitor never touches.
    pub async fn probe_all(&self) {
        for registration in self.registry.all_registrations() {
            if !matches!(
                registration.status,
                RegistrationStatus::Active | RegistrationStatus::Unhealthy
            ) {
                continue;
            }

            let outcome = tokio::time::timeout(
                self.config.probe_timeout,
                self.probe.probe(&registration),
            )
            .await;

            match outcome {
                Ok(Ok(())) => self.record_probe_success(&registration),
                Ok(Err(e)) => {
                    debug!(
                        provider = %registration.provider_id,
                        capability = %registration.capability,
                        error = %e,
                        "health probe failed"
                    );
                    self.record_probe_failure(&registration);
                }
                Err(_) => {
                    debug!(
                        provider = %registration.provider_id,
                        capability = %registration.capability,
                        "health probe timed out"
                    );
                    self.record_probe_failure(&registration);
                }
            }
        }
    }

    fn record_probe_success(&self, registration: &CapabilityRegistration) {
        let key = (
            registration.provider_id.clone(),
            registration.capability.clone(),
        );
        self.consecutive_failures.write().remove(&key);

        if registration.status == RegistrationStatus::Unhealthy {
            self.transition(registration, RegistrationStatus::Active);
        }
    }

    fn record_probe_failure(&self, registration: &CapabilityRegistration) {
        let key = (
            registration.provider_id.clone(),
            registration.capability.clone(),
        );
        let failures = {
            let mut counters = self.consecutive_failures.write();
            let counter = counters.entry(key).or_insert(0);
            *counter += 1;
            *counter
        };

        if failures >= self.config.failure_threshold
            && registration.status == RegistrationStatus::Active
        {
            self.transition(registration, RegistrationStatus::Unhealthy);
        }
    }

    fn transition(&self, registration: &CapabilityRegistration, to: RegistrationStatus) {
        match self
            .registry
            .update_status(&registration.provider_id, &registration.capability, to)
        {
            Ok(()) => {
                let _ = self.events.send(HealthEvent {
                    provider_id: registration.provider_id.clone(),
                    capability: registration.capability.clone(),
                    from: registration.status,
                    to,
                });
            }
            Err(e) => {
                // Registration may have been unregistered between the lookup
                // and the status write.
                warn!(
                    provider = %registration.provider_id,
                    capability = %registration.capability,
                    error = %e,
                    "health transition skipped"
                );
            }
        }
    }

    /// Spawn the periodic probe loop. Runs until the task is aborted.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.probe_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                monitor.probe_all().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe that serves scripted per-provider outcomes, then succeeds.
    struct ScriptedProbe {
        outcomes: RwLock<HashMap<String, Vec<bool>>>,
        cursor: RwLock<HashMap<String, usize>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(outcomes: HashMap<String, Vec<bool>>) -> Self {
            Self {
                outcomes: RwLock::new(outcomes),
                cursor: RwLock::new(HashMap::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, registration: &CapabilityRegistration) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
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

    fn setup(outcomes: HashMap<String, Vec<bool>>) -> (Arc<CapabilityRegistry>, HealthMonitor) {
        let registry = Arc::new(CapabilityRegistry::new());
        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            Arc::new(ScriptedProbe::new(outcomes)),
            HealthConfig::default(),
        );
        (registry, monitor)
    }

    #[tokio::test]
    async fn test_three_failures_mark_unhealthy_one_success_restores() {
        let mut outcomes = HashMap::new();
        outcomes.insert("a".to_string(), vec![false, false, false, true]);
        let (registry, monitor) = setup(outcomes);
        registry
            .register(CapabilityRegistration::new("a", "summarize", 100).unwrap())
            .unwrap();

        monitor.probe_all().await;
        monitor.probe_all().await;
        assert_eq!(
            registry.lookup("summarize", true)[0].status,
            RegistrationStatus::Active
        );

        monitor.probe_all().await;
        assert_eq!(
            registry.lookup("summarize", true)[0].status,
            RegistrationStatus::Unhealthy
        );

        monitor.probe_all().await;
        assert_eq!(
            registry.lookup("summarize", true)[0].status,
            RegistrationStatus::Active
        );
    }

    #[tokio::test]
    async fn test_one_failing_provider_does_not_stop_others() {
        let mut outcomes = HashMap::new();
        outcomes.insert("bad".to_string(), vec![false; 10]);
        outcomes.insert("good".to_string(), vec![true; 10]);
        let (registry, monitor) = setup(outcomes);
        registry
            .register(CapabilityRegistration::new("bad", "summarize", 100).unwrap())
            .unwrap();
        registry
            .register(CapabilityRegistration::new("good", "summarize", 50).unwrap())
            .unwrap();

        for _ in 0..3 {
            monitor.probe_all().await;
        }

        let all = registry.lookup("summarize", true);
        let bad = all.iter().find(|r| r.provider_id == "bad").unwrap();
        let good = all.iter().find(|r| r.provider_id == "good").unwrap();
        assert_eq!(bad.status, RegistrationStatus::Unhealthy);
        assert_eq!(good.status, RegistrationStatus::Active);
    }

    #[tokio::test]
    async fn test_inactive_registrations_are_not_probed() {
        let registry = Arc::new(CapabilityRegistry::new());
        let probe = Arc::new(ScriptedProbe::new(HashMap::new()));
        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&probe) as Arc<dyn HealthProbe>,
            HealthConfig::default(),
        );
        registry
            .register(CapabilityRegistration::new("a", "summarize", 100).unwrap())
            .unwrap();
        registry
            .update_status("a", "summarize", RegistrationStatus::Inactive)
            .unwrap();

        monitor.probe_all().await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_call_outcomes_shape_snapshot() {
        let (_, monitor) = setup(HashMap::new());

        monitor.call_started("a");
        let snap = monitor.snapshot("a");
        assert!(snap.load_score > 0.0);

        monitor.call_finished("a", Duration::from_millis(100), true);
        monitor.call_started("a");
        monitor.call_finished("a", Duration::from_millis(300), false);

        let snap = monitor.snapshot("a");
        assert_eq!(snap.load_score, 0.0);
        assert!(snap.avg_response_time_ms > 0.0);
        assert!((snap.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_provider_gets_default_snapshot() {
        let (_, monitor) = setup(HashMap::new());
        let snap = monitor.snapshot("nobody");
        assert_eq!(snap.success_rate, 1.0);
        assert_eq!(snap.load_score, 0.0);
    }
}
