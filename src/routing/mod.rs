//! Capability routing.
//!
//! Given a capability name and a strategy, the router picks one registration
//! from the registry using the health monitor's performance snapshots.
//! Strategies are a closed set, each backed by a pure scoring function that
//! is unit-testable without a router instance. Zero active providers is a
//! distinct `CapabilityNotFound` condition, never an empty success.

use crate::health::HealthMonitor;
use crate::registry::CapabilityRegistry;
use crate::types::{AppError, CapabilityRegistration, ProviderSnapshot, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

/// Floor for load scores in round-robin weighting, so an idle provider does
/// not get an unbounded weight.
const LOAD_EPSILON: f64 = 0.01;

/// Provider selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    /// Highest `priority × success_rate × (1 − load)` wins
    Priority,
    /// Weighted round-robin, weight `priority / max(load, ε)`
    LoadBalanced,
    /// Minimum load score wins
    LeastLoaded,
    /// Minimum average response time wins
    FastestResponse,
}

/// Why a particular registration was selected (for observability).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoutingReason {
    /// Only one active registration matched
    OnlyCandidate,
    /// Won the priority score comparison
    BestScore,
    /// Its turn on the weighted round-robin wheel
    RoundRobin,
    /// Lowest load score among candidates
    LeastLoaded,
    /// Lowest average response time among candidates
    FastestResponse,
}

/// A routing decision.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The chosen registration
    pub registration: CapabilityRegistration,
    /// Why it was chosen
    pub reason: RoutingReason,
    /// The strategy metric the decision was made on
    pub score: f64,
}

/// Priority strategy score for one candidate.
///
/// The health multiplier is the provider's measured success rate; a provider
/// with no recorded outcomes scores as fully healthy.
pub fn priority_score(registration: &CapabilityRegistration, snapshot: &ProviderSnapshot) -> f64 {
    f64::from(registration.priority) * snapshot.success_rate * (1.0 - snapshot.load_score)
}

/// Round-robin weight for one candidate.
pub fn round_robin_weight(
    registration: &CapabilityRegistration,
    snapshot: &ProviderSnapshot,
) -> i64 {
    (f64::from(registration.priority) / snapshot.load_score.max(LOAD_EPSILON)).round() as i64
}

/// Whether a registration satisfies every metadata equality constraint.
pub fn matches_constraints(
    registration: &CapabilityRegistration,
    constraints: &HashMap<String, String>,
) -> bool {
    constraints
        .iter()
        .all(|(k, v)| registration.metadata.get(k) == Some(v))
}

/// Health-aware capability router.
pub struct Router {
    registry: Arc<CapabilityRegistry>,
    health: Arc<HealthMonitor>,
    /// Smooth weighted round-robin state, capability → provider → current weight
    rr_state: Mutex<HashMap<String, HashMap<String, i64>>>,
}

impl Router {
    /// Create a router over the given registry and health monitor.
    pub fn new(registry: Arc<CapabilityRegistry>, health: Arc<HealthMonitor>) -> Self {
        Self {
            registry,
            health,
            rr_state: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a capability to one provider using the given strategy.
    ///
    /// Only active registrations that satisfy the metadata constraints are
    /// candidates. Returns `CapabilityNotFound` when there are none.
    pub fn resolve(
        &self,
        capability: &str,
        strategy: RoutingStrategy,
        constraints: &HashMap<String, String>,
    ) -> Result<Selection> {
        let candidates: Vec<CapabilityRegistration> = self
            .registry
            .lookup(capability, false)
            .into_iter()
            .filter(|r| matches_constraints(r, constraints))
            .collect();

        if candidates.is_empty() {
            return Err(AppError::CapabilityNotFound(capability.to_string()));
        }

        let snapshots: Vec<ProviderSnapshot> = candidates
            .iter()
            .map(|r| self.health.snapshot(&r.provider_id))
            .collect();

        let (index, mut reason, score) = match strategy {
            RoutingStrategy::Priority => {
                let index = select_priority(&candidates, &snapshots);
                let score = priority_score(&candidates[index], &snapshots[index]);
                (index, RoutingReason::BestScore, score)
            }
            RoutingStrategy::LoadBalanced => {
                let index = self.select_round_robin(capability, &candidates, &snapshots);
                let score = round_robin_weight(&candidates[index], &snapshots[index]) as f64;
                (index, RoutingReason::RoundRobin, score)
            }
            RoutingStrategy::LeastLoaded => {
                let index = select_by_metric(&candidates, &snapshots, |s| s.load_score);
                (index, RoutingReason::LeastLoaded, snapshots[index].load_score)
            }
            RoutingStrategy::FastestResponse => {
                let index = select_by_metric(&candidates, &snapshots, |s| s.avg_response_time_ms);
                (
                    index,
                    RoutingReason::FastestResponse,
                    snapshots[index].avg_response_time_ms,
                )
            }
        };

        if candidates.len() == 1 {
            reason = RoutingReason::OnlyCandidate;
        }

        let registration = candidates.into_iter().nth(index).expect("index in range");
        debug!(
            capability = %capability,
            provider = %registration.provider_id,
            strategy = ?strategy,
            reason = ?reason,
            "resolved capability"
        );

        Ok(Selection {
            registration,
            reason,
            score,
        })
    }

    /// Smooth weighted round-robin: each candidate's current weight grows by
    /// its weight every round; the max is picked and decremented by the
    /// total. Deterministic for a fixed health state.
    fn select_round_robin(
        &self,
        capability: &str,
        candidates: &[CapabilityRegistration],
        snapshots: &[ProviderSnapshot],
    ) -> usize {
        let weights: Vec<i64> = candidates
            .iter()
            .zip(snapshots)
            .map(|(r, s)| round_robin_weight(r, s).max(1))
            .collect();
        let total: i64 = weights.iter().sum();

        let mut rr_state = self.rr_state.lock();
        let state = rr_state.entry(capability.to_string()).or_default();

        let mut best = 0;
        let mut best_current = i64::MIN;
        for (i, (registration, weight)) in candidates.iter().zip(&weights).enumerate() {
            let current = state.entry(registration.provider_id.clone()).or_insert(0);
            *current += weight;
            if *current > best_current {
                best_current = *current;
                best = i;
            }
        }

        if let Some(current) = state.get_mut(&candidates[best].provider_id) {
            *current -= total;
        }
        best
    }
}

/// Pick the max priority score; ties broken by lower average response time,
/// then registration order.
fn select_priority(
    candidates: &[CapabilityRegistration],
    snapshots: &[ProviderSnapshot],
) -> usize {
    let mut best = 0;
    let mut best_score = priority_score(&candidates[0], &snapshots[0]);
    for i in 1..candidates.len() {
        let score = priority_score(&candidates[i], &snapshots[i]);
        if score > best_score
            || (score == best_score
                && snapshots[i].avg_response_time_ms < snapshots[best].avg_response_time_ms)
        {
            best = i;
            best_score = score;
        }
    }
    best
}

/// Pick the minimum of a snapshot metric; ties broken by lower average
/// response time, then registration order.
fn select_by_metric(
    candidates: &[CapabilityRegistration],
    snapshots: &[ProviderSnapshot],
    metric: impl Fn(&ProviderSnapshot) -> f64,
) -> usize {
    let mut best = 0;
    for i in 1..candidates.len() {
        let value = metric(&snapshots[i]);
        let best_value = metric(&snapshots[best]);
        if value < best_value
            || (value == best_value
                && snapshots[i].avg_response_time_ms < snapshots[best].avg_response_time_ms)
        {
            best = i;
        }
    }
    best
}
