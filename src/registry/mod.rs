//! Capability registry.
//!
//! Authoritative map from capability name to the registrations offering it.
//! The registry exposes exactly four mutations (register, unregister,
//! status update, and snapshot import) plus ordered lookups and a full
//! export. Registrations are immutable once created except for `status`;
//! changing a capability's semantics means retiring the old registration and
//! creating a new one.
//!
//! Reads take a short `parking_lot` read lock and clone out; writers hold the
//! write lock only for a single map update, so lookups never observe a
//! half-written registration.

use crate::types::{AppError, CapabilityRegistration, RegistrationStatus, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Serializable dump of the full registry state.
///
/// `export` followed by `import` into an empty registry reproduces an
/// identical set of active registrations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RegistrySnapshot {
    /// All registrations in registration order, grouped by capability
    pub registrations: Vec<CapabilityRegistration>,
}

#[derive(Default)]
struct RegistryInner {
    /// Registrations per capability, in registration order
    by_capability: HashMap<String, Vec<CapabilityRegistration>>,
}

/// Concurrency-safe keyed store of capability registrations.
pub struct CapabilityRegistry {
    inner: RwLock<RegistryInner>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Register a provider for a capability.
    ///
    /// Fails with `RegistrationConflict` when an *active* registration for
    /// the same `(provider, capability)` pair already exists. A retired
    /// (non-active) registration for the pair is replaced by the new one.
    pub fn register(&self, registration: CapabilityRegistration) -> Result<()> {
        let mut inner = self.inner.write();
        let entries = inner
            .by_capability
            .entry(registration.capability.clone())
            .or_default();

        if let Some(pos) = entries
            .iter()
            .position(|r| r.provider_id == registration.provider_id)
        {
            if entries[pos].status == RegistrationStatus::Active {
                return Err(AppError::RegistrationConflict {
                    provider_id: registration.provider_id,
                    capability: registration.capability,
                });
            }
            // Retired registration for the pair: the new one supersedes it.
            entries.remove(pos);
        }

        debug!(
            provider = %registration.provider_id,
            capability = %registration.capability,
            priority = registration.priority,
            "registered capability provider"
        );
        entries.push(registration);
        Ok(())
    }

    /// Remove a provider's registration for a capability.
    pub fn unregister(&self, provider_id: &str, capability: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let entries = inner
            .by_capability
            .get_mut(capability)
            .ok_or_else(|| AppError::NotFound(format!("capability '{capability}'")))?;

        let pos = entries
            .iter()
            .position(|r| r.provider_id == provider_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "registration for provider '{provider_id}' on '{capability}'"
                ))
            })?;
        entries.remove(pos);
        if entries.is_empty() {
            inner.by_capability.remove(capability);
        }

        debug!(provider = %provider_id, capability = %capability, "unregistered capability provider");
        Ok(())
    }

    /// List registrations for a capability, in registration order.
    ///
    /// By default only routable (active) registrations are returned; pass
    /// `include_unhealthy = true` to see every status. An unknown capability
    /// yields an empty list; distinguishing "no providers at all" from
    /// "no *active* providers" is the router's job.
    pub fn lookup(&self, capability: &str, include_unhealthy: bool) -> Vec<CapabilityRegistration> {
        let inner = self.inner.read();
        match inner.by_capability.get(capability) {
            Some(entries) => entries
                .iter()
                .filter(|r| include_unhealthy || r.status.is_routable())
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Update the status of one registration.
    ///
    /// This is the only in-place mutation the registry allows, and it is
    /// reserved for health-driven transitions.
    pub fn update_status(
        &self,
        provider_id: &str,
        capability: &str,
        status: RegistrationStatus,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .by_capability
            .get_mut(capability)
            .and_then(|entries| {
                entries
                    .iter_mut()
                    .find(|r| r.provider_id == provider_id)
            })
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "registration for provider '{provider_id}' on '{capability}'"
                ))
            })?;

        if entry.status != status {
            debug!(
                provider = %provider_id,
                capability = %capability,
                from = ?entry.status,
                to = ?status,
                "registration status changed"
            );
            entry.status = status;
        }
        Ok(())
    }

    /// All registrations across all capabilities, in registration order.
    pub fn all_registrations(&self) -> Vec<CapabilityRegistration> {
        let inner = self.inner.read();
        let mut capabilities: Vec<&String> = inner.by_capability.keys().collect();
        capabilities.sort();
        capabilities
            .into_iter()
            .flat_map(|c| inner.by_capability[c].iter().cloned())
            .collect()
    }

    /// All capability names currently registered.
    pub fn capability_names(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner.by_capability.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registrations across all capabilities.
    pub fn len(&self) -> usize {
        self.inner.read().by_capability.values().map(Vec::len).sum()
    }

    /// Whether the registry holds no registrations.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_capability.is_empty()
    }

    /// Export the full registry state.
    pub fn export(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            registrations: self.all_registrations(),
        }
    }

    /// Import a snapshot, registration by registration.
    ///
    /// Importing into a registry that already holds a conflicting active
    /// registration fails partway with `RegistrationConflict`; importing into
    /// an empty registry reproduces the exported state.
    pub fn import(&self, snapshot: RegistrySnapshot) -> Result<usize> {
        let mut imported = 0;
        for registration in snapshot.registrations {
            self.register(registration)?;
            imported += 1;
        }
        Ok(imported)
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
