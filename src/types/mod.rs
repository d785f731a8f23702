//! Core types (messages, registrations, errors).
//!
//! Everything that crosses a module boundary lives here: the message
//! envelope and its performatives, capability registrations, derived
//! provider performance snapshots, the API request/response types, and the
//! crate-wide error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

// ============= Messaging Types =============

/// Communicative intent of a message, following the FIPA performative set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Performative {
    /// Ask the receiver to perform an action
    Request,
    /// Share information with the receiver
    Inform,
    /// Ask the receiver a question
    Query,
    /// Report that a requested action failed
    Failure,
    /// The message could not be interpreted
    NotUnderstood,
    /// Offer to perform an action under conditions
    Propose,
    /// Accept a previously received proposal
    AcceptProposal,
    /// Reject a previously received proposal
    RejectProposal,
    /// Decline to perform a requested action
    Refuse,
    /// Commit to performing a requested action
    Agree,
    /// Withdraw a previous request
    Cancel,
    /// Call for proposals (contract-net opening)
    Cfp,
}

/// A single message in a conversation.
///
/// Messages target a *capability*, not a concrete agent; the router decides
/// which registered provider handles it. `in_reply_to` must reference an
/// earlier message id in the same conversation or be absent.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    /// Unique message identifier
    pub id: Uuid,
    /// Communicative intent
    pub performative: Performative,
    /// Identifier of the sending party
    pub sender: String,
    /// Target capability name (e.g. "summarize")
    pub capability: String,
    /// Conversation this message belongs to
    pub conversation_id: String,
    /// Id of the earlier message this one replies to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<Uuid>,
    /// Correlation label the sender expects echoed back in a reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_with: Option<String>,
    /// Interaction protocol the conversation follows, if declared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Opaque payload
    pub content: serde_json::Value,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message in the given conversation.
    pub fn new(
        performative: Performative,
        sender: &str,
        capability: &str,
        conversation_id: &str,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            performative,
            sender: sender.to_string(),
            capability: capability.to_string(),
            conversation_id: conversation_id.to_string(),
            in_reply_to: None,
            reply_with: None,
            protocol: None,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Build a reply to this message within the same conversation.
    pub fn reply(
        &self,
        performative: Performative,
        sender: &str,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            performative,
            sender: sender.to_string(),
            capability: self.capability.clone(),
            conversation_id: self.conversation_id.clone(),
            in_reply_to: Some(self.id),
            reply_with: None,
            protocol: self.protocol.clone(),
            content,
            timestamp: Utc::now(),
        }
    }

    /// Validate the envelope: non-empty sender and capability, non-null content.
    pub fn validate(&self) -> Result<()> {
        if self.sender.is_empty() {
            return Err(AppError::InvalidInput("empty sender".to_string()));
        }
        if self.capability.is_empty() {
            return Err(AppError::InvalidInput("empty capability".to_string()));
        }
        if self.content.is_null() {
            return Err(AppError::InvalidInput("null content".to_string()));
        }
        Ok(())
    }
}

// ============= Registration Types =============

/// Lifecycle status of a capability registration.
///
/// Only `status` may change after a registration is created; changing what a
/// capability means requires retiring the registration and creating a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Healthy and eligible for routing
    Active,
    /// Failing health probes; excluded from routing until a probe succeeds
    Unhealthy,
    /// Finishing in-flight work, accepts nothing new
    Draining,
    /// Administratively disabled
    Inactive,
}

impl RegistrationStatus {
    /// Whether the router may select a registration in this status.
    pub fn is_routable(self) -> bool {
        matches!(self, RegistrationStatus::Active)
    }
}

/// Upper bound for registration priority.
pub const MAX_PRIORITY: u16 = 1000;

/// A provider's claim to handle one capability.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CapabilityRegistration {
    /// Provider offering the capability
    pub provider_id: String,
    /// Capability name
    pub capability: String,
    /// Selection priority, 0–1000
    pub priority: u16,
    /// Current status (the only mutable field)
    pub status: RegistrationStatus,
    /// Opaque key/value metadata (constraint filters match against this)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Registration time
    pub registered_at: DateTime<Utc>,
}

impl CapabilityRegistration {
    /// Create an active registration, validating the priority range.
    pub fn new(provider_id: &str, capability: &str, priority: u16) -> Result<Self> {
        if priority > MAX_PRIORITY {
            return Err(AppError::InvalidInput(format!(
                "priority {priority} exceeds maximum {MAX_PRIORITY}"
            )));
        }
        if provider_id.is_empty() || capability.is_empty() {
            return Err(AppError::InvalidInput(
                "provider id and capability must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            provider_id: provider_id.to_string(),
            capability: capability.to_string(),
            priority,
            status: RegistrationStatus::Active,
            metadata: HashMap::new(),
            registered_at: Utc::now(),
        })
    }

    /// Attach metadata to the registration.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Derived performance snapshot for one provider.
///
/// Refreshed by the health monitor from probe and call outcomes and consumed
/// only by the router. Never authoritative for correctness, only for
/// selection quality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct ProviderSnapshot {
    /// Fraction of the provider's capacity currently in use, in [0, 1]
    pub load_score: f64,
    /// Exponentially weighted average response time in milliseconds
    pub avg_response_time_ms: f64,
    /// Fraction of recent calls/probes that succeeded, in [0, 1]
    pub success_rate: f64,
}

impl Default for ProviderSnapshot {
    fn default() -> Self {
        Self {
            load_score: 0.0,
            avg_response_time_ms: 0.0,
            success_rate: 1.0,
        }
    }
}

// ============= API Request/Response Types =============

/// Registration envelope accepted by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Provider identifier
    pub provider_id: String,
    /// Capability name being offered
    pub capability: String,
    /// Selection priority, 0–1000
    pub priority: u16,
    /// Opaque metadata; a `health_check` key is probed over HTTP
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Routing query accepted by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RouteRequest {
    /// Capability to resolve
    pub capability: String,
    /// Strategy name: priority, load-balanced, least-loaded, fastest-response
    pub strategy: crate::routing::RoutingStrategy,
    /// Metadata equality constraints a registration must satisfy
    #[serde(default)]
    pub constraints: HashMap<String, String>,
}

/// A routing decision as reported by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RouteResponse {
    /// Selected provider
    pub provider_id: String,
    /// Capability that was resolved
    pub capability: String,
    /// The selected registration's priority
    pub priority: u16,
    /// Why this provider won
    pub reason: crate::routing::RoutingReason,
    /// The strategy metric the decision was made on
    pub score: f64,
}

/// Message submission envelope accepted by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitMessageRequest {
    /// Communicative intent
    pub performative: Performative,
    /// Identifier of the sending party
    pub sender: String,
    /// Target capability
    pub capability: String,
    /// Existing conversation to continue; a new one is created when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Earlier message this one replies to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<Uuid>,
    /// Opaque payload
    pub content: serde_json::Value,
}

/// Outcome of a fully orchestrated message exchange.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitMessageResponse {
    /// The reply message recorded into the conversation
    pub reply: Message,
    /// Provider that handled the request
    pub provider_id: String,
    /// Number of orchestrator steps taken
    pub steps: usize,
    /// End-to-end handling time in milliseconds
    pub elapsed_ms: u64,
}

/// Health view of one registration, as reported by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderHealth {
    /// Provider identifier
    pub provider_id: String,
    /// Capability the registration covers
    pub capability: String,
    /// Current registration status
    pub status: RegistrationStatus,
    /// Derived performance snapshot
    pub snapshot: ProviderSnapshot,
}

// ============= Error Types =============

/// Crate-wide error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("provider '{provider_id}' already has an active registration for '{capability}'")]
    RegistrationConflict {
        provider_id: String,
        capability: String,
    },

    #[error("no active provider for capability '{0}'")]
    CapabilityNotFound(String),

    #[error("failed to load agent configuration: {0}")]
    ConfigLoad(String),

    #[error("invalid reply: {0}")]
    InvalidReply(String),

    #[error("external call timed out after {0:?}")]
    ExternalCallTimeout(Duration),

    #[error("external call failed: {0}")]
    ExternalCallFailed(String),

    #[error("execution aborted: {0}")]
    MaxStepsExceeded(String),

    #[error("execution state serialization failed: {0}")]
    StateSerialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::RegistrationConflict { .. } => StatusCode::CONFLICT,
            AppError::CapabilityNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidReply(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::ExternalCallTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ConfigLoad(_)
            | AppError::ExternalCallFailed(_)
            | AppError::MaxStepsExceeded(_)
            | AppError::StateSerialization(_)
            | AppError::Configuration(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_reply_threads_conversation() {
        let msg = Message::new(
            Performative::Request,
            "client-1",
            "summarize",
            "conv-1",
            serde_json::json!({"text": "hello"}),
        );
        let reply = msg.reply(Performative::Inform, "provider-a", serde_json::json!("hi"));

        assert_eq!(reply.conversation_id, "conv-1");
        assert_eq!(reply.in_reply_to, Some(msg.id));
        assert_eq!(reply.capability, "summarize");
    }

    #[test]
    fn test_message_validation() {
        let mut msg = Message::new(
            Performative::Query,
            "client",
            "lookup",
            "c",
            serde_json::json!(1),
        );
        assert!(msg.validate().is_ok());

        msg.content = serde_json::Value::Null;
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_registration_priority_bounds() {
        assert!(CapabilityRegistration::new("p", "summarize", 1000).is_ok());
        assert!(CapabilityRegistration::new("p", "summarize", 1001).is_err());
        assert!(CapabilityRegistration::new("", "summarize", 10).is_err());
    }

    #[test]
    fn test_performative_wire_names() {
        let json = serde_json::to_string(&Performative::NotUnderstood).unwrap();
        assert_eq!(json, "\"not-understood\"");
        let json = serde_json::to_string(&Performative::AcceptProposal).unwrap();
        assert_eq!(json, "\"accept-proposal\"");
    }

    #[test]
    fn test_snapshot_defaults_optimistic() {
        let snap = ProviderSnapshot::default();
        assert_eq!(snap.load_score, 0.0);
        assert_eq!(snap.success_rate, 1.0);
    }
}
