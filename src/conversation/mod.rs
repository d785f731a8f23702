//! Conversation tracking.
//!
//! Conversations are ordered message threads keyed by conversation id,
//! independent of routing. A conversation is created on the first message
//! carrying an unknown id and removed only by the idle sweep; there is no
//! explicit close. Reply threading is enforced on append: `in_reply_to`
//! must name an earlier message of the *same* conversation, and a failed
//! append mutates nothing.

use crate::types::{AppError, Message, Performative, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use utoipa::ToSchema;

/// Where in its interaction protocol a conversation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolPhase {
    /// Created, no messages yet
    Initiated,
    /// Plain request/inform traffic
    InProgress,
    /// A proposal or call-for-proposals is outstanding
    Negotiating,
    /// Ended by cancel, refusal, rejection or failure
    Concluded,
}

impl ProtocolPhase {
    /// Phase after appending a message with the given performative.
    fn after(self, performative: Performative) -> ProtocolPhase {
        match performative {
            Performative::Propose | Performative::Cfp => ProtocolPhase::Negotiating,
            Performative::Cancel
            | Performative::Refuse
            | Performative::RejectProposal
            | Performative::Failure => ProtocolPhase::Concluded,
            _ => ProtocolPhase::InProgress,
        }
    }
}

/// One multi-turn message thread.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Conversation {
    /// Thread identifier
    pub conversation_id: String,
    /// Every sender seen on the thread
    pub participants: HashSet<String>,
    /// Messages in append order
    pub messages: Vec<Message>,
    /// Current protocol phase
    pub protocol_phase: ProtocolPhase,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the most recent append (or creation)
    pub last_activity: DateTime<Utc>,
}

impl Conversation {
    fn new(conversation_id: &str) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.to_string(),
            participants: HashSet::new(),
            messages: Vec::new(),
            protocol_phase: ProtocolPhase::Initiated,
            created_at: now,
            last_activity: now,
        }
    }

    fn add_message(&mut self, message: Message) {
        self.participants.insert(message.sender.clone());
        self.protocol_phase = self.protocol_phase.after(message.performative);
        self.last_activity = Utc::now();
        self.messages.push(message);
    }

    /// Whether a message id exists on this thread.
    pub fn contains_message(&self, id: uuid::Uuid) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }
}

/// Compact view of a conversation for listings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationSummary {
    /// Thread identifier
    pub conversation_id: String,
    /// Number of participants seen
    pub participants: usize,
    /// Number of messages on the thread
    pub message_count: usize,
    /// Current protocol phase
    pub protocol_phase: ProtocolPhase,
    /// Time of the most recent activity
    pub last_activity: DateTime<Utc>,
}

/// Aggregate figures over all live conversations.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationStats {
    /// Conversations currently live
    pub total_active: usize,
    /// Conversations created over the manager's lifetime
    pub total_created: u64,
    /// Mean messages per live conversation
    pub average_message_count: f64,
}

/// Conversation manager configuration.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Idle time after which a conversation is evicted by the sweeper
    pub max_idle: Duration,
    /// How often the background sweeper runs
    pub sweep_interval: Duration,
    /// Upper bound on live conversations
    pub max_conversations: usize,
    /// Upper bound on participants per conversation
    pub max_participants: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_idle: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(60),
            max_conversations: 10_000,
            max_participants: 16,
        }
    }
}

/// Owner of all conversation state.
pub struct ConversationManager {
    conversations: RwLock<HashMap<String, Conversation>>,
    total_created: AtomicU64,
    config: ConversationConfig,
}

impl ConversationManager {
    /// Create a manager with the given configuration.
    pub fn new(config: ConversationConfig) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            total_created: AtomicU64::new(0),
            config,
        }
    }

    /// Get a conversation by id, creating it when absent.
    ///
    /// With no id, a fresh conversation under a generated id is created.
    pub fn open(&self, conversation_id: Option<&str>) -> Result<Conversation> {
        let mut conversations = self.conversations.write();

        if let Some(id) = conversation_id
            && let Some(existing) = conversations.get(id)
        {
            return Ok(existing.clone());
        }

        if conversations.len() >= self.config.max_conversations {
            return Err(AppError::InvalidInput(format!(
                "conversation limit of {} reached",
                self.config.max_conversations
            )));
        }

        let id = conversation_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let conversation = Conversation::new(&id);
        conversations.insert(id, conversation.clone());
        self.total_created.fetch_add(1, Ordering::Relaxed);
        Ok(conversation)
    }

    /// Append a message to its conversation.
    ///
    /// Creates the conversation if the id is unknown. Fails with
    /// `InvalidReply` when `in_reply_to` does not resolve to a message of
    /// this conversation; a failed append leaves every conversation
    /// untouched.
    pub fn append(&self, conversation_id: &str, message: Message) -> Result<()> {
        if message.conversation_id != conversation_id {
            return Err(AppError::InvalidInput(format!(
                "message addressed to conversation '{}', appended to '{}'",
                message.conversation_id, conversation_id
            )));
        }

        let mut conversations = self.conversations.write();

        if !conversations.contains_key(conversation_id) {
            if conversations.len() >= self.config.max_conversations {
                return Err(AppError::InvalidInput(format!(
                    "conversation limit of {} reached",
                    self.config.max_conversations
                )));
            }
            conversations.insert(
                conversation_id.to_string(),
                Conversation::new(conversation_id),
            );
            self.total_created.fetch_add(1, Ordering::Relaxed);
        }

        let conversation = conversations
            .get_mut(conversation_id)
            .expect("inserted above");

        if let Some(reply_to) = message.in_reply_to
            && !conversation.contains_message(reply_to)
        {
            return Err(AppError::InvalidReply(format!(
                "message {reply_to} is not part of conversation '{conversation_id}'"
            )));
        }

        if !conversation.participants.contains(&message.sender)
            && conversation.participants.len() >= self.config.max_participants
        {
            return Err(AppError::InvalidInput(format!(
                "participant limit of {} reached on conversation '{conversation_id}'",
                self.config.max_participants
            )));
        }

        conversation.add_message(message);
        Ok(())
    }

    /// Fetch a conversation by id.
    pub fn get(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations.read().get(conversation_id).cloned()
    }

    /// Summaries of all live conversations, most recently active first.
    pub fn list(&self) -> Vec<ConversationSummary> {
        let conversations = self.conversations.read();
        let mut summaries: Vec<ConversationSummary> = conversations
            .values()
            .map(|c| ConversationSummary {
                conversation_id: c.conversation_id.clone(),
                participants: c.participants.len(),
                message_count: c.messages.len(),
                protocol_phase: c.protocol_phase,
                last_activity: c.last_activity,
            })
            .collect();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        summaries
    }

    /// Evict conversations idle for longer than `max_idle`.
    ///
    /// Returns the number evicted. Eviction is the only deletion path.
    pub fn sweep(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_idle).unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut conversations = self.conversations.write();
        let before = conversations.len();
        conversations.retain(|_, c| c.last_activity > cutoff);
        let evicted = before - conversations.len();
        if evicted > 0 {
            debug!(evicted, "swept idle conversations");
        }
        evicted
    }

    /// Aggregate statistics over live conversations.
    pub fn stats(&self) -> ConversationStats {
        let conversations = self.conversations.read();
        let total_active = conversations.len();
        let total_messages: usize = conversations.values().map(|c| c.messages.len()).sum();
        ConversationStats {
            total_active,
            total_created: self.total_created.load(Ordering::Relaxed),
            average_message_count: if total_active > 0 {
                total_messages as f64 / total_active as f64
            } else {
                0.0
            },
        }
    }

    /// Spawn the background idle sweeper. Runs until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.config.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                manager.sweep(manager.config.max_idle);
            }
        })
    }
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new(ConversationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(conversation_id: &str, sender: &str) -> Message {
        Message::new(
            Performative::Request,
            sender,
            "summarize",
            conversation_id,
            serde_json::json!({"text": "hi"}),
        )
    }

    #[test]
    fn test_open_creates_and_reuses() {
        let manager = ConversationManager::default();

        let created = manager.open(Some("c1")).unwrap();
        assert_eq!(created.protocol_phase, ProtocolPhase::Initiated);

        let reopened = manager.open(Some("c1")).unwrap();
        assert_eq!(reopened.conversation_id, "c1");
        assert_eq!(manager.stats().total_created, 1);

        let fresh = manager.open(None).unwrap();
        assert_ne!(fresh.conversation_id, "c1");
        assert_eq!(manager.stats().total_created, 2);
    }

    #[test]
    fn test_append_threads_and_phases() {
        let manager = ConversationManager::default();
        let request = message("c1", "client");
        let request_id = request.id;
        manager.append("c1", request).unwrap();

        let conversation = manager.get("c1").unwrap();
        assert_eq!(conversation.protocol_phase, ProtocolPhase::InProgress);

        let mut reply = message("c1", "provider");
        reply.performative = Performative::Inform;
        reply.in_reply_to = Some(request_id);
        manager.append("c1", reply).unwrap();

        let conversation = manager.get("c1").unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.participants.len(), 2);
    }

    #[test]
    fn test_cross_conversation_reply_rejected_without_mutation() {
        let manager = ConversationManager::default();
        let first = message("c1", "client");
        let foreign_id = first.id;
        manager.append("c1", first).unwrap();
        manager.append("c2", message("c2", "client")).unwrap();

        let mut bad_reply = message("c2", "provider");
        bad_reply.in_reply_to = Some(foreign_id);
        let err = manager.append("c2", bad_reply).unwrap_err();
        assert!(matches!(err, AppError::InvalidReply(_)));

        // Neither conversation changed.
        assert_eq!(manager.get("c1").unwrap().messages.len(), 1);
        assert_eq!(manager.get("c2").unwrap().messages.len(), 1);
    }

    #[test]
    fn test_sweep_evicts_only_idle_conversations() {
        let manager = ConversationManager::default();
        manager.append("old", message("old", "client")).unwrap();
        manager.append("new", message("new", "client")).unwrap();

        // Backdate the old conversation past the idle window.
        manager
            .conversations
            .write()
            .get_mut("old")
            .unwrap()
            .last_activity = Utc::now() - chrono::Duration::hours(2);

        let evicted = manager.sweep(Duration::from_secs(1800));
        assert_eq!(evicted, 1);
        assert!(manager.get("old").is_none());
        assert!(manager.get("new").is_some());
    }

    #[test]
    fn test_negotiation_phases() {
        let manager = ConversationManager::default();
        let mut proposal = message("c1", "provider");
        proposal.performative = Performative::Propose;
        manager.append("c1", proposal).unwrap();
        assert_eq!(
            manager.get("c1").unwrap().protocol_phase,
            ProtocolPhase::Negotiating
        );

        let mut rejection = message("c1", "client");
        rejection.performative = Performative::RejectProposal;
        manager.append("c1", rejection).unwrap();
        assert_eq!(
            manager.get("c1").unwrap().protocol_phase,
            ProtocolPhase::Concluded
        );
    }

    #[test]
    fn test_participant_limit() {
        let manager = ConversationManager::new(ConversationConfig {
            max_participants: 2,
            ..ConversationConfig::default()
        });
        manager.append("c1", message("c1", "a")).unwrap();
        manager.append("c1", message("c1", "b")).unwrap();

        let err = manager.append("c1", message("c1", "c")).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        // Existing participants may keep talking.
        manager.append("c1", message("c1", "a")).unwrap();
    }

    #[test]
    fn test_stats() {
        let manager = ConversationManager::default();
        manager.append("c1", message("c1", "a")).unwrap();
        manager.append("c1", message("c1", "b")).unwrap();
        manager.append("c2", message("c2", "a")).unwrap();

        let stats = manager.stats();
        assert_eq!(stats.total_active, 2);
        assert_eq!(stats.total_created, 2);
        assert!((stats.average_message_count - 1.5).abs() < f64::EPSILON);
    }
}
