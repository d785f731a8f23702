//! Conversation lifecycle over the public API of the manager.

use std::time::Duration;
use switchyard::conversation::{ConversationConfig, ConversationManager};
use switchyard::types::{AppError, Message, Performative};

fn request(conversation_id: &str, sender: &str) -> Message {
    Message::new(
        Performative::Request,
        sender,
        "summarize",
        conversation_id,
        serde_json::json!({"text": "hi"}),
    )
}

#[tokio::test]
async fn test_idle_conversations_are_swept_fresh_ones_survive() {
    let manager = ConversationManager::default();
    manager.append("stale", request("stale", "client")).unwrap();

    // Let the stale thread age past a tiny idle window, then add a fresh one.
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.append("fresh", request("fresh", "client")).unwrap();

    let evicted = manager.sweep(Duration::from_millis(25));
    assert_eq!(evicted, 1);
    assert!(manager.get("stale").is_none());
    assert!(manager.get("fresh").is_some());

    // A generous window evicts nothing.
    assert_eq!(manager.sweep(Duration::from_secs(3600)), 0);
}

#[tokio::test]
async fn test_sweep_is_the_only_deletion_path() {
    let manager = ConversationManager::default();
    manager.append("c1", request("c1", "client")).unwrap();

    // Appends, lookups and stats never remove a conversation.
    let _ = manager.get("c1");
    let _ = manager.list();
    let _ = manager.stats();
    manager.append("c1", request("c1", "other")).unwrap();
    assert!(manager.get("c1").is_some());

    tokio::time::sleep(Duration::from_millis(30)).await;
    manager.sweep(Duration::from_millis(1));
    assert!(manager.get("c1").is_none());
}

#[tokio::test]
async fn test_conversation_bound_is_enforced() {
    let manager = ConversationManager::new(ConversationConfig {
        max_conversations: 2,
        ..ConversationConfig::default()
    });

    manager.open(Some("a")).unwrap();
    manager.open(Some("b")).unwrap();
    let err = manager.open(Some("c")).unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    // Reopening an existing conversation is not a new one.
    manager.open(Some("a")).unwrap();

    // Sweeping frees capacity.
    tokio::time::sleep(Duration::from_millis(30)).await;
    manager.sweep(Duration::from_millis(1));
    manager.open(Some("c")).unwrap();
}

#[tokio::test]
async fn test_listing_orders_by_recent_activity() {
    let manager = ConversationManager::default();
    manager.append("first", request("first", "client")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    manager.append("second", request("second", "client")).unwrap();

    let listing = manager.list();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].conversation_id, "second");
    assert_eq!(listing[1].conversation_id, "first");
}
