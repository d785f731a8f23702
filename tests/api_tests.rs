//! HTTP surface tests over the full application state.

mod common;

use axum_test::TestServer;
use common::mocks::test_state_with_config;
use serde_json::json;
use switchyard::api::routes::create_router;
use switchyard::registry::RegistrySnapshot;
use switchyard::types::{
    CapabilityRegistration, ProviderHealth, RouteResponse, SubmitMessageResponse,
};
use switchyard::AppState;

fn server() -> (TestServer, AppState) {
    let state = test_state_with_config(
        r#"
[agents.writer]
system_prompt = "You summarize text."
"#,
    );
    let app = create_router().with_state(state.clone());
    (TestServer::new(app).expect("test server"), state)
}

async fn register_writer(server: &TestServer) {
    let response = server
        .post("/api/registry")
        .json(&json!({
            "provider_id": "writer",
            "capability": "summarize",
            "priority": 100
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
}

#[tokio::test]
async fn test_register_then_conflict() {
    let (server, _) = server();
    register_writer(&server).await;

    let response = server
        .post("/api/registry")
        .json(&json!({
            "provider_id": "writer",
            "capability": "summarize",
            "priority": 200
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_rejects_out_of_range_priority() {
    let (server, _) = server();

    let response = server
        .post("/api/registry")
        .json(&json!({
            "provider_id": "writer",
            "capability": "summarize",
            "priority": 5000
        }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_lookup_and_unregister() {
    let (server, _) = server();
    register_writer(&server).await;

    let registrations: Vec<CapabilityRegistration> =
        server.get("/api/registry/summarize").await.json();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].provider_id, "writer");

    let response = server.delete("/api/registry/writer/summarize").await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);

    let response = server.delete("/api/registry/writer/summarize").await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_route_resolution_and_not_found() {
    let (server, _) = server();
    register_writer(&server).await;

    let decision: RouteResponse = server
        .post("/api/route")
        .json(&json!({
            "capability": "summarize",
            "strategy": "priority"
        }))
        .await
        .json();
    assert_eq!(decision.provider_id, "writer");

    let response = server
        .post("/api/route")
        .json(&json!({
            "capability": "translate",
            "strategy": "priority"
        }))
        .await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_message_flow_and_conversation_inspection() {
    let (server, _) = server();
    register_writer(&server).await;

    let submitted: SubmitMessageResponse = server
        .post("/api/messages")
        .json(&json!({
            "performative": "request",
            "sender": "client-1",
            "capability": "summarize",
            "conversation_id": "conv-api",
            "content": {"text": "hello api"}
        }))
        .await
        .json();
    assert_eq!(submitted.provider_id, "writer");
    assert_eq!(submitted.reply.content, json!("hello api"));

    let conversation = server.get("/api/conversations/conv-api").await;
    conversation.assert_status_ok();
    let body: serde_json::Value = conversation.json();
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);

    let listing: Vec<serde_json::Value> = server.get("/api/conversations").await.json();
    assert_eq!(listing.len(), 1);

    let missing = server.get("/api/conversations/ghost").await;
    missing.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_reply_is_bad_request() {
    let (server, _) = server();
    register_writer(&server).await;

    let response = server
        .post("/api/messages")
        .json(&json!({
            "performative": "request",
            "sender": "client-1",
            "capability": "summarize",
            "conversation_id": "conv-bad",
            "in_reply_to": uuid::Uuid::new_v4(),
            "content": {"text": "reply to nothing"}
        }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_endpoints() {
    let (server, state) = server();
    register_writer(&server).await;

    let liveness = server.get("/api/health").await;
    liveness.assert_status_ok();

    state.health.call_started("writer");
    state
        .health
        .call_finished("writer", std::time::Duration::from_millis(42), true);

    let providers: Vec<ProviderHealth> = server.get("/api/providers/health").await.json();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].provider_id, "writer");
    assert!(providers[0].snapshot.avg_response_time_ms > 0.0);
}

#[tokio::test]
async fn test_registry_export_import_via_api() {
    let (srv, _) = server();
    register_writer(&srv).await;
    srv
        .post("/api/registry")
        .json(&json!({
            "provider_id": "translator",
            "capability": "translate",
            "priority": 40,
            "metadata": {"region": "eu"}
        }))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let snapshot: RegistrySnapshot = srv.get("/api/registry").await.json();
    assert_eq!(snapshot.registrations.len(), 2);

    // Import into a fresh server and compare the exported states.
    let (fresh, _) = server();
    let imported = fresh.post("/api/registry/import").json(&snapshot).await;
    imported.assert_status_ok();

    let round_tripped: RegistrySnapshot = fresh.get("/api/registry").await.json();
    let mut original: Vec<_> = snapshot
        .registrations
        .iter()
        .map(|r| (r.provider_id.clone(), r.capability.clone()))
        .collect();
    let mut restored: Vec<_> = round_tripped
        .registrations
        .iter()
        .map(|r| (r.provider_id.clone(), r.capability.clone()))
        .collect();
    original.sort();
    restored.sort();
    assert_eq!(original, restored);
}
