use crate::types::{Result, SubmitMessageRequest, SubmitMessageResponse};
use crate::AppState;
use axum::extract::State;
use axum::Json;

/// Submit a message and receive the orchestrated reply
///
/// The message is attached to its conversation (created if needed), the
/// target capability is resolved to a provider, the provider's agent is
/// driven to completion, and the reply is recorded and returned.
#[utoipa::path(
    post,
    path = "/api/messages",
    request_body = SubmitMessageRequest,
    responses(
        (status = 200, description = "Orchestrated reply", body = SubmitMessageResponse),
        (status = 404, description = "No active provider for the capability"),
        (status = 400, description = "Invalid message or reply threading"),
        (status = 504, description = "External call timed out")
    ),
    tag = "messages"
)]
pub async fn submit(
    State(state): State<AppState>,
    Json(payload): Json<SubmitMessageRequest>,
) -> Result<Json<SubmitMessageResponse>> {
    let response = state.orchestrator.handle_message(payload).await?;
    Ok(Json(response))
}
