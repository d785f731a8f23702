use crate::conversation::{Conversation, ConversationSummary};
use crate::types::{AppError, Result};
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;

/// List live conversations, most recently active first
#[utoipa::path(
    get,
    path = "/api/conversations",
    responses(
        (status = 200, description = "Conversation summaries", body = [ConversationSummary])
    ),
    tag = "conversations"
)]
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ConversationSummary>>> {
    Ok(Json(state.conversations.list()))
}

/// Fetch one conversation with its full message history
#[utoipa::path(
    get,
    path = "/api/conversations/{id}",
    responses(
        (status = 200, description = "The conversation", body = Conversation),
        (status = 404, description = "Unknown or already swept conversation")
    ),
    tag = "conversations"
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>> {
    state
        .conversations
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("conversation '{id}'")))
}
