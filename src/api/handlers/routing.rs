use crate::types::{Result, RouteRequest, RouteResponse};
use crate::AppState;
use axum::extract::State;
use axum::Json;

/// Resolve a capability to one provider
#[utoipa::path(
    post,
    path = "/api/route",
    request_body = RouteRequest,
    responses(
        (status = 200, description = "Routing decision", body = RouteResponse),
        (status = 404, description = "No active provider for the capability")
    ),
    tag = "routing"
)]
pub async fn resolve(
    State(state): State<AppState>,
    Json(payload): Json<RouteRequest>,
) -> Result<Json<RouteResponse>> {
    let selection = state.router.resolve(
        &payload.capability,
        payload.strategy,
        &payload.constraints,
    )?;

    Ok(Json(RouteResponse {
        provider_id: selection.registration.provider_id,
        capability: selection.registration.capability,
        priority: selection.registration.priority,
        reason: selection.reason,
        score: selection.score,
    }))
}
