use crate::types::{ProviderHealth, Result};
use crate::AppState;
use axum::extract::State;
use axum::Json;

/// Liveness check
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Server is up")),
    tag = "health"
)]
pub async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Status and performance snapshot of every registration
#[utoipa::path(
    get,
    path = "/api/providers/health",
    responses(
        (status = 200, description = "Per-registration health", body = [ProviderHealth])
    ),
    tag = "health"
)]
pub async fn providers(State(state): State<AppState>) -> Result<Json<Vec<ProviderHealth>>> {
    let providers = state
        .registry
        .all_registrations()
        .into_iter()
        .map(|registration| ProviderHealth {
            snapshot: state.health.snapshot(&registration.provider_id),
            provider_id: registration.provider_id,
            capability: registration.capability,
            status: registration.status,
        })
        .collect();
    Ok(Json(providers))
}
