use crate::registry::RegistrySnapshot;
use crate::types::{CapabilityRegistration, RegisterRequest, Result};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

/// Query parameters for capability lookups.
#[derive(Debug, Deserialize)]
pub struct LookupParams {
    /// Include unhealthy/draining/inactive registrations
    #[serde(default)]
    pub include_unhealthy: bool,
}

/// Register a provider for a capability
#[utoipa::path(
    post,
    path = "/api/registry",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration created", body = CapabilityRegistration),
        (status = 409, description = "Active registration already exists"),
        (status = 400, description = "Invalid registration")
    ),
    tag = "registry"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<CapabilityRegistration>)> {
    let registration =
        CapabilityRegistration::new(&payload.provider_id, &payload.capability, payload.priority)?
            .with_metadata(payload.metadata);
    state.registry.register(registration.clone())?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// Remove a provider's registration for a capability
#[utoipa::path(
    delete,
    path = "/api/registry/{provider_id}/{capability}",
    responses(
        (status = 204, description = "Registration removed"),
        (status = 404, description = "No such registration")
    ),
    tag = "registry"
)]
pub async fn unregister(
    State(state): State<AppState>,
    Path((provider_id, capability)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.registry.unregister(&provider_id, &capability)?;
    Ok(StatusCode::NO_CONTENT)
}

/// List registrations for a capability
#[utoipa::path(
    get,
    path = "/api/registry/{capability}",
    responses(
        (status = 200, description = "Registrations in registration order", body = [CapabilityRegistration])
    ),
    tag = "registry"
)]
pub async fn lookup(
    State(state): State<AppState>,
    Path(capability): Path<String>,
    Query(params): Query<LookupParams>,
) -> Result<Json<Vec<CapabilityRegistration>>> {
    Ok(Json(
        state.registry.lookup(&capability, params.include_unhealthy),
    ))
}

/// Export the full registry state
#[utoipa::path(
    get,
    path = "/api/registry",
    responses((status = 200, description = "Full registry snapshot")),
    tag = "registry"
)]
pub async fn export(State(state): State<AppState>) -> Result<Json<RegistrySnapshot>> {
    Ok(Json(state.registry.export()))
}

/// Import a registry snapshot
#[utoipa::path(
    post,
    path = "/api/registry/import",
    responses(
        (status = 200, description = "Number of registrations imported"),
        (status = 409, description = "Conflicting active registration")
    ),
    tag = "registry"
)]
pub async fn import(
    State(state): State<AppState>,
    Json(snapshot): Json<RegistrySnapshot>,
) -> Result<Json<serde_json::Value>> {
    let imported = state.registry.import(snapshot)?;
    Ok(Json(serde_json::json!({ "imported": imported })))
}
