use crate::AppState;
use axum::routing::{get, post};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the full API router.
pub fn create_router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/api/registry",
            post(crate::api::handlers::registry::register)
                .get(crate::api::handlers::registry::export),
        )
        .route(
            "/api/registry/import",
            post(crate::api::handlers::registry::import),
        )
        .route(
            "/api/registry/{capability}",
            get(crate::api::handlers::registry::lookup),
        )
        .route(
            "/api/registry/{provider_id}/{capability}",
            axum::routing::delete(crate::api::handlers::registry::unregister),
        )
        .route("/api/route", post(crate::api::handlers::routing::resolve))
        .route(
            "/api/messages",
            post(crate::api::handlers::messages::submit),
        )
        .route(
            "/api/conversations",
            get(crate::api::handlers::conversations::list),
        )
        .route(
            "/api/conversations/{id}",
            get(crate::api::handlers::conversations::get_conversation),
        )
        .route("/api/health", get(crate::api::handlers::health::liveness))
        .route(
            "/api/providers/health",
            get(crate::api::handlers::health::providers),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
