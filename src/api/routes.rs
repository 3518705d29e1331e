use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{catalog, session, AppState};

/// Create router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(catalog::health_check))
        .route("/api/catalog", get(catalog::get_catalog))
        .route("/api/catalog/refresh", post(catalog::refresh_catalog))
        .route(
            "/api/sessions",
            get(session::list_sessions).post(session::create_session),
        )
        .route(
            "/api/sessions/{id}",
            delete(session::delete_session),
        )
        .route(
            "/api/sessions/{id}/turns",
            get(session::list_turns).post(session::create_turn),
        )
        .route(
            "/api/sessions/{id}/history",
            get(session::get_history).delete(session::clear_history),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
