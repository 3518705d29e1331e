use axum::{extract::State, Json};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;

/// Known tables and the summary the planner is given
pub async fn get_catalog(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let catalog = state.sessions.pipeline().catalog();
    let tables = catalog.list_tables().await?;
    let summary = catalog.describe_all_tables().await?;

    Ok(Json(serde_json::json!({
        "tables": tables,
        "summary": summary,
    })))
}

/// Drop the cached table list and reload it from the data store
pub async fn refresh_catalog(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let catalog = state.sessions.pipeline().catalog();
    catalog.invalidate().await;
    let tables = catalog.list_tables().await?;

    Ok(Json(serde_json::json!({
        "tables": tables.len(),
    })))
}

/// Liveness plus a data store round trip
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let datastore = match state.adapter.test_connection().await {
        Ok(()) => "connected".to_string(),
        Err(e) => {
            tracing::warn!("Health check could not reach the data store: {}", e);
            format!("unreachable: {}", e)
        }
    };
    let pool = state
        .pool_manager
        .pool_status(&state.config.datastore.url)
        .await;

    Json(serde_json::json!({
        "status": "ok",
        "datastore": datastore,
        "database_type": state.adapter.database_type().as_str(),
        "pool": pool,
    }))
}
