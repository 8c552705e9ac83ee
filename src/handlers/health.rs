use crate::db::DbPool;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;

pub trait HealthHandlerState: Clone + Send + Sync + 'static {
    fn db_pool(&self) -> &Arc<DbPool>;
}

pub fn health_router<S>() -> Router<S>
where
    S: HealthHandlerState,
{
    Router::new().route("/health", get(health::<S>))
}

/// Liveness plus a database round trip.
pub async fn health<S>(State(state): State<S>) -> impl IntoResponse
where
    S: HealthHandlerState,
{
    match crate::db::check_connection(state.db_pool().as_ref()).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "up" })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": e.to_string() })),
        ),
    }
}
