use axum::{extract::State, routing::get, Extension, Json, Router};
use serde::Serialize;
use tracing::error;

use crate::error::{ApiResult, AppError};
use crate::state::{AppState, RequestId};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    env: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Json<HealthResponse>> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .map_err(|err| {
            error!(error = %err, "database health check failed");
            AppError::Internal.with_request_id(&request_id.0)
        })?;

    Ok(Json(HealthResponse {
        status: "ok",
        env: state.app_env,
    }))
}
