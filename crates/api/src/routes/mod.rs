pub mod health;
pub mod reports;

use axum::Router;

use crate::state::AppState;

pub fn v1_router(state: AppState) -> Router {
    reports::router(state)
}

pub fn health_router(state: AppState) -> Router {
    health::router(state)
}
