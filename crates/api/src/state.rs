use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Upper bound on rows returned by one report.
    pub row_limit: u64,
    pub app_env: String,
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);
