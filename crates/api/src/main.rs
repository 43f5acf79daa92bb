use anyhow::Context;
use api::state::AppState;
use common::config::Settings;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env().context("loading configuration")?;

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await?;
    db::MIGRATOR.run(&db).await?;

    let state = AppState {
        db,
        row_limit: settings.report_row_limit,
        app_env: settings.app_env.clone(),
    };

    let addr: SocketAddr = settings
        .api_bind
        .parse()
        .with_context(|| format!("invalid API_BIND {}", settings.api_bind))?;

    info!(%addr, env = %settings.app_env, "starting api");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, api::app(state)).await?;

    Ok(())
}
