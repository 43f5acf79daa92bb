use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use common::config::Settings;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use etl::helix::{ClipWindow, HelixClient};
use etl::pipeline::{self, ExtractOptions};

#[derive(Debug, Parser)]
#[command(name = "etl")]
#[command(about = "Ingest Twitch Helix data into PostgreSQL", version)]
struct Args {
    /// Only ingest top categories
    #[arg(long, conflicts_with_all = ["sessions_only", "clips_only"])]
    categories_only: bool,
    /// Only ingest live sessions and their accounts
    #[arg(long, conflicts_with = "clips_only")]
    sessions_only: bool,
    /// Only ingest clips and their accounts
    #[arg(long)]
    clips_only: bool,
    /// Items fetched per stage (and per category for clips)
    #[arg(long)]
    limit: Option<usize>,
    /// Restrict sessions and clips to these category ids
    #[arg(long = "game-id")]
    game_ids: Vec<String>,
    /// Earliest clip creation time (RFC 3339)
    #[arg(long)]
    started_at: Option<DateTime<Utc>>,
    /// Latest clip creation time (RFC 3339)
    #[arg(long)]
    ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Full,
    Categories,
    Sessions,
    Clips,
}

impl Args {
    fn stage(&self) -> Stage {
        if self.categories_only {
            Stage::Categories
        } else if self.sessions_only {
            Stage::Sessions
        } else if self.clips_only {
            Stage::Clips
        } else {
            Stage::Full
        }
    }

    fn options(&self, default_limit: usize) -> ExtractOptions {
        ExtractOptions {
            limit: self.limit.unwrap_or(default_limit),
            game_ids: self.game_ids.clone(),
            clip_window: ClipWindow {
                started_at: self.started_at,
                ended_at: self.ended_at,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let args = Args::parse();
    let settings = Settings::from_env_with_twitch()
        .context("TWITCH_CLIENT_ID, TWITCH_CLIENT_SECRET and DATABASE_URL (or DB_PASSWORD) must be set")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;
    db::MIGRATOR.run(&pool).await?;

    let mut helix = HelixClient::new(&settings)?;
    let options = args.options(settings.etl_page_limit);
    let stage = args.stage();
    info!(?stage, limit = options.limit, "starting etl");

    match stage {
        Stage::Full => {
            let summary = pipeline::run_full(&pool, &mut helix, &options).await?;
            info!(
                categories = summary.categories.processed,
                sessions = summary.sessions.processed,
                clips = summary.clips.processed,
                skipped = summary.sessions.skipped + summary.clips.skipped,
                "etl finished"
            );
        }
        Stage::Categories => {
            pipeline::extract_categories(&pool, &mut helix, options.limit).await?;
        }
        Stage::Sessions => {
            pipeline::extract_sessions(&pool, &mut helix, &options).await?;
        }
        Stage::Clips => {
            pipeline::extract_clips(&pool, &mut helix, &options).await?;
        }
    }

    Ok(())
}
