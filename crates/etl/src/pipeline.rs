//! Ingestion stages: fetch from Helix, normalize, upsert.
//!
//! The `store_*` functions only touch the database and are idempotent on
//! external id, so re-ingesting the same payload never duplicates rows.
//! The `extract_*` functions fetch first and then store.

use common::types::{HelixClip, HelixGame, HelixStream, HelixUser};
use db::models::{NewAccount, NewCategory, NewClip, NewSession};
use db::queries::{accounts, categories, clips, sessions};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::helix::{ClipWindow, HelixClient, HelixError};

const UNKNOWN_CATEGORY: &str = "Unknown";
const UNKNOWN_CLIP_CATEGORY: &str = "Unknown Game";
/// Categories sampled for clips when no game id is given.
const DEFAULT_CLIP_CATEGORIES: i64 = 10;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Helix(#[from] HelixError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub processed: usize,
    pub skipped: usize,
}

impl StageReport {
    fn log(self, stage: &str) -> Self {
        info!(stage, processed = self.processed, skipped = self.skipped, "stage complete");
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub limit: usize,
    pub game_ids: Vec<String>,
    pub clip_window: ClipWindow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub categories: StageReport,
    pub sessions: StageReport,
    pub clips: StageReport,
}

pub async fn store_categories(
    pool: &PgPool,
    games: &[HelixGame],
) -> Result<StageReport, sqlx::Error> {
    let mut report = StageReport::default();
    for game in games {
        categories::upsert(
            pool,
            &NewCategory {
                external_id: &game.id,
                name: &game.name,
                box_art_url: non_empty(game.box_art_url.as_deref()),
                igdb_id: non_empty(game.igdb_id.as_deref()),
            },
        )
        .await?;
        report.processed += 1;
    }
    Ok(report)
}

pub async fn store_accounts(pool: &PgPool, users: &[HelixUser]) -> Result<StageReport, sqlx::Error> {
    let mut report = StageReport::default();
    for user in users {
        accounts::upsert(
            pool,
            &NewAccount {
                external_id: &user.id,
                login: &user.login,
                display_name: &user.display_name,
                account_type: &user.account_type,
                broadcaster_type: &user.broadcaster_type,
                description: &user.description,
                profile_image_url: &user.profile_image_url,
                offline_image_url: &user.offline_image_url,
                view_count: user.view_count,
                created_at: user.created_at,
            },
        )
        .await?;
        report.processed += 1;
    }
    Ok(report)
}

/// Store live sessions. Sessions whose owner account is not stored are skipped.
pub async fn store_sessions(
    pool: &PgPool,
    streams: &[HelixStream],
) -> Result<StageReport, sqlx::Error> {
    let mut report = StageReport::default();
    for stream in streams {
        let Some(account) = accounts::get_by_external_id(pool, &stream.user_id).await? else {
            warn!(session = %stream.id, account = %stream.user_id, "owner account not found, skipping session");
            report.skipped += 1;
            continue;
        };

        let category_id = match stream.game_id.as_str() {
            "" => None,
            game_id => {
                let fallback = non_empty(Some(&stream.game_name)).unwrap_or(UNKNOWN_CATEGORY);
                Some(categories::get_or_create(pool, game_id, fallback).await?.id)
            }
        };

        let tag_ids = stream.tag_ids.clone().unwrap_or_default();
        sessions::upsert(
            pool,
            &NewSession {
                external_id: &stream.id,
                account_id: account.id,
                category_id,
                title: &stream.title,
                viewer_count: stream.viewer_count,
                started_at: stream.started_at,
                language: &stream.language,
                thumbnail_url: &stream.thumbnail_url,
                tag_ids: &tag_ids,
                is_mature: stream.is_mature,
            },
        )
        .await?;
        report.processed += 1;
    }
    Ok(report)
}

/// Store clips. Clips whose broadcaster account is not stored are skipped.
pub async fn store_clips(pool: &PgPool, items: &[HelixClip]) -> Result<StageReport, sqlx::Error> {
    let mut report = StageReport::default();
    for clip in items {
        let Some(account) = accounts::get_by_external_id(pool, &clip.broadcaster_id).await? else {
            warn!(clip = %clip.id, account = %clip.broadcaster_id, "broadcaster account not found, skipping clip");
            report.skipped += 1;
            continue;
        };

        let category_id = match clip.game_id.as_str() {
            "" => None,
            game_id => Some(
                categories::get_or_create(pool, game_id, UNKNOWN_CLIP_CATEGORY)
                    .await?
                    .id,
            ),
        };

        clips::upsert(
            pool,
            &NewClip {
                external_id: &clip.id,
                url: &clip.url,
                embed_url: &clip.embed_url,
                account_id: account.id,
                category_id,
                title: &clip.title,
                view_count: clip.view_count,
                created_at: clip.created_at,
                thumbnail_url: &clip.thumbnail_url,
                duration: clip.duration,
                vod_offset: clip.vod_offset,
            },
        )
        .await?;
        report.processed += 1;
    }
    Ok(report)
}

pub async fn extract_categories(
    pool: &PgPool,
    helix: &mut HelixClient,
    limit: usize,
) -> Result<StageReport, PipelineError> {
    let games = helix.top_games(limit).await?;
    Ok(store_categories(pool, &games).await?.log("categories"))
}

pub async fn extract_accounts_by_ids(
    pool: &PgPool,
    helix: &mut HelixClient,
    ids: &[String],
) -> Result<StageReport, PipelineError> {
    let users = helix.users_by_ids(ids).await?;
    Ok(store_accounts(pool, &users).await?.log("accounts"))
}

/// Fetch live sessions, then their owner accounts, then store the sessions.
pub async fn extract_sessions(
    pool: &PgPool,
    helix: &mut HelixClient,
    options: &ExtractOptions,
) -> Result<StageReport, PipelineError> {
    let streams = helix.streams(options.limit, &options.game_ids).await?;
    let owners = unique_ids(streams.iter().map(|s| s.user_id.as_str()));
    extract_accounts_by_ids(pool, helix, &owners).await?;
    Ok(store_sessions(pool, &streams).await?.log("sessions"))
}

/// Fetch clips per category, then their broadcaster accounts, then store the clips.
///
/// Helix only lists clips for a broadcaster or a game, so without explicit
/// game ids the most recently stored categories are used.
pub async fn extract_clips(
    pool: &PgPool,
    helix: &mut HelixClient,
    options: &ExtractOptions,
) -> Result<StageReport, PipelineError> {
    let game_ids = if options.game_ids.is_empty() {
        categories::list_external_ids(pool, DEFAULT_CLIP_CATEGORIES).await?
    } else {
        options.game_ids.clone()
    };
    if game_ids.is_empty() {
        warn!("no categories stored, nothing to fetch clips for");
    }

    let mut fetched = Vec::new();
    for game_id in &game_ids {
        fetched.extend(helix.clips(game_id, options.limit, options.clip_window).await?);
    }

    let broadcasters = unique_ids(fetched.iter().map(|c| c.broadcaster_id.as_str()));
    extract_accounts_by_ids(pool, helix, &broadcasters).await?;
    Ok(store_clips(pool, &fetched).await?.log("clips"))
}

pub async fn run_full(
    pool: &PgPool,
    helix: &mut HelixClient,
    options: &ExtractOptions,
) -> Result<RunSummary, PipelineError> {
    let categories = extract_categories(pool, helix, options.limit).await?;
    let sessions = extract_sessions(pool, helix, options).await?;
    let clips = extract_clips(pool, helix, options).await?;
    Ok(RunSummary {
        categories,
        sessions,
        clips,
    })
}

/// Distinct ids in first-seen order.
fn unique_ids<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for id in ids {
        if !id.is_empty() && !unique.iter().any(|seen| seen == id) {
            unique.push(id.to_string());
        }
    }
    unique
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ids_preserve_first_seen_order() {
        let ids = unique_ids(["b", "a", "b", "", "c", "a"].into_iter());
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("x")), Some("x"));
        assert_eq!(non_empty(Some("")), None);
        assert_eq!(non_empty(None), None);
    }
}
