//! Re-ingesting the same Helix payloads must not duplicate anything.
//!
//! Needs PostgreSQL: `DATABASE_URL=... cargo test -p etl -- --ignored`.

use common::types::{HelixClip, HelixGame, HelixPage, HelixStream, HelixUser};
use db::queries::{accounts, categories, clips, sessions};
use etl::pipeline::{self, StageReport};
use serde::de::DeserializeOwned;
use sqlx::PgPool;

fn fixture<T: DeserializeOwned>(json: &str) -> Vec<T> {
    serde_json::from_str::<HelixPage<T>>(json).unwrap().data
}

struct Payloads {
    games: Vec<HelixGame>,
    users: Vec<HelixUser>,
    streams: Vec<HelixStream>,
    clips: Vec<HelixClip>,
}

fn payloads() -> Payloads {
    Payloads {
        games: fixture(include_str!("fixtures/games.json")),
        users: fixture(include_str!("fixtures/users.json")),
        streams: fixture(include_str!("fixtures/streams.json")),
        clips: fixture(include_str!("fixtures/clips.json")),
    }
}

async fn ingest(pool: &PgPool, p: &Payloads) -> [StageReport; 4] {
    [
        pipeline::store_categories(pool, &p.games).await.unwrap(),
        pipeline::store_accounts(pool, &p.users).await.unwrap(),
        pipeline::store_sessions(pool, &p.streams).await.unwrap(),
        pipeline::store_clips(pool, &p.clips).await.unwrap(),
    ]
}

async fn counts(pool: &PgPool) -> (i64, i64, i64, i64) {
    (
        categories::count(pool).await.unwrap(),
        accounts::count(pool).await.unwrap(),
        sessions::count(pool).await.unwrap(),
        clips::count(pool).await.unwrap(),
    )
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test(migrator = "db::MIGRATOR")]
async fn test_ingesting_twice_does_not_duplicate(pool: PgPool) {
    let p = payloads();

    let first = ingest(&pool, &p).await;
    let after_first = counts(&pool).await;
    // Two top games, plus one category referenced only by a session and one only by a clip.
    assert_eq!(after_first, (4, 2, 2, 1));

    let second = ingest(&pool, &p).await;
    assert_eq!(counts(&pool).await, after_first);
    assert_eq!(first, second);
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test(migrator = "db::MIGRATOR")]
async fn test_records_without_owner_are_skipped(pool: PgPool) {
    let p = payloads();
    let [_, _, sessions_report, clips_report] = ingest(&pool, &p).await;

    assert_eq!(sessions_report, StageReport { processed: 2, skipped: 1 });
    assert_eq!(clips_report, StageReport { processed: 1, skipped: 1 });
    assert!(sessions::get_by_external_id(&pool, "40952121087")
        .await
        .unwrap()
        .is_none());
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test(migrator = "db::MIGRATOR")]
async fn test_referenced_categories_are_created_with_fallback_names(pool: PgPool) {
    let p = payloads();
    ingest(&pool, &p).await;

    let from_session = categories::get_by_external_id(&pool, "32982")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from_session.name, "Grand Theft Auto V");

    let from_clip = categories::get_by_external_id(&pool, "488191")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from_clip.name, "Unknown Game");

    let just_chatting = categories::get_by_external_id(&pool, "509658")
        .await
        .unwrap()
        .unwrap();
    assert!(just_chatting.igdb_id.is_none());

    let session = sessions::get_by_external_id(&pool, "40952121086")
        .await
        .unwrap()
        .unwrap();
    assert!(session.category_id.is_none());
    assert!(session.tag_ids.is_empty());
}

#[ignore = "requires DATABASE_URL"]
#[sqlx::test(migrator = "db::MIGRATOR")]
async fn test_refetch_updates_mutable_fields(pool: PgPool) {
    let mut p = payloads();
    ingest(&pool, &p).await;

    p.streams[0].viewer_count = 2000;
    p.streams[0].title = "new title".to_string();
    ingest(&pool, &p).await;

    let session = sessions::get_by_external_id(&pool, "40952121085")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.viewer_count, 2000);
    assert_eq!(session.title, "new title");
    assert_eq!(sessions::count(&pool).await.unwrap(), 2);
}
