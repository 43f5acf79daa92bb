//! Live session (stream) database operations.

use crate::models::{NewSession, Session};
use sqlx::PgPool;

/// Create or update a session by external id.
///
/// The owning account must already exist; callers resolve `account_id` first.
pub async fn upsert(pool: &PgPool, session: &NewSession<'_>) -> Result<Session, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO sessions
            (external_id, account_id, category_id, title, viewer_count, started_at,
             language, thumbnail_url, tag_ids, is_mature)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (external_id) DO UPDATE
        SET account_id = EXCLUDED.account_id,
            category_id = EXCLUDED.category_id,
            title = EXCLUDED.title,
            viewer_count = EXCLUDED.viewer_count,
            started_at = EXCLUDED.started_at,
            language = EXCLUDED.language,
            thumbnail_url = EXCLUDED.thumbnail_url,
            tag_ids = EXCLUDED.tag_ids,
            is_mature = EXCLUDED.is_mature
        RETURNING id, external_id, account_id, category_id, title, viewer_count, started_at,
                  language, thumbnail_url, tag_ids, is_mature, collected_at
        "#,
    )
    .bind(session.external_id)
    .bind(session.account_id)
    .bind(session.category_id)
    .bind(session.title)
    .bind(session.viewer_count)
    .bind(session.started_at)
    .bind(session.language)
    .bind(session.thumbnail_url)
    .bind(session.tag_ids)
    .bind(session.is_mature)
    .fetch_one(pool)
    .await
}

pub async fn get_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        SELECT id, external_id, account_id, category_id, title, viewer_count, started_at,
               language, thumbnail_url, tag_ids, is_mature, collected_at
        FROM sessions
        WHERE external_id = $1
        "#,
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_by_account(pool: &PgPool, account_id: i64) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        SELECT id, external_id, account_id, category_id, title, viewer_count, started_at,
               language, thumbnail_url, tag_ids, is_mature, collected_at
        FROM sessions
        WHERE account_id = $1
        ORDER BY started_at DESC
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
}

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions")
        .fetch_one(pool)
        .await
}
