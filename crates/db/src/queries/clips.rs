use crate::models::{Clip, NewClip};
use sqlx::PgPool;

/// Create or update a clip by external id.
pub async fn upsert(pool: &PgPool, clip: &NewClip<'_>) -> Result<Clip, sqlx::Error> {
    sqlx::query_as::<_, Clip>(
        r#"
        INSERT INTO clips
            (external_id, url, embed_url, account_id, category_id, title,
             view_count, created_at, thumbnail_url, duration, vod_offset)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (external_id) DO UPDATE
        SET url = EXCLUDED.url,
            embed_url = EXCLUDED.embed_url,
            account_id = EXCLUDED.account_id,
            category_id = EXCLUDED.category_id,
            title = EXCLUDED.title,
            view_count = EXCLUDED.view_count,
            created_at = EXCLUDED.created_at,
            thumbnail_url = EXCLUDED.thumbnail_url,
            duration = EXCLUDED.duration,
            vod_offset = EXCLUDED.vod_offset
        RETURNING id, external_id, url, embed_url, account_id, category_id, title,
                  view_count, created_at, thumbnail_url, duration, vod_offset
        "#,
    )
    .bind(clip.external_id)
    .bind(clip.url)
    .bind(clip.embed_url)
    .bind(clip.account_id)
    .bind(clip.category_id)
    .bind(clip.title)
    .bind(clip.view_count)
    .bind(clip.created_at)
    .bind(clip.thumbnail_url)
    .bind(clip.duration)
    .bind(clip.vod_offset)
    .fetch_one(pool)
    .await
}

pub async fn get_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<Clip>, sqlx::Error> {
    sqlx::query_as::<_, Clip>(
        r#"
        SELECT id, external_id, url, embed_url, account_id, category_id, title,
               view_count, created_at, thumbnail_url, duration, vod_offset
        FROM clips
        WHERE external_id = $1
        "#,
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await
}

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clips")
        .fetch_one(pool)
        .await
}
