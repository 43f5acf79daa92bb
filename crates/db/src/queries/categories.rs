//! Category (game) database operations.
//!
//! Categories are keyed by their Helix id (`external_id`). Sessions and clips
//! reference them by surrogate id and are nulled when a category is deleted.

use crate::models::{Category, NewCategory};
use sqlx::PgPool;

/// Create or update a category by external id.
pub async fn upsert(pool: &PgPool, category: &NewCategory<'_>) -> Result<Category, sqlx::Error> {
    sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (external_id, name, box_art_url, igdb_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (external_id) DO UPDATE
        SET name = EXCLUDED.name,
            box_art_url = EXCLUDED.box_art_url,
            igdb_id = EXCLUDED.igdb_id
        RETURNING id, external_id, name, box_art_url, igdb_id, created_at
        "#,
    )
    .bind(category.external_id)
    .bind(category.name)
    .bind(category.box_art_url)
    .bind(category.igdb_id)
    .fetch_one(pool)
    .await
}

/// Look up a category by external id, creating a placeholder if it is missing.
///
/// An existing row is returned untouched; `fallback_name` is only used on insert.
pub async fn get_or_create(
    pool: &PgPool,
    external_id: &str,
    fallback_name: &str,
) -> Result<Category, sqlx::Error> {
    let inserted = sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (external_id, name)
        VALUES ($1, $2)
        ON CONFLICT (external_id) DO NOTHING
        RETURNING id, external_id, name, box_art_url, igdb_id, created_at
        "#,
    )
    .bind(external_id)
    .bind(fallback_name)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(category) => Ok(category),
        None => get_by_external_id(pool, external_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound),
    }
}

pub async fn get_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(
        r#"
        SELECT id, external_id, name, box_art_url, igdb_id, created_at
        FROM categories
        WHERE external_id = $1
        "#,
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await
}

/// External ids of the most recently stored categories, newest first.
pub async fn list_external_ids(pool: &PgPool, limit: i64) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT external_id
        FROM categories
        ORDER BY created_at DESC, id DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories")
        .fetch_one(pool)
        .await
}

pub async fn delete_by_external_id(pool: &PgPool, external_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM categories WHERE external_id = $1")
        .bind(external_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
