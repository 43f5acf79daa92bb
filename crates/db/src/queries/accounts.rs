use crate::models::{Account, NewAccount};
use sqlx::PgPool;

/// Create or update an account by external id.
pub async fn upsert(pool: &PgPool, account: &NewAccount<'_>) -> Result<Account, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts
            (external_id, login, display_name, account_type, broadcaster_type,
             description, profile_image_url, offline_image_url, view_count, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (external_id) DO UPDATE
        SET login = EXCLUDED.login,
            display_name = EXCLUDED.display_name,
            account_type = EXCLUDED.account_type,
            broadcaster_type = EXCLUDED.broadcaster_type,
            description = EXCLUDED.description,
            profile_image_url = EXCLUDED.profile_image_url,
            offline_image_url = EXCLUDED.offline_image_url,
            view_count = EXCLUDED.view_count,
            created_at = EXCLUDED.created_at
        RETURNING id, external_id, login, display_name, account_type, broadcaster_type,
                  description, profile_image_url, offline_image_url, view_count, created_at
        "#,
    )
    .bind(account.external_id)
    .bind(account.login)
    .bind(account.display_name)
    .bind(account.account_type)
    .bind(account.broadcaster_type)
    .bind(account.description)
    .bind(account.profile_image_url)
    .bind(account.offline_image_url)
    .bind(account.view_count)
    .bind(account.created_at)
    .fetch_one(pool)
    .await
}

pub async fn get_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"
        SELECT id, external_id, login, display_name, account_type, broadcaster_type,
               description, profile_image_url, offline_image_url, view_count, created_at
        FROM accounts
        WHERE external_id = $1
        "#,
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await
}

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accounts")
        .fetch_one(pool)
        .await
}

/// Delete an account; its sessions and clips go with it.
pub async fn delete_by_external_id(pool: &PgPool, external_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM accounts WHERE external_id = $1")
        .bind(external_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
