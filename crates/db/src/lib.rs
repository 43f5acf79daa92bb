pub mod models;
pub mod queries;

/// Embedded schema migrations for the ingestion store.
///
/// Use in tests with `#[sqlx::test(migrator = "db::MIGRATOR")]`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
