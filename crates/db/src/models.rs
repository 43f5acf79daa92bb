use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub box_art_url: Option<String>,
    pub igdb_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub external_id: String,
    pub login: String,
    pub display_name: String,
    pub account_type: String,
    pub broadcaster_type: String,
    pub description: String,
    pub profile_image_url: String,
    pub offline_image_url: String,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: i64,
    pub external_id: String,
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub viewer_count: i64,
    pub started_at: DateTime<Utc>,
    pub language: String,
    pub thumbnail_url: String,
    pub tag_ids: Vec<String>,
    pub is_mature: bool,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Clip {
    pub id: i64,
    pub external_id: String,
    pub url: String,
    pub embed_url: String,
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub thumbnail_url: String,
    pub duration: f64,
    pub vod_offset: Option<i64>,
}

/// Upsert input for [`Category`], keyed by `external_id`.
#[derive(Debug, Clone)]
pub struct NewCategory<'a> {
    pub external_id: &'a str,
    pub name: &'a str,
    pub box_art_url: Option<&'a str>,
    pub igdb_id: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub external_id: &'a str,
    pub login: &'a str,
    pub display_name: &'a str,
    pub account_type: &'a str,
    pub broadcaster_type: &'a str,
    pub description: &'a str,
    pub profile_image_url: &'a str,
    pub offline_image_url: &'a str,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSession<'a> {
    pub external_id: &'a str,
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub title: &'a str,
    pub viewer_count: i64,
    pub started_at: DateTime<Utc>,
    pub language: &'a str,
    pub thumbnail_url: &'a str,
    pub tag_ids: &'a [String],
    pub is_mature: bool,
}

#[derive(Debug, Clone)]
pub struct NewClip<'a> {
    pub external_id: &'a str,
    pub url: &'a str,
    pub embed_url: &'a str,
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub title: &'a str,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub thumbnail_url: &'a str,
    pub duration: f64,
    pub vod_offset: Option<i64>,
}
