//! Twitch Helix ingestion into the reporting database.

pub mod helix;
pub mod pipeline;
pub mod token;
