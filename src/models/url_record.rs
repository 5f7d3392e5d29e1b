// src/models/url_record.rs - Pure data structures
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::validations::validate_url;

/// Body of `POST /api/shorten`
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ShortenRequestDto {
    #[validate(
        required(message = "url is required"),
        custom(function = "validate_url")
    )]
    pub url: Option<String>,
}

/// A stored short code mapping, as owned by the persistent store
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Internal auto-incrementing identifier
    pub id: i64,

    /// Fixed-length code over the base62 alphabet
    pub short_code: String,

    /// The original, long URL that was shortened
    pub original_url: String,

    /// When this mapping was created; never changes afterwards
    pub created_at: DateTime<Utc>,

    /// Number of recorded redirects; only ever goes up
    pub clicks: i64,
}

/// Response of `POST /api/shorten`
#[derive(Debug, Serialize, Deserialize)]
pub struct ShortenResponseDto {
    pub original_url: String,
    pub short_url: String,
    pub short_code: String,
}

impl ShortenResponseDto {
    pub fn from_record(record: UrlRecord, base_url: &str) -> Self {
        Self {
            short_url: format!("{}/{}", base_url.trim_end_matches('/'), record.short_code),
            original_url: record.original_url,
            short_code: record.short_code,
        }
    }
}

/// Response of `GET /api/stats/{short_code}`
#[derive(Debug, Serialize, Deserialize)]
pub struct UrlStatsDto {
    pub short_code: String,
    pub original_url: String,
    pub created_at: DateTime<Utc>,
    pub clicks: i64,
}

impl From<UrlRecord> for UrlStatsDto {
    fn from(record: UrlRecord) -> Self {
        UrlStatsDto {
            short_code: record.short_code,
            original_url: record.original_url,
            created_at: record.created_at,
            clicks: record.clicks,
        }
    }
}
