// src/repositories/url_record.rs - Data access
use async_trait::async_trait;
use log::{debug, error};
use sqlx::PgPool;

#[cfg(test)]
use mockall::automock;

use crate::db::Database;
use crate::errors::RepositoryError;
use crate::models::UrlRecord;

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait UrlRecordRepositoryTrait: Send + Sync + 'static {
    /// Checks whether a short code is already taken
    ///
    /// ### Errors
    /// * `RepositoryError::Database` - If a database error occurs
    async fn exists(&self, short_code: &str) -> Result<bool>;

    /// Inserts a new mapping and returns the stored record
    ///
    /// ### Arguments
    /// * `short_code` - The candidate code, must not be taken yet
    /// * `original_url` - The already validated target URL
    ///
    /// ### Errors
    /// * `RepositoryError::Conflict` - If the code is taken, enforced by the store itself
    /// * `RepositoryError::Database` - If a database error occurs
    async fn insert(&self, short_code: &str, original_url: &str) -> Result<UrlRecord>;

    /// Finds a record by its short code
    ///
    /// ### Returns
    /// * `Result<Option<UrlRecord>>` - The record if found, or `None` if not found
    ///
    /// ### Errors
    /// * `RepositoryError::Database` - If a database error occurs
    /// * `RepositoryError::InvalidData` - If the database row cannot be mapped to a record
    async fn find_by_code(&self, short_code: &str) -> Result<Option<UrlRecord>>;

    /// Adds one to the click counter of a record
    ///
    /// ### Returns
    /// * `Result<bool>` - `false` if no record has that code
    async fn increment_clicks(&self, short_code: &str) -> Result<bool>;
}

// Implementation using actual database
pub struct UrlRecordRepository {
    pool: PgPool,
}

impl UrlRecordRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.get_pool().clone(),
        }
    }
}

#[async_trait]
impl UrlRecordRepositoryTrait for UrlRecordRepository {
    async fn exists(&self, short_code: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM urls WHERE short_code = $1)")
            .bind(short_code)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)
    }

    async fn insert(&self, short_code: &str, original_url: &str) -> Result<UrlRecord> {
        sqlx::query_as::<_, UrlRecord>(
            r#"
                INSERT INTO urls (short_code, original_url)
                VALUES ($1, $2)
                RETURNING id, short_code, original_url, created_at, clicks
            "#,
        )
        .bind(short_code)
        .bind(original_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let err = RepositoryError::from(e);
            if err.is_conflict() {
                debug!("Short code '{}' already taken at insert", short_code);
            } else {
                error!("Failed to insert URL record: {}", err);
            }
            err
        })
    }

    async fn find_by_code(&self, short_code: &str) -> Result<Option<UrlRecord>> {
        sqlx::query_as::<_, UrlRecord>(
            r#"
                SELECT id, short_code, original_url, created_at, clicks
                FROM urls
                WHERE short_code = $1
            "#,
        )
        .bind(short_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)
    }

    async fn increment_clicks(&self, short_code: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE urls SET clicks = clicks + 1 WHERE short_code = $1")
            .bind(short_code)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
