use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::url_record::{Result, UrlRecordRepositoryTrait};
use crate::errors::RepositoryError;
use crate::models::UrlRecord;

/// Process-local store for development and tests.
///
/// Inserts go through DashMap's entry API, so the uniqueness check and the
/// write happen under the same shard lock, the same guarantee the unique index
/// gives in Postgres.
#[derive(Debug, Default)]
pub struct InMemoryUrlRecordRepository {
    records: DashMap<String, UrlRecord>,
    next_id: AtomicI64,
}

impl InMemoryUrlRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl UrlRecordRepositoryTrait for InMemoryUrlRecordRepository {
    async fn exists(&self, short_code: &str) -> Result<bool> {
        Ok(self.records.contains_key(short_code))
    }

    async fn insert(&self, short_code: &str, original_url: &str) -> Result<UrlRecord> {
        match self.records.entry(short_code.to_string()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "Short code '{}' already exists",
                short_code
            ))),
            Entry::Vacant(slot) => {
                let record = UrlRecord {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
                    short_code: short_code.to_string(),
                    original_url: original_url.to_string(),
                    created_at: Utc::now(),
                    clicks: 0,
                };
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn find_by_code(&self, short_code: &str) -> Result<Option<UrlRecord>> {
        Ok(self.records.get(short_code).map(|r| r.value().clone()))
    }

    async fn increment_clicks(&self, short_code: &str) -> Result<bool> {
        match self.records.get_mut(short_code) {
            Some(mut record) => {
                record.clicks += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
