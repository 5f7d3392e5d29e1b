// src/services/url_service.rs - Business logic
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use validator::Validate;

use crate::cache::AcceleratorCache;
use crate::config::Config;
use crate::errors::{RepositoryError, ServiceError};
use crate::models::{ShortenRequestDto, ShortenResponseDto, UrlRecord, UrlStatsDto};
use crate::repositories::{RepositoryResult, UrlRecordRepositoryTrait};
use crate::services::ClickAccumulator;
use crate::utils::{CodeGenerator, RandomCodeGenerator};
use crate::validations::is_short_code_shaped;

type Result<T> = std::result::Result<T, ServiceError>;

#[async_trait]
pub trait UrlServiceTrait {
    /// Validates the request and allocates a fresh short code for it.
    async fn shorten(&self, dto: ShortenRequestDto) -> Result<ShortenResponseDto>;

    /// Stores `original_url` under a code that was unused at insert time.
    async fn allocate(&self, original_url: &str) -> Result<UrlRecord>;

    /// Cache first, then the store. Does not count a click.
    async fn resolve(&self, short_code: &str) -> Result<String>;

    /// Resolves and schedules a click without waiting for it.
    async fn redirect(&self, short_code: &str) -> Result<String>;

    /// Reads the authoritative record, including the current click count.
    async fn stats(&self, short_code: &str) -> Result<UrlStatsDto>;
}

/// Tunables of the allocation and lookup paths
#[derive(Debug, Clone)]
pub struct ShortenerOptions {
    /// Prefix of the `short_url` returned to callers
    pub base_url: String,
    /// Upper bound of generate/check/insert rounds per allocation
    pub max_attempts: usize,
    /// Deadline of each store call made on behalf of a request
    pub store_timeout: Duration,
}

impl Default for ShortenerOptions {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            max_attempts: 10,
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// One worker's request-handling stack: generator, store, cache and click
/// accounting.
pub struct UrlService {
    repository: Arc<dyn UrlRecordRepositoryTrait>,
    generator: Arc<dyn CodeGenerator>,
    cache: AcceleratorCache,
    clicks: ClickAccumulator,
    options: ShortenerOptions,
}

impl UrlService {
    pub fn new(
        repository: Arc<dyn UrlRecordRepositoryTrait>,
        generator: Arc<dyn CodeGenerator>,
        cache: AcceleratorCache,
        options: ShortenerOptions,
    ) -> Self {
        let clicks = ClickAccumulator::new(Arc::clone(&repository), options.store_timeout);
        Self {
            repository,
            generator,
            cache,
            clicks,
            options,
        }
    }

    /// Builds the stack the way a worker runs it: random codes and a fresh,
    /// empty cache.
    pub fn from_config(repository: Arc<dyn UrlRecordRepositoryTrait>, config: &Config) -> Self {
        Self::new(
            repository,
            Arc::new(RandomCodeGenerator::new(config.shortener.code_length)),
            AcceleratorCache::new(config.cache.capacity),
            ShortenerOptions {
                base_url: config.app.base_url.clone(),
                max_attempts: config.shortener.max_attempts,
                store_timeout: config.shortener.store_timeout(),
            },
        )
    }

    pub fn cache(&self) -> &AcceleratorCache {
        &self.cache
    }

    pub fn clicks(&self) -> &ClickAccumulator {
        &self.clicks
    }

    /// Runs a store call under the request deadline. Running out of time is a
    /// store failure, never a "not found".
    async fn within_deadline<T, F>(&self, operation: &str, call: F) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>> + Send,
    {
        match tokio::time::timeout(self.options.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout(format!(
                "{} exceeded {:?}",
                operation, self.options.store_timeout
            ))),
        }
    }

    async fn lookup(&self, short_code: &str) -> Result<String> {
        if !is_short_code_shaped(short_code) {
            return Err(ServiceError::NotFound(format!(
                "No URL for short code '{}'",
                short_code
            )));
        }

        if let Some(url) = self.cache.get(short_code) {
            debug!("Cache hit for '{}'", short_code);
            return Ok(url);
        }

        let record = self
            .within_deadline("find_by_code", self.repository.find_by_code(short_code))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No URL for short code '{}'", short_code)))?;

        self.cache.put(record.short_code, record.original_url.clone());
        Ok(record.original_url)
    }
}

#[async_trait]
impl UrlServiceTrait for UrlService {
    async fn shorten(&self, dto: ShortenRequestDto) -> Result<ShortenResponseDto> {
        dto.validate()?;

        let original_url = dto.url.unwrap_or_default();
        let record = self.allocate(original_url.trim()).await?;

        Ok(ShortenResponseDto::from_record(record, &self.options.base_url))
    }

    async fn allocate(&self, original_url: &str) -> Result<UrlRecord> {
        for attempt in 1..=self.options.max_attempts {
            let candidate = self.generator.generate();

            let taken = self
                .within_deadline("exists", self.repository.exists(&candidate))
                .await?;
            if taken {
                debug!(
                    "Short code '{}' already taken (attempt {}), retrying",
                    candidate, attempt
                );
                continue;
            }

            // The existence check is only a fast path. Another request or worker
            // can claim the same code in between; the store's unique index
            // rejects the loser and we go around again.
            match self
                .within_deadline("insert", self.repository.insert(&candidate, original_url))
                .await
            {
                Ok(record) => {
                    info!("Allocated short code '{}' after {} attempt(s)", record.short_code, attempt);
                    self.cache
                        .put(record.short_code.clone(), record.original_url.clone());
                    return Ok(record);
                }
                Err(RepositoryError::Conflict(_)) => {
                    warn!(
                        "Short code '{}' claimed concurrently (attempt {}), retrying",
                        candidate, attempt
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Exhausted(self.options.max_attempts))
    }

    async fn resolve(&self, short_code: &str) -> Result<String> {
        self.lookup(short_code).await
    }

    async fn redirect(&self, short_code: &str) -> Result<String> {
        let url = self.lookup(short_code).await?;
        // Fire and forget: the response never waits on click accounting
        drop(self.clicks.record(short_code));
        Ok(url)
    }

    async fn stats(&self, short_code: &str) -> Result<UrlStatsDto> {
        if !is_short_code_shaped(short_code) {
            return Err(ServiceError::NotFound(format!(
                "No URL for short code '{}'",
                short_code
            )));
        }

        self.within_deadline("find_by_code", self.repository.find_by_code(short_code))
            .await?
            .map(UrlStatsDto::from)
            .ok_or_else(|| ServiceError::NotFound(format!("No URL for short code '{}'", short_code)))
    }
}
