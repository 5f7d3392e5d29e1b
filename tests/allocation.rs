use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fake::faker::lorem::en::Word;
use fake::Fake;

use quicklink::{
    cache::AcceleratorCache,
    errors::ServiceError,
    models::UrlRecord,
    repositories::{InMemoryUrlRecordRepository, RepositoryResult, UrlRecordRepositoryTrait},
    services::{ShortenerOptions, UrlService, UrlServiceTrait},
    utils::{CodeGenerator, RandomCodeGenerator},
};

/// One worker's stack over a shared store.
fn worker(
    store: Arc<dyn UrlRecordRepositoryTrait>,
    generator: Arc<dyn CodeGenerator>,
    max_attempts: usize,
) -> Arc<UrlService> {
    Arc::new(UrlService::new(
        store,
        generator,
        AcceleratorCache::new(1_000),
        ShortenerOptions {
            max_attempts,
            ..ShortenerOptions::default()
        },
    ))
}

async fn allocate_concurrently(workers: &[Arc<UrlService>], total: usize) -> Vec<String> {
    let mut handles = Vec::with_capacity(total);
    for i in 0..total {
        let service = Arc::clone(&workers[i % workers.len()]);
        handles.push(tokio::spawn(async move {
            let word: String = Word().fake();
            service
                .allocate(&format!("https://example.com/{}/{}", word, i))
                .await
                .map(|record| record.short_code)
        }));
    }

    let mut codes = Vec::with_capacity(total);
    for handle in handles {
        codes.push(handle.await.unwrap().unwrap());
    }
    codes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn hundred_thousand_concurrent_allocations_never_collide() {
    let store = Arc::new(InMemoryUrlRecordRepository::new());
    let workers: Vec<_> = (0..4)
        .map(|_| worker(store.clone(), Arc::new(RandomCodeGenerator::default()), 10))
        .collect();

    let codes = allocate_concurrently(&workers, 100_000).await;

    let unique: HashSet<_> = codes.iter().collect();
    assert_eq!(unique.len(), 100_000);
    assert_eq!(store.len(), 100_000);
    assert!(codes.iter().all(|c| c.len() == 7));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn crowded_code_space_still_yields_unique_codes() {
    // 62^3 codes, so workers regularly race for the same one
    let store = Arc::new(InMemoryUrlRecordRepository::new());
    let workers: Vec<_> = (0..8)
        .map(|_| worker(store.clone(), Arc::new(RandomCodeGenerator::new(3)), 50))
        .collect();

    let codes = allocate_concurrently(&workers, 20_000).await;

    let unique: HashSet<_> = codes.iter().collect();
    assert_eq!(unique.len(), 20_000);
    assert_eq!(store.len(), 20_000);
}

#[tokio::test]
async fn single_symbol_codes_fill_up_then_exhaust() {
    let store = Arc::new(InMemoryUrlRecordRepository::new());
    let service = worker(store.clone(), Arc::new(RandomCodeGenerator::new(1)), 10_000);

    let mut codes = HashSet::new();
    for i in 0..62 {
        let record = service
            .allocate(&format!("https://example.com/{}", i))
            .await
            .unwrap();
        assert!(codes.insert(record.short_code));
    }

    let err = service.allocate("https://example.com/full").await.unwrap_err();
    assert!(matches!(err, ServiceError::Exhausted(10_000)));
    assert_eq!(store.len(), 62);
}

/// Answers every existence check with "free", so only the insert can catch
/// a duplicate.
struct BlindExistenceCheck {
    inner: InMemoryUrlRecordRepository,
    inserts: AtomicUsize,
}

#[async_trait]
impl UrlRecordRepositoryTrait for BlindExistenceCheck {
    async fn exists(&self, _: &str) -> RepositoryResult<bool> {
        Ok(false)
    }

    async fn insert(&self, short_code: &str, original_url: &str) -> RepositoryResult<UrlRecord> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(short_code, original_url).await
    }

    async fn find_by_code(&self, short_code: &str) -> RepositoryResult<Option<UrlRecord>> {
        self.inner.find_by_code(short_code).await
    }

    async fn increment_clicks(&self, short_code: &str) -> RepositoryResult<bool> {
        self.inner.increment_clicks(short_code).await
    }
}

/// Cycles through a fixed list of codes.
struct CyclingGenerator {
    codes: Vec<&'static str>,
    next: AtomicUsize,
}

impl CodeGenerator for CyclingGenerator {
    fn generate(&self) -> String {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        self.codes[i % self.codes.len()].to_string()
    }
}

#[tokio::test]
async fn insert_conflict_is_retried_with_a_new_code() {
    let store = Arc::new(BlindExistenceCheck {
        inner: InMemoryUrlRecordRepository::new(),
        inserts: AtomicUsize::new(0),
    });
    store.inner.insert("dup0001", "https://first.example").await.unwrap();

    let generator = Arc::new(CyclingGenerator {
        codes: vec!["dup0001", "new0001"],
        next: AtomicUsize::new(0),
    });
    let service = worker(store.clone(), generator, 5);

    let record = service.allocate("https://second.example").await.unwrap();

    assert_eq!(record.short_code, "new0001");
    assert_eq!(store.inserts.load(Ordering::SeqCst), 2);
    // the loser never overwrote the existing mapping
    let kept = store.inner.find_by_code("dup0001").await.unwrap().unwrap();
    assert_eq!(kept.original_url, "https://first.example");
}

#[tokio::test]
async fn only_colliding_codes_exhaust_the_attempt_bound() {
    let store = Arc::new(BlindExistenceCheck {
        inner: InMemoryUrlRecordRepository::new(),
        inserts: AtomicUsize::new(0),
    });
    store.inner.insert("dup0001", "https://first.example").await.unwrap();

    let generator = Arc::new(CyclingGenerator {
        codes: vec!["dup0001"],
        next: AtomicUsize::new(0),
    });
    let service = worker(store.clone(), generator, 4);

    let err = service.allocate("https://second.example").await.unwrap_err();
    assert!(matches!(err, ServiceError::Exhausted(4)));
    assert_eq!(store.inserts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn workers_see_each_others_records_through_the_store() {
    let store = Arc::new(InMemoryUrlRecordRepository::new());
    let first = worker(store.clone(), Arc::new(RandomCodeGenerator::default()), 10);
    let second = worker(store.clone(), Arc::new(RandomCodeGenerator::default()), 10);

    let record = first.allocate("https://example.com/shared").await.unwrap();

    assert!(second.cache().is_empty());
    assert_eq!(
        second.resolve(&record.short_code).await.unwrap(),
        "https://example.com/shared"
    );
    assert_eq!(second.cache().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redirects_are_all_counted() {
    let store = Arc::new(InMemoryUrlRecordRepository::new());
    let workers: Vec<_> = (0..2)
        .map(|_| worker(store.clone(), Arc::new(RandomCodeGenerator::default()), 10))
        .collect();
    let record = workers[0].allocate("https://example.com/hot").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..500 {
        let service = Arc::clone(&workers[i % 2]);
        let code = record.short_code.clone();
        handles.push(tokio::spawn(async move { service.redirect(&code).await.unwrap() }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "https://example.com/hot");
    }

    for service in &workers {
        assert!(service.clicks().settle(Duration::from_secs(5)).await);
    }
    let stats = workers[1].stats(&record.short_code).await.unwrap();
    assert_eq!(stats.clicks, 500);
}
