use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use tokio::task::JoinHandle;

use crate::errors::RepositoryError;
use crate::repositories::UrlRecordRepositoryTrait;

/// Poll interval of [`ClickAccumulator::settle`]
const SETTLE_POLL: Duration = Duration::from_millis(5);

/// Best-effort click counting off the redirect path.
///
/// Every recorded click becomes one detached task running
/// `increment_clicks`. Failures are logged and counted, never retried and
/// never reported back to the request, so counts may undercount when the
/// store is struggling.
#[derive(Clone)]
pub struct ClickAccumulator {
    repository: Arc<dyn UrlRecordRepositoryTrait>,
    timeout: Duration,
    in_flight: Arc<AtomicUsize>,
    failures: Arc<AtomicU64>,
}

impl ClickAccumulator {
    pub fn new(repository: Arc<dyn UrlRecordRepositoryTrait>, timeout: Duration) -> Self {
        Self {
            repository,
            timeout,
            in_flight: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Schedules one click for `short_code` and returns immediately.
    ///
    /// Must be called from within a Tokio runtime. Dropping the returned
    /// handle detaches the task.
    pub fn record(&self, short_code: &str) -> JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let in_flight = Arc::clone(&self.in_flight);
        let failures = Arc::clone(&self.failures);
        let timeout = self.timeout;
        let short_code = short_code.to_string();

        in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(in_flight);

        tokio::spawn(async move {
            // Released when the task ends, is aborted, or panics
            let _guard = guard;
            let outcome = tokio::time::timeout(timeout, repository.increment_clicks(&short_code))
                .await
                .unwrap_or_else(|_| {
                    Err(RepositoryError::Timeout(format!(
                        "click increment exceeded {:?}",
                        timeout
                    )))
                });

            match outcome {
                Ok(true) => trace!("Recorded click for '{}'", short_code),
                Ok(false) => debug!("Click for unknown code '{}' dropped", short_code),
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Failed to record click for '{}': {}", short_code, e);
                }
            }
        })
    }

    /// Number of increments scheduled but not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of increments that failed since startup.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Waits until every scheduled increment has finished or `timeout` passes.
    /// Returns `true` when nothing is left in flight.
    pub async fn settle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.in_flight() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(
                    "{} click increments still pending after {:?}",
                    self.in_flight(),
                    timeout
                );
                return false;
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }
}

/// Counts one scheduled increment until dropped.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
