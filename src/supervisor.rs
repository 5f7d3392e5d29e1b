//! Multi-process mode.
//!
//! The coordinator never serves HTTP. It re-executes its own binary once per
//! worker with [`WORKER_ID_ENV`] set, restarts workers that exit, and stops
//! them all when it is asked to shut down. Workers share nothing but the
//! listening port and the database.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::ClusterConfig;

/// Set on worker processes to their index; absent on the coordinator.
pub const WORKER_ID_ENV: &str = "QUICKLINK_WORKER_ID";

/// How long a worker gets between SIGTERM and SIGKILL.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Invalid QUICKLINK_WORKER_ID value '{0}'")]
    InvalidWorkerId(String),

    #[error("Crash loop: {restarts} worker restarts within {window:?}")]
    CrashLoop { restarts: usize, window: Duration },

    #[error("Supervision task failed: {0}")]
    Task(String),
}

/// What this process is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Worker(usize),
    Standalone,
}

impl Role {
    /// Workers are recognised by [`WORKER_ID_ENV`]; otherwise the cluster
    /// switch picks between coordinator and standalone.
    pub fn detect(cluster_enabled: bool) -> Result<Self, SupervisorError> {
        Self::from_env_value(std::env::var(WORKER_ID_ENV).ok(), cluster_enabled)
    }

    fn from_env_value(value: Option<String>, cluster_enabled: bool) -> Result<Self, SupervisorError> {
        match value {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Role::Worker)
                .map_err(|_| SupervisorError::InvalidWorkerId(raw)),
            None if cluster_enabled => Ok(Role::Coordinator),
            None => Ok(Role::Standalone),
        }
    }

    pub fn worker_id(&self) -> Option<usize> {
        match self {
            Role::Worker(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Coordinator => write!(f, "coordinator"),
            Role::Worker(id) => write!(f, "worker-{}", id),
            Role::Standalone => write!(f, "standalone"),
        }
    }
}

/// Restart tunables, see `CLUSTER_*` in the configuration.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Uptime after which a worker counts as healthy and its backoff resets
    pub stable_after: Duration,
    pub max_restarts: usize,
    pub window: Duration,
}

impl From<&ClusterConfig> for RestartPolicy {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            backoff_initial: Duration::from_millis(config.backoff_initial_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            stable_after: Duration::from_secs(config.stable_after_seconds),
            max_restarts: config.max_restarts,
            window: Duration::from_secs(config.restart_window_seconds),
        }
    }
}

/// Per-worker exponential backoff.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next start of a worker that just died after `uptime`.
    fn next_delay(&mut self, uptime: Duration, stable_after: Duration) -> Duration {
        if uptime >= stable_after {
            self.current = self.initial;
        }
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

/// Counts restarts across all workers over a sliding window.
#[derive(Debug)]
struct CrashLoopBreaker {
    max_restarts: usize,
    window: Duration,
    restarts: VecDeque<Instant>,
}

impl CrashLoopBreaker {
    fn new(max_restarts: usize, window: Duration) -> Self {
        Self {
            max_restarts,
            window,
            restarts: VecDeque::new(),
        }
    }

    /// Records one restart. Returns the restart count inside the window once
    /// it exceeds the limit.
    fn record(&mut self, now: Instant) -> Option<usize> {
        while let Some(oldest) = self.restarts.front() {
            if now.duration_since(*oldest) > self.window {
                self.restarts.pop_front();
            } else {
                break;
            }
        }
        self.restarts.push_back(now);
        let restarts = self.restarts.len();
        (restarts > self.max_restarts).then_some(restarts)
    }
}

/// Keeps `workers` copies of a command running.
pub struct Supervisor<F> {
    workers: usize,
    policy: RestartPolicy,
    command: Arc<F>,
    grace: Duration,
}

impl<F> Supervisor<F>
where
    F: Fn(usize) -> Command + Send + Sync + 'static,
{
    /// `command` builds the process for a given worker index.
    pub fn new(workers: usize, policy: RestartPolicy, command: F) -> Self {
        Self {
            workers,
            policy,
            command: Arc::new(command),
            grace: SHUTDOWN_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Runs until `shutdown` resolves or the crash-loop breaker trips. Either
    /// way every worker is stopped before this returns.
    pub async fn run<S>(self, shutdown: S) -> Result<(), SupervisorError>
    where
        S: Future<Output = ()>,
    {
        info!("Starting {} workers", self.workers);

        let (stop_tx, stop_rx) = watch::channel(false);
        let breaker = Arc::new(Mutex::new(CrashLoopBreaker::new(
            self.policy.max_restarts,
            self.policy.window,
        )));

        let mut slots = JoinSet::new();
        for id in 0..self.workers {
            slots.spawn(supervise_worker(
                id,
                Arc::clone(&self.command),
                self.policy.clone(),
                Arc::clone(&breaker),
                stop_rx.clone(),
                self.grace,
            ));
        }

        tokio::pin!(shutdown);
        let outcome = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping workers");
                Ok(())
            }
            Some(joined) = slots.join_next() => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!("{}, stopping all workers", e);
                    Err(e)
                }
                Err(e) => Err(SupervisorError::Task(e.to_string())),
            },
        };

        // Ignore send errors, every receiver may already be gone
        let _ = stop_tx.send(true);
        while let Some(joined) = slots.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Worker slot ended during shutdown: {}", e),
                Err(e) => warn!("Worker slot panicked: {}", e),
            }
        }

        info!("All workers stopped");
        outcome
    }
}

/// Owns one worker index for the coordinator's lifetime.
async fn supervise_worker<F>(
    id: usize,
    command: Arc<F>,
    policy: RestartPolicy,
    breaker: Arc<Mutex<CrashLoopBreaker>>,
    mut stop: watch::Receiver<bool>,
    grace: Duration,
) -> Result<(), SupervisorError>
where
    F: Fn(usize) -> Command + Send + Sync + 'static,
{
    let mut backoff = Backoff::new(policy.backoff_initial, policy.backoff_max);

    loop {
        if *stop.borrow() {
            return Ok(());
        }

        let started = Instant::now();
        let mut cmd = command(id);
        cmd.kill_on_drop(true);

        match cmd.spawn() {
            Ok(mut child) => {
                info!("Worker {} started (pid {:?})", id, child.id());
                tokio::select! {
                    status = child.wait() => log_exit(id, status, started.elapsed()),
                    _ = stop.changed() => {
                        terminate(id, &mut child, grace).await;
                        return Ok(());
                    }
                }
            }
            Err(e) => error!("Failed to spawn worker {}: {}", id, e),
        }

        if let Some(restarts) = breaker.lock().record(Instant::now()) {
            return Err(SupervisorError::CrashLoop {
                restarts,
                window: policy.window,
            });
        }

        let delay = backoff.next_delay(started.elapsed(), policy.stable_after);
        info!("Restarting worker {} in {:?}", id, delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => return Ok(()),
        }
    }
}

fn log_exit(id: usize, status: io::Result<ExitStatus>, uptime: Duration) {
    match status {
        Ok(status) => warn!("Worker {} exited with {} after {:?}", id, status, uptime),
        Err(e) => error!("Lost track of worker {}: {}", id, e),
    }
}

/// SIGTERM, then SIGKILL once `grace` runs out.
async fn terminate(id: usize, child: &mut Child, grace: Duration) {
    if request_stop(id, child) {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!("Worker {} stopped with {}", id, status);
                return;
            }
            Ok(Err(e)) => warn!("Waiting for worker {} failed: {}", id, e),
            Err(_) => warn!("Worker {} still running after {:?}, killing", id, grace),
        }
    }

    match child.kill().await {
        Ok(()) => info!("Worker {} killed", id),
        Err(e) => warn!("Failed to kill worker {}: {}", id, e),
    }
}

#[cfg(unix)]
fn request_stop(id: usize, child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to send SIGTERM to worker {}: {}", id, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn request_stop(_id: usize, _child: &Child) -> bool {
    false
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating shutdown"),
        _ = terminate => info!("Received terminate signal, initiating shutdown"),
    }
}
