//! Latched readiness gate
//!
//! "Ready" means the component has initialized successfully at least once. It
//! is not a liveness signal: once latched it never reverts, and later check
//! failures only show up in the last error.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error returned by a readiness check
pub type CheckError = Arc<dyn StdError + Send + Sync>;

/// Shortest check interval; smaller values are raised to it
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

type CheckFn = Box<dyn Fn() -> BoxFuture<'static, Result<(), CheckError>> + Send + Sync>;

/// Observable readiness
#[derive(Clone, Debug, Default)]
pub struct ReadinessState {
    /// Latched: false until the first successful check, then true forever
    pub ready: bool,
    /// Outcome of the most recent check
    pub last_error: Option<CheckError>,
}

/// Runs a check periodically and latches the first success
pub struct ReadinessChecker {
    check_fn: CheckFn,
    interval: Duration,
    state: RwLock<ReadinessState>,
}

impl ReadinessChecker {
    /// Create a checker around `check`, run every `interval`
    ///
    /// An interval below [`MIN_CHECK_INTERVAL`] (including zero) is raised
    /// to it.
    pub fn new<F, Fut, E>(interval: Duration, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + 'static,
    {
        let check_fn: CheckFn = Box::new(move || {
            let fut = check();
            Box::pin(async move {
                fut.await.map_err(|e| {
                    let boxed: Box<dyn StdError + Send + Sync> = e.into();
                    CheckError::from(boxed)
                })
            })
        });
        Self {
            check_fn,
            interval: interval.max(MIN_CHECK_INTERVAL),
            state: RwLock::new(ReadinessState::default()),
        }
    }

    /// Latched readiness and the most recent check error
    pub fn ready(&self) -> (bool, Option<CheckError>) {
        let state = self.state.read();
        (state.ready, state.last_error.clone())
    }

    /// Snapshot of the full state
    pub fn state(&self) -> ReadinessState {
        self.state.read().clone()
    }

    /// Run the check once and record the outcome
    ///
    /// The check runs without holding the lock; only the update takes it.
    pub async fn check(&self) {
        let outcome = (self.check_fn)().await;
        self.record(outcome);
    }

    fn record(&self, outcome: Result<(), CheckError>) {
        let mut state = self.state.write();
        match outcome {
            Ok(()) => {
                if !state.ready {
                    info!("Readiness check succeeded, component is ready");
                }
                state.ready = true;
                state.last_error = None;
            }
            Err(e) => {
                warn!("Readiness check failed: {}", e);
                state.last_error = Some(e);
            }
        }
    }

    /// Check immediately, then every interval, until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.check() => {}
            }
        }
        debug!("Readiness checker stopped");
    }
}
