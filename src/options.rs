//! Read-time options.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Options for region, chunk and batch reads.
///
/// The default values are:
/// - `concurrent_target`: number of threads available to Rayon
/// - `cancellation`: none
/// - `deadline`: none
#[derive(Debug, Clone)]
pub struct ReadOptions {
    concurrent_target: usize,
    cancellation: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            concurrent_target: rayon::current_num_threads(),
            cancellation: None,
            deadline: None,
        }
    }
}

impl ReadOptions {
    /// Maximum number of chunks fetched and decoded at once.
    #[must_use]
    pub fn concurrent_target(&self) -> usize {
        self.concurrent_target
    }

    /// Set the concurrent target. `1` reads chunks one at a time, in order.
    #[must_use]
    pub fn with_concurrent_target(mut self, concurrent_target: usize) -> Self {
        self.concurrent_target = concurrent_target.max(1);
        self
    }

    #[must_use]
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Abort reads once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Abort reads still running at `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether a read should stop before its next fetch.
    pub(crate) fn is_aborted(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Shared flag for cancelling in-flight reads from another thread.
///
/// Clones observe the same flag. Cancellation cannot be undone.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
