//! Cancellation token for long-running operations.
//!
//! Indexing a large tree can spend minutes inside blocking embedder calls.
//! The token is checked at the natural pause points — before each file in a
//! directory walk, before each embed batch within a file — so a fired token
//! stops work promptly without leaving a partially indexed file behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation handle shared between a controller (signal handler,
/// UI) and the operations it may interrupt.
///
/// Cancellation is level-triggered and sticky: once [`cancel`](Self::cancel)
/// is called every clone observes it, and there is no reset.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Safe to call from any thread, including a
    /// signal handler context.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
