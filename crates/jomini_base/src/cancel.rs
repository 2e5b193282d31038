//! Cooperative cancellation.
//!
//! An analysis run receives one [`CancelToken`]; a newer edit cancels it and
//! the run polls the token at coarse check-points (top-level entries,
//! nested-schema boundaries). Checks are deliberately not sprinkled inside
//! tight loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag. Cloning produces another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Polled by analysis check-points.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
