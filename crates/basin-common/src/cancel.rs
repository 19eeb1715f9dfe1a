use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{BasinError, BasinResult};

/// How many nodes a linear pass may process between cancellation checks.
pub const CANCEL_CHECK_STRIDE: usize = 1 << 20;

/// Shared cooperative-cancellation flag.
///
/// Long-running phases call [`CancelFlag::check`] at per-layer granularity
/// (reverse BFS between levels) or every [`CANCEL_CHECK_STRIDE`] nodes during
/// linear passes. Cloning shares the underlying flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns `Err(Cancelled)` if cancellation has been requested.
    #[inline]
    pub fn check(&self) -> BasinResult<()> {
        if self.is_cancelled() {
            Err(BasinError::Cancelled)
        } else {
            Ok(())
        }
    }
}
