use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag observed by the blocking steps of a campaign node.
///
/// Clones share the same flag, so a signal handler can hold one clone while
/// the readiness wait and the launcher poll another.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
