use super::BackgroundGrant;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Host platform hooks for running while the app is not in the foreground
pub trait ExecutionHost: Send + Sync {
    /// Ask for background execution time; `None` when the host refuses
    fn begin_background_execution(&self, reason: &str) -> Option<BackgroundGrant>;

    fn end_background_execution(&self, grant: BackgroundGrant);
}

/// Host without background restrictions: grants are always handed out
#[derive(Debug, Default)]
pub struct NoopExecutionHost {
    next_id: AtomicU64,
}

impl NoopExecutionHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionHost for NoopExecutionHost {
    fn begin_background_execution(&self, reason: &str) -> Option<BackgroundGrant> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("Background execution {} granted: {}", id, reason);
        Some(BackgroundGrant::new(id, reason))
    }

    fn end_background_execution(&self, grant: BackgroundGrant) {
        debug!("Background execution {} ended", grant.id());
    }
}

/// Tracks outstanding grants so tests can check they are released
#[derive(Debug, Default)]
pub struct MockExecutionHost {
    next_id: AtomicU64,
    deny: AtomicBool,
    active: Mutex<HashSet<u64>>,
    granted: AtomicU64,
}

impl MockExecutionHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn active_grants(&self) -> usize {
        self.active.lock().len()
    }

    pub fn total_granted(&self) -> u64 {
        self.granted.load(Ordering::SeqCst)
    }
}

impl ExecutionHost for MockExecutionHost {
    fn begin_background_execution(&self, reason: &str) -> Option<BackgroundGrant> {
        if self.deny.load(Ordering::SeqCst) {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.active.lock().insert(id);
        self.granted.fetch_add(1, Ordering::SeqCst);
        Some(BackgroundGrant::new(id, reason))
    }

    fn end_background_execution(&self, grant: BackgroundGrant) {
        self.active.lock().remove(&grant.id());
    }
}
