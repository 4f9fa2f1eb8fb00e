//! Time source for cache expiry and sync scheduling
//!
//! Abstracted so TTL and scheduler behaviour can be tested with
//! deterministic time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. Manual clocks may start anywhere.
pub type Millis = u64;

pub trait TimeSource: Send + Sync {
    fn now_millis(&self) -> Millis;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> Millis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Millis
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(initial: Millis) -> Self {
        Self {
            now: AtomicU64::new(initial),
        }
    }

    pub fn advance(&self, ms: Millis) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: Millis) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_millis(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}
