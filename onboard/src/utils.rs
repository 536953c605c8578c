//! Utility functions

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Version information for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Future returned by a [`SleepFn`]
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Boxed sleep function, injectable so retry loops can be observed in tests
pub type SleepFn = Arc<dyn Fn(Duration) -> SleepFuture + Send + Sync>;

/// Sleep function backed by the tokio timer
pub fn tokio_sleep() -> SleepFn {
    Arc::new(|wait: Duration| -> SleepFuture { Box::pin(tokio::time::sleep(wait)) })
}

/// Doubling backoff schedule starting at `initial`
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration) -> Self {
        Self { next: initial }
    }

    /// Delay to wait now; the following call returns twice as much
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        self.next = current.saturating_mul(2);
        current
    }
}

/// Generate a random UUID v4
pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `round(100 * done / total)` without floating point
pub fn percent_complete(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = done.min(total);
    ((200 * done + total) / (2 * total)) as u8
}
