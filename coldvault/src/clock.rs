//! Time source used to stamp uploads.

use chrono::{DateTime, Utc};

/// Returns the current date and time. Substitute it to make upload
/// timestamps deterministic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
