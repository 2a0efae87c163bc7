//! Wall-clock abstraction.
//!
//! Every timeout in the controller is an age check against "now", evaluated
//! lazily during sweeps. Handlers read the time through [`Clock`] so tests can
//! move it forward deterministically.

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
