//! Time source abstraction
//!
//! The engine never reads the system clock directly: every deadline,
//! transfer timing and file modification stamp goes through [`Clock`], so
//! the whole state machine can be driven by a fake clock in tests.

use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};

/// Time capability consumed by the engine.
pub trait Clock {
    /// Monotonic milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> u64;

    /// Wall-clock time used to stamp file modification times.
    fn wall_time(&self) -> NaiveDateTime;

    /// Cooperative pause used while waiting for a data connection.
    fn sleep_ms(&self, ms: u64);
}

/// Real clock backed by [`Instant`] and the local time zone.
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn wall_time(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep_ms(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}
