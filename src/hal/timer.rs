//! Timer Abstractions
//!
//! Millisecond time source for the channel controller, backed by the
//! embassy time driver.

use embassy_time::Instant;

use crate::channel::Clock;

/// Uptime clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create the clock
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

impl defmt::Format for SystemClock {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "SystemClock({}ms)", self.now_ms());
    }
}
