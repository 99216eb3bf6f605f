//! Debounced Relay
//!
//! Guards one relay coil. Mechanical relays need settle time and have a
//! finite switching life, so a change is only allowed once the minimum dwell
//! time since the previous change has passed. The check is a pure function of
//! `(now, last_change, min_interval)` so it can be driven by any clock.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;

use crate::types::RelayState;

/// Result of a relay state request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayStatus {
    /// Relay switched
    Ok,
    /// Relay already in the requested position, nothing done
    Unchanged,
    /// Request came before the dwell time expired, nothing done
    NotEnoughTimePassed,
}

impl RelayStatus {
    /// Check if the relay ended up in the requested position
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Ok | Self::Unchanged)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for RelayStatus {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Ok => defmt::write!(f, "Ok"),
            Self::Unchanged => defmt::write!(f, "Unchanged"),
            Self::NotEnoughTimePassed => defmt::write!(f, "NotEnoughTimePassed"),
        }
    }
}

/// Milliseconds elapsed between two readings of a free-running counter
#[must_use]
pub const fn elapsed_ms(now_ms: u64, since_ms: u64) -> u64 {
    now_ms.wrapping_sub(since_ms)
}

/// Check whether a change is allowed at `now_ms`
#[must_use]
pub const fn dwell_elapsed(now_ms: u64, last_change_ms: u64, min_interval_ms: u32) -> bool {
    elapsed_ms(now_ms, last_change_ms) >= min_interval_ms as u64
}

/// Relay with a minimum time between state changes
pub struct DebouncedRelay<P> {
    pin: P,
    state: RelayState,
    start_state: RelayState,
    min_interval_ms: u32,
    last_change_ms: u64,
}

impl<P> DebouncedRelay<P>
where
    P: OutputPin<Error = Infallible>,
{
    /// Create a relay guard; the coil is not touched until [`Self::init`]
    #[must_use]
    pub const fn new(pin: P, start_state: RelayState, min_interval_ms: u32) -> Self {
        Self {
            pin,
            state: start_state,
            start_state,
            min_interval_ms,
            last_change_ms: 0,
        }
    }

    /// Drive the coil to the start state and start the dwell window
    pub fn init(&mut self, now_ms: u64) {
        self.drive(self.start_state);
        self.last_change_ms = now_ms;
    }

    /// Request a new position, honouring the dwell time
    pub fn set_state(&mut self, desired: RelayState, now_ms: u64) -> RelayStatus {
        if desired == self.state {
            return RelayStatus::Unchanged;
        }
        if !dwell_elapsed(now_ms, self.last_change_ms, self.min_interval_ms) {
            return RelayStatus::NotEnoughTimePassed;
        }

        self.drive(desired);
        self.last_change_ms = now_ms;
        RelayStatus::Ok
    }

    /// Drive the coil without checking the dwell time
    ///
    /// Only for rollback, where the relay has to end up open even though it
    /// was closed a moment ago.
    pub fn force(&mut self, desired: RelayState, now_ms: u64) {
        self.drive(desired);
        self.last_change_ms = now_ms;
    }

    /// Current position
    #[must_use]
    pub const fn state(&self) -> RelayState {
        self.state
    }

    /// Position applied by [`Self::init`]
    #[must_use]
    pub const fn start_state(&self) -> RelayState {
        self.start_state
    }

    /// Minimum time between changes
    #[must_use]
    pub const fn min_interval_ms(&self) -> u32 {
        self.min_interval_ms
    }

    /// Time left before the next change is accepted
    #[must_use]
    pub const fn time_until_ready(&self, now_ms: u64) -> u64 {
        let elapsed = elapsed_ms(now_ms, self.last_change_ms);
        let interval = self.min_interval_ms as u64;
        if elapsed >= interval {
            0
        } else {
            interval - elapsed
        }
    }

    /// Borrow the underlying pin
    pub fn pin(&self) -> &P {
        &self.pin
    }

    fn drive(&mut self, state: RelayState) {
        // On-chip GPIO cannot fail
        let result = match state {
            RelayState::On => self.pin.set_high(),
            RelayState::Off => self.pin.set_low(),
        };
        result.unwrap_or_else(|never| match never {});
        self.state = state;
    }
}
