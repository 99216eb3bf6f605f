//! GPIO Abstractions
//!
//! Relay outputs and the front-panel fault LED.

use embassy_stm32::gpio::{Level, Output, Pin, Speed};
use embassy_stm32::Peripheral;

use crate::channel::profile::RelaySpec;
use crate::types::RelayState;

/// Output level that energises a relay coil
#[must_use]
pub const fn relay_level(state: RelayState) -> Level {
    match state {
        RelayState::On => Level::High,
        RelayState::Off => Level::Low,
    }
}

/// Configure a relay output already driven to its start position
///
/// Avoids a glitch between pin configuration and the controller's `init`.
pub fn relay_output<'d>(pin: impl Peripheral<P = impl Pin> + 'd, spec: RelaySpec) -> Output<'d> {
    Output::new(pin, relay_level(spec.start), Speed::Low)
}

/// Fault LED state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LedState {
    /// LED is off
    #[default]
    Off,
    /// LED is on
    On,
}

impl defmt::Format for LedState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Off => defmt::write!(f, "OFF"),
            Self::On => defmt::write!(f, "ON"),
        }
    }
}

/// Fault LED driver
///
/// Latches on at the first fault; only a reset clears it.
pub struct FaultLed<'d> {
    pin: Output<'d>,
    state: LedState,
}

impl<'d> FaultLed<'d> {
    /// Create a fault LED (initially off)
    #[must_use]
    pub fn new(mut pin: Output<'d>) -> Self {
        pin.set_low();
        Self {
            pin,
            state: LedState::Off,
        }
    }

    /// Latch the LED on
    pub fn raise(&mut self) {
        self.pin.set_high();
        self.state = LedState::On;
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> LedState {
        self.state
    }
}
