//! Channel Settings
//!
//! The per-channel configuration record handed to and from the GUI, and the
//! peripheral configuration derived from it.

use crate::channel::profile::{BusKind, ChannelProfile};
use crate::config::APB1_CLOCK_HZ;
use crate::types::{Connection, DuplexMode, PowerLevel, Termination};

/// Configuration record of one channel
///
/// Always handed out by value; callers hold a snapshot, never a live view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Baud rate (UART/RS232) or bit rate (CAN)
    pub bit_rate: u32,
    /// Duplex mode
    pub mode: DuplexMode,
    /// Supply level, for channels with a power relay
    pub power: Option<PowerLevel>,
    /// Connector switch state
    pub connection: Connection,
    /// Bus termination, for channels with a termination relay
    pub termination: Option<Termination>,
}

impl ChannelSettings {
    /// Check these settings against what a channel supports
    #[must_use]
    pub fn is_valid_for(&self, profile: &ChannelProfile) -> bool {
        let rate_ok = (profile.min_bit_rate..=profile.max_bit_rate).contains(&self.bit_rate);
        let timing_ok = match profile.bus {
            BusKind::Uart => true,
            BusKind::Can => CanBitTiming::for_bit_rate(APB1_CLOCK_HZ, self.bit_rate).is_some(),
        };
        let power_ok = self.power.is_some() == profile.power_relay.is_some();
        let termination_ok = self.termination.is_some() == profile.termination_relay.is_some();

        rate_ok && timing_ok && power_ok && termination_ok
    }

    /// Check if the periodic diagnostic transmission should run
    #[must_use]
    pub const fn wants_debug_tx(&self) -> bool {
        self.connection.is_connected() && matches!(self.mode, DuplexMode::DebugTx)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ChannelSettings {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Settings({}bps, {}, {}, power={}, term={})",
            self.bit_rate,
            self.mode,
            self.connection,
            self.power,
            self.termination
        );
    }
}

/// Stop bits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StopBits {
    /// One stop bit
    #[default]
    One,
    /// Two stop bits
    Two,
}

/// Parity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// UART character framing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Framing {
    /// Data bits (8 or 9)
    pub data_bits: u8,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Parity
    pub parity: Parity,
}

impl Framing {
    /// 8 data bits, no parity, one stop bit
    pub const EIGHT_N_ONE: Self = Self {
        data_bits: 8,
        stop_bits: StopBits::One,
        parity: Parity::None,
    };
}

impl Default for Framing {
    fn default() -> Self {
        Self::EIGHT_N_ONE
    }
}

/// Configuration applied to the peripheral on the next connect
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeripheralConfig {
    /// Baud or bit rate
    pub bit_rate: u32,
    /// Physical duplex mode (never `DebugTx`)
    pub mode: DuplexMode,
    /// Character framing (ignored by CAN)
    pub framing: Framing,
}

impl PeripheralConfig {
    /// Mirror the hardware-relevant fields of a settings record
    #[must_use]
    pub const fn from_settings(settings: &ChannelSettings) -> Self {
        Self {
            bit_rate: settings.bit_rate,
            mode: settings.mode.physical(),
            framing: Framing::EIGHT_N_ONE,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for PeripheralConfig {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Periph({}bps, {})", self.bit_rate, self.mode);
    }
}

/// bxCAN bit timing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanBitTiming {
    /// Clock prescaler (1-1024)
    pub prescaler: u16,
    /// Resynchronisation jump width in time quanta (1-4)
    pub sjw: u8,
    /// Time segment 1 in time quanta (1-16)
    pub bs1: u8,
    /// Time segment 2 in time quanta (1-8)
    pub bs2: u8,
}

impl CanBitTiming {
    /// Target sample point in per-mille of the bit time
    pub const SAMPLE_POINT_PERMILLE: u32 = 875;

    const MIN_QUANTA: u32 = 8;
    const MAX_QUANTA: u32 = 25;
    const MAX_PRESCALER: u32 = 1024;
    const MAX_BS1: u32 = 16;
    const MAX_BS2: u32 = 8;

    /// Find timing that hits `bit_rate` exactly from `pclk_hz`
    ///
    /// Among exact solutions the one with the sample point closest to
    /// 87.5 % wins; ties go to the larger number of time quanta.
    #[must_use]
    pub fn for_bit_rate(pclk_hz: u32, bit_rate: u32) -> Option<Self> {
        if bit_rate == 0 {
            return None;
        }

        let mut best: Option<(u32, Self)> = None;

        for quanta in (Self::MIN_QUANTA..=Self::MAX_QUANTA).rev() {
            let Some(divisor) = bit_rate.checked_mul(quanta) else {
                continue;
            };
            if pclk_hz % divisor != 0 {
                continue;
            }
            let prescaler = pclk_hz / divisor;
            if prescaler == 0 || prescaler > Self::MAX_PRESCALER {
                continue;
            }

            let sample_quanta = (Self::SAMPLE_POINT_PERMILLE * quanta + 500) / 1000;
            let bs1 = sample_quanta.saturating_sub(1).clamp(1, Self::MAX_BS1);
            let bs2 = quanta - 1 - bs1;
            if bs2 == 0 || bs2 > Self::MAX_BS2 {
                continue;
            }

            let sample_point = (1 + bs1) * 1000 / quanta;
            let error = sample_point.abs_diff(Self::SAMPLE_POINT_PERMILLE);
            let candidate = Self {
                prescaler: prescaler as u16,
                sjw: 1,
                bs1: bs1 as u8,
                bs2: bs2 as u8,
            };

            match best {
                Some((best_error, _)) if best_error <= error => {}
                _ => best = Some((error, candidate)),
            }
        }

        best.map(|(_, timing)| timing)
    }

    /// Time quanta per bit
    #[must_use]
    pub const fn quanta(&self) -> u32 {
        1 + self.bs1 as u32 + self.bs2 as u32
    }

    /// Bit rate produced from `pclk_hz`
    #[must_use]
    pub const fn bit_rate(&self, pclk_hz: u32) -> u32 {
        pclk_hz / (self.prescaler as u32 * self.quanta())
    }

    /// Sample point in per-mille of the bit time
    #[must_use]
    pub const fn sample_point_permille(&self) -> u32 {
        (1 + self.bs1 as u32) * 1000 / self.quanta()
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for CanBitTiming {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "CanTiming(presc={}, bs1={}, bs2={}, sjw={})",
            self.prescaler,
            self.bs1,
            self.bs2,
            self.sjw
        );
    }
}
