//! Channel error taxonomy
//!
//! None of these are fatal to the instrument. Every failing operation leaves
//! its channel in the last valid state (relay rolled back, buffers reset,
//! token released).

use core::fmt;

use crate::channel::relay::RelayStatus;
use crate::types::HalStatus;

/// Channel operation result
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors reported by the channel controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelError {
    /// Relay dwell time has not elapsed; retry later
    RelayRejected(RelayStatus),
    /// Peripheral failed to initialise; channel rolled back to disconnected
    HardwareInit(HalStatus),
    /// Transmit token not acquired in time
    TransmitBusy,
    /// Driver refused to start a transmission
    Transmit(HalStatus),
    /// Both receive buffers full or being flushed; byte dropped
    BufferOverrun,
    /// Channel has no relay or facet for this request
    Unsupported,
    /// Settings rejected by validation
    InvalidSettings,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RelayRejected(status) => write!(f, "relay rejected ({status:?})"),
            Self::HardwareInit(status) => write!(f, "hardware init failed ({status})"),
            Self::TransmitBusy => f.write_str("transmitter busy"),
            Self::Transmit(status) => write!(f, "transmit failed ({status})"),
            Self::BufferOverrun => f.write_str("receive buffers overrun"),
            Self::Unsupported => f.write_str("not supported on this channel"),
            Self::InvalidSettings => f.write_str("invalid settings"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ChannelError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::RelayRejected(status) => defmt::write!(f, "RelayRejected({})", status),
            Self::HardwareInit(status) => defmt::write!(f, "HardwareInit({})", status),
            Self::TransmitBusy => defmt::write!(f, "TransmitBusy"),
            Self::Transmit(status) => defmt::write!(f, "Transmit({})", status),
            Self::BufferOverrun => defmt::write!(f, "BufferOverrun"),
            Self::Unsupported => defmt::write!(f, "Unsupported"),
            Self::InvalidSettings => defmt::write!(f, "InvalidSettings"),
        }
    }
}
