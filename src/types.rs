//! Shared types used across the channel firmware
//!
//! Small domain enums for relay positions, connection and power states and
//! driver status codes. They carry their own mapping onto relay positions so
//! the controller never has to remember which way round a relay is wired.

use core::fmt;

/// Identity of a front-panel channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// First UART channel (buffered receive to flash)
    Uart1,
    /// Second UART channel
    Uart2,
    /// CAN bus channel
    Can1,
    /// Generic RS232 channel
    Rs232,
}

impl ChannelId {
    /// All channels, in front-panel order
    pub const ALL: [Self; 4] = [Self::Uart1, Self::Uart2, Self::Can1, Self::Rs232];

    /// Short name used in diagnostics
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uart1 => "UART1",
            Self::Uart2 => "UART2",
            Self::Can1 => "CAN1",
            Self::Rs232 => "RS232",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ChannelId {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.name());
    }
}

/// Logical position of a relay
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RelayState {
    /// Coil de-energised
    #[default]
    Off,
    /// Coil energised
    On,
}

impl RelayState {
    /// The opposite position
    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On => Self::Off,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for RelayState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Off => defmt::write!(f, "OFF"),
            Self::On => defmt::write!(f, "ON"),
        }
    }
}

/// Whether the channel is switched onto the front-panel connector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Connection {
    /// Switched onto the connector
    Connected,
    /// Isolated from the connector
    #[default]
    Disconnected,
}

impl Connection {
    /// Switch relay position for this connection state
    #[must_use]
    pub const fn relay_state(self) -> RelayState {
        match self {
            Self::Connected => RelayState::On,
            Self::Disconnected => RelayState::Off,
        }
    }

    /// Check if connected
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for Connection {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Connected => defmt::write!(f, "Connected"),
            Self::Disconnected => defmt::write!(f, "Disconnected"),
        }
    }
}

/// Bus termination state (CAN)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Termination {
    /// Terminating resistor switched in
    Connected,
    /// No termination
    #[default]
    Disconnected,
}

impl Termination {
    /// Termination relay position for this state
    #[must_use]
    pub const fn relay_state(self) -> RelayState {
        match self {
            Self::Connected => RelayState::On,
            Self::Disconnected => RelayState::Off,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for Termination {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Connected => defmt::write!(f, "Terminated"),
            Self::Disconnected => defmt::write!(f, "Unterminated"),
        }
    }
}

/// Supply voltage offered on the connector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PowerLevel {
    /// 3.3 V (power relay energised)
    Low,
    /// 5 V (power relay released)
    #[default]
    High,
}

impl PowerLevel {
    /// Power relay position for this level
    #[must_use]
    pub const fn relay_state(self) -> RelayState {
        match self {
            Self::Low => RelayState::On,
            Self::High => RelayState::Off,
        }
    }

    /// Nominal voltage in millivolts
    #[must_use]
    pub const fn millivolts(self) -> u16 {
        match self {
            Self::Low => 3300,
            Self::High => 5000,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for PowerLevel {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Low => defmt::write!(f, "3V3"),
            Self::High => defmt::write!(f, "5V"),
        }
    }
}

/// Direction(s) the peripheral is configured for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DuplexMode {
    /// Receive only
    Rx,
    /// Transmit only
    Tx,
    /// Transmit and receive
    #[default]
    TxRx,
    /// Transmit and receive, plus periodic diagnostic transmissions
    DebugTx,
}

impl DuplexMode {
    /// Mode the hardware is actually configured with
    ///
    /// `DebugTx` is a logical mode on top of a full-duplex peripheral.
    #[must_use]
    pub const fn physical(self) -> Self {
        match self {
            Self::DebugTx => Self::TxRx,
            other => other,
        }
    }

    /// Check if the receiver is used in this mode
    #[must_use]
    pub const fn includes_receive(self) -> bool {
        matches!(self, Self::Rx | Self::TxRx | Self::DebugTx)
    }

    /// Check if the transmitter is used in this mode
    #[must_use]
    pub const fn includes_transmit(self) -> bool {
        matches!(self, Self::Tx | Self::TxRx | Self::DebugTx)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for DuplexMode {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Rx => defmt::write!(f, "RX"),
            Self::Tx => defmt::write!(f, "TX"),
            Self::TxRx => defmt::write!(f, "TX_RX"),
            Self::DebugTx => defmt::write!(f, "DebugTX"),
        }
    }
}

/// Failure status reported by a peripheral driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalStatus {
    /// Generic driver error
    Error,
    /// Peripheral busy with a previous request
    Busy,
    /// Driver gave up waiting
    Timeout,
}

impl HalStatus {
    /// Vendor-style status label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Error => "HAL_ERROR",
            Self::Busy => "HAL_BUSY",
            Self::Timeout => "HAL_TIMEOUT",
        }
    }
}

impl fmt::Display for HalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for HalStatus {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.label());
    }
}
