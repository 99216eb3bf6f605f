//! Fixed per-channel wiring and capabilities
//!
//! All four front-panel channels run the same controller; what differs is
//! captured here and chosen at construction time.

use crate::channel::settings::ChannelSettings;
use crate::channel::tx::TxReporting;
use crate::types::{ChannelId, RelayState};

/// Peripheral family behind a channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusKind {
    /// USART/UART (also used for RS232 through a level shifter)
    Uart,
    /// bxCAN
    Can,
}

/// Construction parameters of one relay
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelaySpec {
    /// Position applied at channel init
    pub start: RelayState,
    /// Minimum time between changes in milliseconds
    pub min_interval_ms: u32,
}

impl RelaySpec {
    /// Create a relay spec
    #[must_use]
    pub const fn new(start: RelayState, min_interval_ms: u32) -> Self {
        Self {
            start,
            min_interval_ms,
        }
    }
}

/// Everything that makes one channel different from another
#[derive(Clone, Copy, Debug)]
pub struct ChannelProfile {
    /// Channel identity
    pub id: ChannelId,
    /// Peripheral family
    pub bus: BusKind,
    /// Connector switch relay
    pub switch_relay: RelaySpec,
    /// Supply selection relay, if fitted
    pub power_relay: Option<RelaySpec>,
    /// Bus termination relay, if fitted
    pub termination_relay: Option<RelaySpec>,
    /// Flash log base address; `Some` enables buffered receive
    pub flash_base: Option<u32>,
    /// How transmit contention is reported to callers
    pub tx_reporting: TxReporting,
    /// Receive-complete also frees the transmit token
    pub rx_releases_tx_token: bool,
    /// Lowest accepted bit rate
    pub min_bit_rate: u32,
    /// Highest accepted bit rate
    pub max_bit_rate: u32,
    /// Settings applied at channel init
    pub defaults: ChannelSettings,
    /// Payload sent by the periodic worker in `DebugTx` mode
    pub debug_payload: &'static [u8],
    /// Period of the worker loop in milliseconds
    pub debug_period_ms: u32,
}

impl ChannelProfile {
    /// Check if received bytes are logged to flash
    #[must_use]
    pub const fn has_buffered_rx(&self) -> bool {
        self.flash_base.is_some()
    }
}
