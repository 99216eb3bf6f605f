//! System configuration and hardware constants
//!
//! This module defines compile-time constants for the breakout monitor.
//! Relay timings, buffer sizes, flash layout and the fixed identity of every
//! channel are centralized here.

use crate::channel::profile::{BusKind, ChannelProfile, RelaySpec};
use crate::channel::settings::ChannelSettings;
use crate::channel::tx::TxReporting;
use crate::types::{ChannelId, Connection, DuplexMode, PowerLevel, RelayState, Termination};

/// System clock frequency (STM32F407 @ 168MHz)
pub const SYSTEM_CLOCK_HZ: u32 = 168_000_000;

/// APB1 peripheral clock (CAN, USART2)
pub const APB1_CLOCK_HZ: u32 = 42_000_000;

/// Lowest interrupt priority usable by application interrupts
///
/// Interrupts that release the transmit token must not preempt the
/// scheduler's own critical sections.
pub const LOWEST_APP_IRQ_PRIORITY: u8 = 15;

/// Capacity of each of the two receive buffers
pub const RX_BUFFER_SIZE: usize = 256;

/// Transmit scratch buffer capacity for UART-class channels
pub const UART_TX_BUFFER_SIZE: usize = 256;

/// Transmit scratch buffer capacity for CAN (one classic frame)
pub const CAN_TX_BUFFER_SIZE: usize = 8;

/// Quiet period after the first byte before a receive buffer is flushed
pub const RX_FLUSH_QUIET_MS: u32 = 100;

/// Bounded wait for the transmit token
pub const TX_TOKEN_TIMEOUT_MS: u32 = 100;

/// Poll interval while waiting for the transmit token
pub const TOKEN_POLL_MS: u32 = 1;

/// Default UART baud rate
pub const DEFAULT_UART_BAUD: u32 = 115_200;

/// Default CAN bit rate
pub const DEFAULT_CAN_BIT_RATE: u32 = 125_000;

/// Standard identifier used for raw CAN transmissions
pub const CAN_TX_STD_ID: u16 = 0x321;

/// Flash sector size of the log store
pub const FLASH_SECTOR_SIZE: u32 = 4096;

/// Flash log base address for UART1
pub const UART1_FLASH_BASE: u32 = 0x0000_0000;

/// Size of a channel's flash log region
///
/// Only this much is erased at init, so the write cursor never leaves it.
pub const LOG_REGION_SIZE: u32 = FLASH_SECTOR_SIZE;

/// UART1 diagnostic payload
pub const UART1_DEBUG_PAYLOAD: &[u8] = &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE];

/// UART2 diagnostic payload
pub const UART2_DEBUG_PAYLOAD: &[u8] = b"UART2 Debug! ";

/// CAN1 diagnostic payload
pub const CAN1_DEBUG_PAYLOAD: &[u8] = &[0xAA, 0xAA];

/// RS232 diagnostic payload
pub const RS232_DEBUG_PAYLOAD: &[u8] = b"RS232 Debug! ";

/// UART1: buffered receive to flash, fire-and-forget transmit
pub const UART1: ChannelProfile = ChannelProfile {
    id: ChannelId::Uart1,
    bus: BusKind::Uart,
    switch_relay: RelaySpec::new(RelayState::Off, 1000),
    power_relay: Some(RelaySpec::new(RelayState::Off, 1000)),
    termination_relay: None,
    flash_base: Some(UART1_FLASH_BASE),
    tx_reporting: TxReporting::FireAndForget,
    rx_releases_tx_token: true,
    min_bit_rate: 1_200,
    max_bit_rate: 4_000_000,
    defaults: ChannelSettings {
        bit_rate: DEFAULT_UART_BAUD,
        mode: DuplexMode::TxRx,
        power: Some(PowerLevel::High),
        connection: Connection::Disconnected,
        termination: None,
    },
    debug_payload: UART1_DEBUG_PAYLOAD,
    debug_period_ms: 100,
};

/// UART2: unbuffered, fire-and-forget transmit
pub const UART2: ChannelProfile = ChannelProfile {
    id: ChannelId::Uart2,
    bus: BusKind::Uart,
    switch_relay: RelaySpec::new(RelayState::Off, 500),
    power_relay: Some(RelaySpec::new(RelayState::Off, 500)),
    termination_relay: None,
    flash_base: None,
    tx_reporting: TxReporting::FireAndForget,
    rx_releases_tx_token: true,
    min_bit_rate: 1_200,
    max_bit_rate: 4_000_000,
    defaults: ChannelSettings {
        bit_rate: DEFAULT_UART_BAUD,
        mode: DuplexMode::TxRx,
        power: Some(PowerLevel::High),
        connection: Connection::Disconnected,
        termination: None,
    },
    debug_payload: UART2_DEBUG_PAYLOAD,
    debug_period_ms: 100,
};

/// CAN1: termination relay, transmit status reported
pub const CAN1: ChannelProfile = ChannelProfile {
    id: ChannelId::Can1,
    bus: BusKind::Can,
    switch_relay: RelaySpec::new(RelayState::Off, 1000),
    power_relay: None,
    termination_relay: Some(RelaySpec::new(RelayState::Off, 1000)),
    flash_base: None,
    tx_reporting: TxReporting::Reported,
    rx_releases_tx_token: false,
    min_bit_rate: 10_000,
    max_bit_rate: 1_000_000,
    defaults: ChannelSettings {
        bit_rate: DEFAULT_CAN_BIT_RATE,
        mode: DuplexMode::TxRx,
        power: None,
        connection: Connection::Disconnected,
        termination: Some(Termination::Disconnected),
    },
    debug_payload: CAN1_DEBUG_PAYLOAD,
    debug_period_ms: 1000,
};

/// RS232: switch relay only, transmit status reported
pub const RS232: ChannelProfile = ChannelProfile {
    id: ChannelId::Rs232,
    bus: BusKind::Uart,
    switch_relay: RelaySpec::new(RelayState::Off, 1000),
    power_relay: None,
    termination_relay: None,
    flash_base: None,
    tx_reporting: TxReporting::Reported,
    rx_releases_tx_token: false,
    min_bit_rate: 1_200,
    max_bit_rate: 250_000,
    defaults: ChannelSettings {
        bit_rate: DEFAULT_UART_BAUD,
        mode: DuplexMode::TxRx,
        power: None,
        connection: Connection::Disconnected,
        termination: None,
    },
    debug_payload: RS232_DEBUG_PAYLOAD,
    debug_period_ms: 1000,
};

/// Profile for a channel identity
#[must_use]
pub const fn profile(id: ChannelId) -> &'static ChannelProfile {
    match id {
        ChannelId::Uart1 => &UART1,
        ChannelId::Uart2 => &UART2,
        ChannelId::Can1 => &CAN1,
        ChannelId::Rs232 => &RS232,
    }
}

/// Pin assignments for GPIO
pub mod pins {
    //! GPIO pin assignments matching the schematic

    /// UART1 connector switch relay
    pub const UART1_SWITCH_RELAY: &str = "PC0";

    /// UART1 supply selection relay
    pub const UART1_POWER_RELAY: &str = "PE0";

    /// UART1 TX
    pub const UART1_TX: &str = "PA9";

    /// UART1 RX
    pub const UART1_RX: &str = "PA10";

    /// UART2 connector switch relay
    pub const UART2_SWITCH_RELAY: &str = "PC1";

    /// UART2 supply selection relay
    pub const UART2_POWER_RELAY: &str = "PE1";

    /// UART2 TX
    pub const UART2_TX: &str = "PA2";

    /// UART2 RX
    pub const UART2_RX: &str = "PA3";

    /// CAN1 connector switch relay
    pub const CAN1_SWITCH_RELAY: &str = "PE2";

    /// CAN1 termination relay
    pub const CAN1_TERMINATION_RELAY: &str = "PE3";

    /// CAN1 TX
    pub const CAN1_TX: &str = "PB9";

    /// CAN1 RX
    pub const CAN1_RX: &str = "PB8";

    /// RS232 connector switch relay
    pub const RS232_SWITCH_RELAY: &str = "PE4";

    /// RS232 TX (USART3)
    pub const RS232_TX: &str = "PB10";

    /// RS232 RX (USART3)
    pub const RS232_RX: &str = "PB11";

    /// Log flash chip select
    pub const FLASH_CS: &str = "PB12";

    /// Fault LED, latched on log flash and channel init failures
    pub const LED_FAULT: &str = "PD13";
}
