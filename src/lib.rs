//! Breakout Monitor Firmware Library
//!
//! This library provides the channel controllers for an STM32F407-based
//! serial/bus breakout monitor. Four front-panel channels (UART1, UART2,
//! CAN1 and RS232) are switched onto the target through relays, receive into
//! a double buffer that drains to an SPI flash log, and transmit through a
//! single-owner token released from interrupt context.
//!
//! # Architecture
//!
//! The firmware is organized in layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    APPLICATION LAYER                         │
//! │  Channel workers  │  Command queue  │  Debug transmitter     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   CHANNEL CONTROLLER                         │
//! │  Relays  │  Interface gate  │  RX pipeline  │  TX arbiter    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   HAL / DRIVER LAYER                         │
//! │  USART  │  bxCAN  │  SPI flash  │  GPIO                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    RTOS / SCHEDULER                          │
//! │           embassy-rs (async/await executor)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - **Hardware behind traits**: the controller only sees `OutputPin`,
//!   `DelayNs`, [`channel::BusPeripheral`] and [`storage::ByteStore`]
//! - **Interrupts never block**: handlers only release the transmit token,
//!   append to a receive buffer and bump counters
//! - **No unsafe in application code**
//! - **Explicit error handling**: All fallible operations return `Result`

#![cfg_attr(feature = "embedded", no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Must come first so the logging macros are visible to every module
#[macro_use]
mod fmt;

// Re-export dependencies needed by applications (only in embedded mode)
#[cfg(feature = "embedded")]
pub use embassy_executor;
#[cfg(feature = "embedded")]
pub use embassy_stm32;
#[cfg(feature = "embedded")]
pub use embassy_sync;
#[cfg(feature = "embedded")]
pub use embassy_time;

/// Hardware Abstraction Layer
///
/// Adapters from embassy-stm32 drivers to the controller traits.
#[cfg(feature = "embedded")]
pub mod hal;

/// Peripheral Drivers
///
/// High-level drivers for external ICs (SPI NOR flash).
pub mod drivers;

/// Channel Controller
///
/// Relays, settings, interface gate, receive pipeline and transmit arbiter.
pub mod channel;

/// Persistent byte-log store
pub mod storage;

/// Periodic workers and the command interface
pub mod worker;

/// Error types
pub mod error;

/// Shared types used across modules
pub mod types;

/// System configuration and constants
pub mod config;

/// Prelude module for common imports
#[cfg(feature = "embedded")]
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::channel::{Channel, ChannelLink, ChannelSettings, Clock};
    pub use crate::config::*;
    pub use crate::error::{ChannelError, ChannelResult};
    pub use crate::types::*;

    // Common traits
    pub use embedded_hal::digital::OutputPin;
    pub use embedded_hal_async::delay::DelayNs;

    // Embassy
    pub use embassy_time::{Duration, Instant, Timer};

    // Error handling
    pub use core::result::Result;

    // Logging
    pub use defmt::{debug, error, info, trace, warn};
}
