//! Peripheral Drivers
//!
//! High-level drivers for external ICs on the board.
//! These provide domain-specific abstractions over the HAL layer.

pub mod spi_flash;
