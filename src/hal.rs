//! Hardware Abstraction Layer
//!
//! Adapters from embassy-stm32 drivers on the STM32F407 to the traits the
//! channel controller is written against. Each bus channel is served by a
//! pump task that owns the driver; the controller reaches it through a
//! [`port::PortAdapter`].

pub mod can;
pub mod gpio;
pub mod port;
pub mod spi;
pub mod timer;
pub mod usart;
