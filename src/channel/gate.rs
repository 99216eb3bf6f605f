//! Physical Interface Gate
//!
//! Enable/disable sequencing of the bus peripheral behind a channel. Enable
//! runs clock, interrupt, init, filter and receive arming in order and tears
//! everything down again if any step fails.

use crate::channel::settings::PeripheralConfig;
use crate::config::LOWEST_APP_IRQ_PRIORITY;
use crate::error::{ChannelError, ChannelResult};
use crate::types::HalStatus;

/// Driver operations the channel controller needs from a bus peripheral
///
/// Transmit and receive are interrupt driven: `start_*` only kicks the
/// hardware, completion arrives later through the channel link.
pub trait BusPeripheral {
    /// Enable the peripheral clock
    fn enable_clock(&mut self);

    /// Disable the peripheral clock
    fn disable_clock(&mut self);

    /// Set the priority of the peripheral interrupt line(s)
    fn set_irq_priority(&mut self, priority: u8);

    /// Unmask the peripheral interrupt line(s)
    fn enable_irq(&mut self);

    /// Mask the peripheral interrupt line(s)
    fn disable_irq(&mut self);

    /// Initialise the peripheral with a configuration
    fn init(&mut self, config: &PeripheralConfig) -> Result<(), HalStatus>;

    /// Configure acceptance filtering (bus types that have it)
    fn configure_filter(&mut self) -> Result<(), HalStatus> {
        Ok(())
    }

    /// Return the peripheral to its reset state
    fn deinit(&mut self);

    /// Arm an asynchronous receive
    fn start_receive(&mut self) -> Result<(), HalStatus>;

    /// Start an asynchronous transmit of `data`
    fn start_transmit(&mut self, data: &[u8]) -> Result<(), HalStatus>;
}

/// Sequencer around a [`BusPeripheral`]
pub struct InterfaceGate<B> {
    peripheral: B,
    active: Option<PeripheralConfig>,
}

impl<B: BusPeripheral> InterfaceGate<B> {
    /// Wrap a peripheral (assumed disabled)
    #[must_use]
    pub const fn new(peripheral: B) -> Self {
        Self {
            peripheral,
            active: None,
        }
    }

    /// Bring the peripheral up with `config`
    pub fn enable(&mut self, config: &PeripheralConfig) -> ChannelResult<()> {
        self.peripheral.enable_clock();
        self.peripheral.set_irq_priority(LOWEST_APP_IRQ_PRIORITY);
        self.peripheral.enable_irq();

        if let Err(status) = self.bring_up(config) {
            warn!("gate: enable failed with {}, tearing down", status);
            self.teardown();
            return Err(ChannelError::HardwareInit(status));
        }

        self.active = Some(*config);
        debug!("gate: enabled {}", config);
        Ok(())
    }

    /// Shut the peripheral down
    pub fn disable(&mut self) {
        self.teardown();
        debug!("gate: disabled");
    }

    /// Check if the peripheral is up
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    /// Configuration the peripheral is currently running with
    #[must_use]
    pub const fn active_config(&self) -> Option<PeripheralConfig> {
        self.active
    }

    /// Borrow the peripheral
    pub fn peripheral(&self) -> &B {
        &self.peripheral
    }

    /// Mutably borrow the peripheral
    pub fn peripheral_mut(&mut self) -> &mut B {
        &mut self.peripheral
    }

    fn bring_up(&mut self, config: &PeripheralConfig) -> Result<(), HalStatus> {
        self.peripheral.init(config)?;
        self.peripheral.configure_filter()?;
        if config.mode.includes_receive() {
            self.peripheral.start_receive()?;
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.peripheral.disable_irq();
        self.peripheral.deinit();
        self.peripheral.disable_clock();
        self.active = None;
    }
}
