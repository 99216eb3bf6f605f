//! Port Adapter
//!
//! Bridges the synchronous [`BusPeripheral`] calls of the channel controller
//! to an embassy driver running in its own pump task. The controller stages
//! open/close requests and queues transmit frames; the pump task owns the
//! peripheral singletons, builds the driver on open and drops it on close.

use embassy_stm32::interrupt::{Interrupt, InterruptExt, Priority};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use heapless::Vec;

use crate::channel::{BusPeripheral, PeripheralConfig};
use crate::types::{ChannelId, HalStatus};

/// Lifecycle request for a pump task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortRequest {
    /// Build the driver with this configuration and start serving
    Open(PeripheralConfig),
    /// Drop the driver
    Close,
}

impl defmt::Format for PortRequest {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Open(config) => defmt::write!(f, "Open({})", config),
            Self::Close => defmt::write!(f, "Close"),
        }
    }
}

/// Shared state between a port adapter and its pump task
pub struct PortControl<const TX: usize> {
    requests: Signal<CriticalSectionRawMutex, PortRequest>,
    frames: Channel<CriticalSectionRawMutex, Vec<u8, TX>, 1>,
}

impl<const TX: usize> PortControl<TX> {
    /// Create an idle control block
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requests: Signal::new(),
            frames: Channel::new(),
        }
    }

    /// Wait for the next lifecycle request (pump side)
    ///
    /// Only the latest request is kept, so a close followed by an open before
    /// the pump runs is seen as the open alone.
    pub async fn request(&self) -> PortRequest {
        self.requests.wait().await
    }

    /// Wait for the next frame to send (pump side)
    pub async fn next_frame(&self) -> Vec<u8, TX> {
        self.frames.receive().await
    }

    fn discard_frames(&self) {
        self.frames.clear();
    }
}

impl<const TX: usize> Default for PortControl<TX> {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates a configuration before it is sent to the pump task
pub type ConfigCheck = fn(&PeripheralConfig) -> Result<(), HalStatus>;

/// [`BusPeripheral`] implementation backed by a pump task
pub struct PortAdapter<const TX: usize> {
    id: ChannelId,
    control: &'static PortControl<TX>,
    irqs: &'static [Interrupt],
    check: ConfigCheck,
    clocked: bool,
    open: bool,
}

impl<const TX: usize> PortAdapter<TX> {
    /// Create an adapter for a channel
    #[must_use]
    pub const fn new(
        id: ChannelId,
        control: &'static PortControl<TX>,
        irqs: &'static [Interrupt],
        check: ConfigCheck,
    ) -> Self {
        Self {
            id,
            control,
            irqs,
            check,
            clocked: false,
            open: false,
        }
    }

    /// Check if the pump has been told to serve
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }
}

impl<const TX: usize> BusPeripheral for PortAdapter<TX> {
    fn enable_clock(&mut self) {
        // RCC gating happens when the pump builds the driver
        self.clocked = true;
    }

    fn disable_clock(&mut self) {
        self.clocked = false;
    }

    fn set_irq_priority(&mut self, priority: u8) {
        for irq in self.irqs {
            irq.set_priority(Priority::from(priority << 4));
        }
    }

    fn enable_irq(&mut self) {
        // Unmasked by the driver constructor
        trace!("{}: irq enable deferred to driver", self.id);
    }

    fn disable_irq(&mut self) {
        for irq in self.irqs {
            irq.disable();
        }
    }

    fn init(&mut self, config: &PeripheralConfig) -> Result<(), HalStatus> {
        if !self.clocked {
            return Err(HalStatus::Error);
        }
        (self.check)(config)?;

        self.control.discard_frames();
        self.control.requests.signal(PortRequest::Open(*config));
        self.open = true;
        debug!("{}: open {}", self.id, config);
        Ok(())
    }

    fn deinit(&mut self) {
        if self.open {
            self.control.requests.signal(PortRequest::Close);
            self.control.discard_frames();
            self.open = false;
            debug!("{}: closed", self.id);
        }
    }

    fn start_receive(&mut self) -> Result<(), HalStatus> {
        // The pump reads whenever the configured mode includes receive
        if self.open {
            Ok(())
        } else {
            Err(HalStatus::Error)
        }
    }

    fn start_transmit(&mut self, data: &[u8]) -> Result<(), HalStatus> {
        if !self.open {
            return Err(HalStatus::Error);
        }
        let frame = Vec::from_slice(data).map_err(|()| HalStatus::Error)?;
        self.control
            .frames
            .try_send(frame)
            .map_err(|_| HalStatus::Busy)
    }
}
