//! SPI Device Wrapper
//!
//! Pairs the blocking SPI2 bus with the flash chip-select line so the flash
//! driver sees a single `SpiDevice`. The bus has no other users.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{ErrorType, Operation, SpiBus, SpiDevice};

/// Exclusive SPI device with a push-pull chip select
pub struct ChipSelectDevice<BUS, CS> {
    bus: BUS,
    cs: CS,
}

impl<BUS, CS> ChipSelectDevice<BUS, CS>
where
    CS: OutputPin<Error = Infallible>,
{
    /// Wrap a bus and deselect the device
    pub fn new(bus: BUS, mut cs: CS) -> Self {
        cs.set_high().unwrap_or_else(|never| match never {});
        Self { bus, cs }
    }
}

impl<BUS, CS> ErrorType for ChipSelectDevice<BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin<Error = Infallible>,
{
    type Error = BUS::Error;
}

impl<BUS, CS> SpiDevice for ChipSelectDevice<BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin<Error = Infallible>,
{
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        self.cs.set_low().unwrap_or_else(|never| match never {});

        let result = operations.iter_mut().try_for_each(|op| match op {
            Operation::Read(buf) => self.bus.read(buf),
            Operation::Write(buf) => self.bus.write(buf),
            Operation::Transfer(read, write) => self.bus.transfer(read, write),
            Operation::TransferInPlace(buf) => self.bus.transfer_in_place(buf),
            // Flash commands never ask for inter-operation delays
            Operation::DelayNs(_) => Ok(()),
        });
        let result = result.and_then(|()| self.bus.flush());

        self.cs.set_high().unwrap_or_else(|never| match never {});
        result
    }
}
