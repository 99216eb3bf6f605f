//! Persistent byte-log store
//!
//! Received bytes are appended to a flash log, one region per buffered
//! channel. The channel only erases a sector at (re)initialisation and then
//! writes single bytes at a monotonically increasing address.

/// Byte-addressed log storage
pub trait ByteStore {
    /// Driver error
    type Error;

    /// Erase the sector containing `address`
    fn erase_sector(&mut self, address: u32) -> Result<(), Self::Error>;

    /// Program one byte
    fn write_byte(&mut self, address: u32, byte: u8) -> Result<(), Self::Error>;

    /// Program a run of bytes starting at `address`
    fn write_buffer(&mut self, data: &[u8], address: u32) -> Result<(), Self::Error>;
}

impl<S: ByteStore + ?Sized> ByteStore for &mut S {
    type Error = S::Error;

    fn erase_sector(&mut self, address: u32) -> Result<(), Self::Error> {
        (**self).erase_sector(address)
    }

    fn write_byte(&mut self, address: u32, byte: u8) -> Result<(), Self::Error> {
        (**self).write_byte(address, byte)
    }

    fn write_buffer(&mut self, data: &[u8], address: u32) -> Result<(), Self::Error> {
        (**self).write_buffer(data, address)
    }
}

/// Outcome of flushing one receive buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Address of the first byte
    pub start: u32,
    /// Bytes handed to the store
    pub written: usize,
    /// Bytes the store reported as failed
    pub failed: usize,
    /// Bytes not written because the log region is full
    pub discarded: usize,
}

#[cfg(feature = "embedded")]
impl defmt::Format for FlushReport {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Flush(@{=u32:#x}, {} bytes, {} failed, {} discarded)",
            self.start,
            self.written,
            self.failed,
            self.discarded
        );
    }
}

/// Write `data` one byte at a time from `start`
///
/// Failed bytes are counted but do not stop the flush, so every byte keeps
/// the address it would have had on a clean write.
pub fn write_bytewise<S: ByteStore>(store: &mut S, start: u32, data: &[u8]) -> FlushReport {
    let mut report = FlushReport {
        start,
        ..FlushReport::default()
    };

    let mut address = start;
    for &byte in data {
        if store.write_byte(address, byte).is_err() {
            report.failed += 1;
        }
        report.written += 1;
        address = address.wrapping_add(1);
    }

    report
}
