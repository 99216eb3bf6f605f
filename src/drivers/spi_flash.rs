//! SPI NOR Flash Driver
//!
//! Log storage on a W25Q-class serial flash. Implements [`ByteStore`] on top
//! of any blocking `SpiDevice`, so the same driver runs against the on-board
//! SPI bus and against a mock in host tests.

use embedded_hal::spi::{Operation, SpiDevice};

use crate::storage::ByteStore;

/// Flash command opcodes
mod cmd {
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const READ_STATUS_1: u8 = 0x05;
    pub const READ_DATA: u8 = 0x03;
    pub const PAGE_PROGRAM: u8 = 0x02;
    pub const SECTOR_ERASE_4K: u8 = 0x20;
    pub const JEDEC_ID: u8 = 0x9F;
}

/// Status register 1: erase/program in progress
const STATUS_BUSY: u8 = 0x01;

/// Program page size
pub const PAGE_SIZE: u32 = 256;

/// Erase sector size
pub const SECTOR_SIZE: u32 = 4096;

/// Driver errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashError<E> {
    /// SPI transfer failed
    Spi(E),
    /// Chip stayed busy past the poll limit
    Timeout,
}

#[cfg(feature = "embedded")]
impl<E> defmt::Format for FlashError<E> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Spi(_) => defmt::write!(f, "Spi"),
            Self::Timeout => defmt::write!(f, "Timeout"),
        }
    }
}

/// JEDEC identification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JedecId {
    /// Manufacturer (0xEF for Winbond)
    pub manufacturer: u8,
    /// Memory type
    pub memory_type: u8,
    /// Capacity code (log2 of size in bytes)
    pub capacity: u8,
}

impl JedecId {
    /// Device size in bytes
    #[must_use]
    pub const fn size_bytes(&self) -> u32 {
        if self.capacity >= 32 {
            u32::MAX
        } else {
            1 << self.capacity
        }
    }
}

/// W25Q-class flash on an SPI device
pub struct SpiFlash<SPI> {
    spi: SPI,
    busy_poll_limit: u32,
}

impl<SPI: SpiDevice> SpiFlash<SPI> {
    /// Default number of status reads before giving up
    pub const DEFAULT_BUSY_POLL_LIMIT: u32 = 100_000;

    /// Create a driver
    #[must_use]
    pub const fn new(spi: SPI) -> Self {
        Self {
            spi,
            busy_poll_limit: Self::DEFAULT_BUSY_POLL_LIMIT,
        }
    }

    /// Override the busy poll limit
    #[must_use]
    pub const fn with_busy_poll_limit(mut self, limit: u32) -> Self {
        self.busy_poll_limit = limit;
        self
    }

    /// Release the SPI device
    pub fn release(self) -> SPI {
        self.spi
    }

    /// Read the JEDEC id
    pub fn jedec_id(&mut self) -> Result<JedecId, FlashError<SPI::Error>> {
        let mut id = [0u8; 3];
        self.spi
            .transaction(&mut [Operation::Write(&[cmd::JEDEC_ID]), Operation::Read(&mut id)])
            .map_err(FlashError::Spi)?;
        Ok(JedecId {
            manufacturer: id[0],
            memory_type: id[1],
            capacity: id[2],
        })
    }

    /// Read bytes starting at `address`
    pub fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), FlashError<SPI::Error>> {
        let header = Self::command(cmd::READ_DATA, address);
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Read(buffer)])
            .map_err(FlashError::Spi)
    }

    /// Read status register 1
    pub fn status(&mut self) -> Result<u8, FlashError<SPI::Error>> {
        let mut status = [0u8];
        self.spi
            .transaction(&mut [
                Operation::Write(&[cmd::READ_STATUS_1]),
                Operation::Read(&mut status),
            ])
            .map_err(FlashError::Spi)?;
        Ok(status[0])
    }

    fn command(opcode: u8, address: u32) -> [u8; 4] {
        let [_, a2, a1, a0] = address.to_be_bytes();
        [opcode, a2, a1, a0]
    }

    fn write_enable(&mut self) -> Result<(), FlashError<SPI::Error>> {
        self.spi
            .write(&[cmd::WRITE_ENABLE])
            .map_err(FlashError::Spi)
    }

    fn wait_ready(&mut self) -> Result<(), FlashError<SPI::Error>> {
        for _ in 0..self.busy_poll_limit {
            if self.status()? & STATUS_BUSY == 0 {
                return Ok(());
            }
        }
        Err(FlashError::Timeout)
    }

    /// Program up to one page; `data` must not cross a page boundary
    fn program_page(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError<SPI::Error>> {
        self.write_enable()?;
        let header = Self::command(cmd::PAGE_PROGRAM, address);
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Write(data)])
            .map_err(FlashError::Spi)?;
        self.wait_ready()
    }
}

impl<SPI: SpiDevice> ByteStore for SpiFlash<SPI> {
    type Error = FlashError<SPI::Error>;

    fn erase_sector(&mut self, address: u32) -> Result<(), Self::Error> {
        let sector = address - address % SECTOR_SIZE;
        self.write_enable()?;
        self.spi
            .write(&Self::command(cmd::SECTOR_ERASE_4K, sector))
            .map_err(FlashError::Spi)?;
        self.wait_ready()
    }

    fn write_byte(&mut self, address: u32, byte: u8) -> Result<(), Self::Error> {
        self.program_page(address, &[byte])
    }

    fn write_buffer(&mut self, data: &[u8], address: u32) -> Result<(), Self::Error> {
        let mut address = address;
        let mut rest = data;
        while !rest.is_empty() {
            let room = (PAGE_SIZE - address % PAGE_SIZE) as usize;
            let (chunk, tail) = rest.split_at(room.min(rest.len()));
            self.program_page(address, chunk)?;
            address = address.wrapping_add(chunk.len() as u32);
            rest = tail;
        }
        Ok(())
    }
}
