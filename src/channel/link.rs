//! State shared between a channel's task side and its interrupt handlers
//!
//! A `ChannelLink` lives in a `static` so interrupt trampolines can reach it
//! without going through the task-owned controller. Interrupt handlers only
//! ever give the token, append to the receive pipeline and bump counters;
//! nothing here blocks.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;
use heapless::Vec;

use crate::channel::profile::ChannelProfile;
use crate::channel::rx::{RxOutcome, RxPipeline};
use crate::channel::tx::{TxStats, TxToken};
use crate::config::{LOG_REGION_SIZE, RX_FLUSH_QUIET_MS};
use crate::storage::{write_bytewise, ByteStore, FlushReport};
use crate::types::ChannelId;

/// Interrupt-shared half of a channel
pub struct ChannelLink<const RX: usize> {
    id: ChannelId,
    token: TxToken,
    tx_stats: TxStats,
    rx: Mutex<RefCell<Option<RxPipeline<RX>>>>,
    rx_releases_tx_token: bool,
    write_cursor: AtomicU32,
    log_end: AtomicU32,
    log_discarded: AtomicU32,
    rx_bytes: AtomicU32,
    overruns: AtomicU32,
    peripheral_errors: AtomicU32,
}

impl<const RX: usize> ChannelLink<RX> {
    /// Create the link for a channel profile
    #[must_use]
    pub const fn new(profile: &ChannelProfile) -> Self {
        let pipeline = if profile.has_buffered_rx() {
            Some(RxPipeline::new(RX_FLUSH_QUIET_MS))
        } else {
            None
        };
        let base = match profile.flash_base {
            Some(base) => base,
            None => 0,
        };

        Self {
            id: profile.id,
            token: TxToken::new(),
            tx_stats: TxStats::new(),
            rx: Mutex::new(RefCell::new(pipeline)),
            rx_releases_tx_token: profile.rx_releases_tx_token,
            write_cursor: AtomicU32::new(base),
            log_end: AtomicU32::new(base.saturating_add(LOG_REGION_SIZE)),
            log_discarded: AtomicU32::new(0),
            rx_bytes: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
            peripheral_errors: AtomicU32::new(0),
        }
    }

    /// Channel identity
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    /// Transmit token
    #[must_use]
    pub const fn token(&self) -> &TxToken {
        &self.token
    }

    /// Transmit counters
    #[must_use]
    pub const fn tx_stats(&self) -> &TxStats {
        &self.tx_stats
    }

    /// Check if received bytes are buffered for the log
    #[must_use]
    pub fn has_buffered_rx(&self) -> bool {
        critical_section::with(|cs| self.rx.borrow_ref(cs).is_some())
    }

    // Interrupt context ------------------------------------------------------

    /// A byte arrived (interrupt context)
    ///
    /// Returns `None` for channels that do not log received data. The caller
    /// re-arms the next receive regardless of the outcome.
    pub fn on_rx_byte(&self, byte: u8, now_ms: u64) -> Option<RxOutcome> {
        self.rx_bytes.fetch_add(1, Ordering::Relaxed);

        let outcome = critical_section::with(|cs| {
            self.rx
                .borrow_ref_mut(cs)
                .as_mut()
                .map(|pipeline| pipeline.on_byte(byte, now_ms))
        });

        if outcome == Some(RxOutcome::Dropped) {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }

        // Receive and transmit share one token on these channels; a finished
        // receive frees a transmit slot even if a transmit is still running.
        if self.rx_releases_tx_token {
            self.token.give();
        }

        outcome
    }

    /// Transmit finished (interrupt context)
    pub fn on_tx_complete(&self) {
        self.token.give();
    }

    /// Peripheral reported an error (interrupt context)
    ///
    /// The failed transmission is not retried.
    pub fn on_peripheral_error(&self) {
        self.peripheral_errors.fetch_add(1, Ordering::Relaxed);
        self.token.give();
    }

    // Task context -----------------------------------------------------------

    /// Earliest pending flush deadline
    #[must_use]
    pub fn next_flush_deadline(&self) -> Option<u64> {
        critical_section::with(|cs| {
            self.rx
                .borrow_ref(cs)
                .as_ref()
                .and_then(RxPipeline::next_deadline)
        })
    }

    /// Flush one expired receive buffer to the store
    ///
    /// Must only be called from one task per channel; the store sees a
    /// single sequential writer.
    pub fn flush_due<S: ByteStore>(&self, now_ms: u64, store: &mut S) -> Option<FlushReport> {
        let (index, bytes) = critical_section::with(|cs| {
            let mut rx = self.rx.borrow_ref_mut(cs);
            let pipeline = rx.as_mut()?;
            let index = pipeline.take_due(now_ms)?;
            let mut bytes: Vec<u8, RX> = Vec::new();
            if let Some(buffer) = pipeline.buffer(index) {
                // Same capacity on both sides
                let _ = bytes.extend_from_slice(buffer.contents());
            }
            Some((index, bytes))
        })?;

        let start = self.write_cursor.load(Ordering::Acquire);
        let room = self.log_end.load(Ordering::Acquire).saturating_sub(start) as usize;
        let fits = bytes.len().min(room);
        let mut report = write_bytewise(store, start, &bytes[..fits]);
        report.discarded = bytes.len() - fits;
        self.write_cursor
            .store(start.wrapping_add(report.written as u32), Ordering::Release);
        if report.discarded > 0 {
            self.log_discarded
                .fetch_add(report.discarded as u32, Ordering::Relaxed);
            warn!("{}: log full, {} bytes discarded", self.id, report.discarded);
        }

        critical_section::with(|cs| {
            if let Some(pipeline) = self.rx.borrow_ref_mut(cs).as_mut() {
                pipeline.finish_flush(index);
            }
        });

        if report.failed > 0 {
            warn!("{}: {} of {} bytes failed to write", self.id, report.failed, report.written);
        } else {
            trace!("{}: flushed {}", self.id, report);
        }
        Some(report)
    }

    /// Flush every expired buffer, returning the number of bytes written
    pub fn flush_all_due<S: ByteStore>(&self, now_ms: u64, store: &mut S) -> usize {
        let mut total = 0;
        while let Some(report) = self.flush_due(now_ms, store) {
            total += report.written;
        }
        total
    }

    /// Current flash write address
    #[must_use]
    pub fn current_write_address(&self) -> u32 {
        self.write_cursor.load(Ordering::Acquire)
    }

    /// Move the write cursor after erasing the log region
    pub fn rebase(&self, base: u32) {
        self.log_end
            .store(base.saturating_add(LOG_REGION_SIZE), Ordering::Release);
        self.write_cursor.store(base, Ordering::Release);
    }

    /// End of the erased log region (exclusive)
    #[must_use]
    pub fn log_end(&self) -> u32 {
        self.log_end.load(Ordering::Acquire)
    }

    /// Received bytes not logged because the log region was full
    #[must_use]
    pub fn log_discarded(&self) -> u32 {
        self.log_discarded.load(Ordering::Relaxed)
    }

    /// Discard all buffered receive data
    pub fn reset_rx(&self) {
        critical_section::with(|cs| {
            if let Some(pipeline) = self.rx.borrow_ref_mut(cs).as_mut() {
                pipeline.reset();
            }
        });
    }

    /// Bytes currently buffered in each receive buffer
    #[must_use]
    pub fn buffered(&self) -> [usize; 2] {
        critical_section::with(|cs| {
            let rx = self.rx.borrow_ref(cs);
            let count = |i| {
                rx.as_ref()
                    .and_then(|p| p.buffer(i))
                    .map_or(0, |b| b.len())
            };
            [count(0), count(1)]
        })
    }

    /// Bytes received since boot
    #[must_use]
    pub fn rx_bytes(&self) -> u32 {
        self.rx_bytes.load(Ordering::Relaxed)
    }

    /// Bytes dropped because both buffers were unavailable
    #[must_use]
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Error interrupts seen
    #[must_use]
    pub fn peripheral_errors(&self) -> u32 {
        self.peripheral_errors.load(Ordering::Relaxed)
    }
}
