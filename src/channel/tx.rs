//! Transmit Arbiter
//!
//! One transmission in flight per channel. The requester takes the token
//! before touching the scratch buffer; the transmit-complete (or error)
//! interrupt gives it back. The requester never releases it on the success
//! path.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

use crate::channel::gate::BusPeripheral;
use crate::error::{ChannelError, ChannelResult};

/// How transmit contention is surfaced to the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxReporting {
    /// Busy and driver errors are returned to the caller
    Reported,
    /// Busy requests are dropped silently and counted
    FireAndForget,
}

#[cfg(feature = "embedded")]
impl defmt::Format for TxReporting {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Reported => defmt::write!(f, "Reported"),
            Self::FireAndForget => defmt::write!(f, "FireAndForget"),
        }
    }
}

/// Single-permit ownership token, releasable from interrupt context
#[derive(Debug)]
pub struct TxToken {
    held: AtomicBool,
}

impl TxToken {
    /// Create a free token
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Take the token if it is free
    pub fn try_take(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the token (never blocks)
    pub fn give(&self) {
        self.held.store(false, Ordering::Release);
    }

    /// Check if someone holds the token
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Take the token, waiting at most `timeout_ms`
    pub async fn take_within<D: DelayNs>(&self, delay: &mut D, timeout_ms: u32) -> bool {
        let mut waited_ms = 0;
        loop {
            if self.try_take() {
                return true;
            }
            if waited_ms >= timeout_ms {
                return false;
            }
            delay.delay_ms(crate::config::TOKEN_POLL_MS).await;
            waited_ms += crate::config::TOKEN_POLL_MS;
        }
    }
}

impl Default for TxToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Transmit counters
#[derive(Debug, Default)]
pub struct TxStats {
    dropped: AtomicU32,
    truncated: AtomicU32,
}

impl TxStats {
    /// Create zeroed counters
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dropped: AtomicU32::new(0),
            truncated: AtomicU32::new(0),
        }
    }

    /// Requests dropped because the token was not free in time
    #[must_use]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Requests cut down to the scratch capacity
    #[must_use]
    pub fn truncated(&self) -> u32 {
        self.truncated.load(Ordering::Relaxed)
    }
}

/// Scratch buffer and transmit sequencing of one channel
pub struct TransmitArbiter<const N: usize> {
    scratch: Vec<u8, N>,
    reporting: TxReporting,
    timeout_ms: u32,
}

impl<const N: usize> TransmitArbiter<N> {
    /// Create an arbiter
    #[must_use]
    pub const fn new(reporting: TxReporting, timeout_ms: u32) -> Self {
        Self {
            scratch: Vec::new(),
            reporting,
            timeout_ms,
        }
    }

    /// Reporting policy
    #[must_use]
    pub const fn reporting(&self) -> TxReporting {
        self.reporting
    }

    /// Bytes of the last transmission handed to the driver
    #[must_use]
    pub fn scratch(&self) -> &[u8] {
        &self.scratch
    }

    /// Take the token, copy `data` into the scratch buffer and start the
    /// hardware transmit
    pub async fn transmit<B, D>(
        &mut self,
        token: &TxToken,
        stats: &TxStats,
        peripheral: &mut B,
        delay: &mut D,
        data: &[u8],
    ) -> ChannelResult<()>
    where
        B: BusPeripheral,
        D: DelayNs,
    {
        if data.is_empty() {
            return Ok(());
        }

        if !token.take_within(delay, self.timeout_ms).await {
            return match self.reporting {
                TxReporting::Reported => {
                    debug!("tx: token busy, {} bytes refused", data.len());
                    Err(ChannelError::TransmitBusy)
                }
                TxReporting::FireAndForget => {
                    stats.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("tx: token busy, {} bytes dropped", data.len());
                    Ok(())
                }
            };
        }

        let len = data.len().min(N);
        if len < data.len() {
            stats.truncated.fetch_add(1, Ordering::Relaxed);
            warn!("tx: {} bytes truncated to {}", data.len(), len);
        }
        self.scratch.clear();
        // Cannot fail, `len` is bounded by the capacity
        let _ = self.scratch.extend_from_slice(&data[..len]);

        match peripheral.start_transmit(&self.scratch) {
            Ok(()) => Ok(()),
            Err(status) => {
                // No completion interrupt will follow
                token.give();
                warn!("tx: driver refused transmit: {}", status);
                match self.reporting {
                    TxReporting::Reported => Err(ChannelError::Transmit(status)),
                    TxReporting::FireAndForget => Ok(()),
                }
            }
        }
    }
}
