//! Receive Double-Buffer Pipeline
//!
//! Received bytes land in one of two fixed buffers. The first byte into an
//! idle buffer arms that buffer's one-shot flush timer; when it expires the
//! buffer is marked `Reading`, written out to the log store and handed back
//! as an empty `Writing` buffer. The timer measures the quiet period since the
//! first byte and is not restarted by later bytes.
//!
//! A `Reading` buffer is never touched by the receive path; bytes go to the
//! other buffer, and are dropped if that one is unavailable too.

use crate::channel::relay::elapsed_ms;
use crate::error::{ChannelError, ChannelResult};

/// Ownership state of a receive buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BufferState {
    /// Receive path may append
    #[default]
    Writing,
    /// Being flushed; receive path keeps out
    Reading,
}

#[cfg(feature = "embedded")]
impl defmt::Format for BufferState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Writing => defmt::write!(f, "Writing"),
            Self::Reading => defmt::write!(f, "Reading"),
        }
    }
}

/// One half of the double buffer
#[derive(Clone, Debug)]
pub struct ReceiveBuffer<const N: usize> {
    data: [u8; N],
    count: usize,
    state: BufferState,
    /// Armed flush timer as (armed at, quiet period)
    timer: Option<(u64, u32)>,
}

impl<const N: usize> ReceiveBuffer<N> {
    /// Create an empty buffer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: [0; N],
            count: 0,
            state: BufferState::Writing,
            timer: None,
        }
    }

    /// Number of bytes held
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Check if empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if no room is left
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.count >= N
    }

    /// Ownership state
    #[must_use]
    pub const fn state(&self) -> BufferState {
        self.state
    }

    /// Check if the flush timer is running
    #[must_use]
    pub const fn timer_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Held bytes
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data[..self.count]
    }

    /// Check if the receive path may append
    #[must_use]
    pub const fn accepts(&self) -> bool {
        matches!(self.state, BufferState::Writing) && !self.is_full()
    }

    fn deadline(&self) -> Option<u64> {
        self.timer
            .map(|(armed_at, quiet)| armed_at.wrapping_add(u64::from(quiet)))
    }

    fn is_due(&self, now_ms: u64) -> bool {
        self.timer
            .is_some_and(|(armed_at, quiet)| elapsed_ms(now_ms, armed_at) >= u64::from(quiet))
    }

    fn reset(&mut self) {
        self.count = 0;
        self.state = BufferState::Writing;
        self.timer = None;
    }
}

impl<const N: usize> Default for ReceiveBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of feeding one byte to the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RxOutcome {
    /// Byte stored
    Stored {
        /// Buffer index (0 or 1)
        buffer: usize,
        /// Deadline of a flush timer armed by this byte
        armed: Option<u64>,
    },
    /// No buffer available; byte lost
    Dropped,
}

impl RxOutcome {
    /// Flush deadline armed by the byte, or the overrun error
    pub const fn check(self) -> ChannelResult<Option<u64>> {
        match self {
            Self::Stored { armed, .. } => Ok(armed),
            Self::Dropped => Err(ChannelError::BufferOverrun),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for RxOutcome {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Stored { buffer, armed } => defmt::write!(f, "Stored({}, {})", buffer, armed),
            Self::Dropped => defmt::write!(f, "Dropped"),
        }
    }
}

/// Two alternating receive buffers with their flush timers
#[derive(Clone, Debug)]
pub struct RxPipeline<const N: usize> {
    buffers: [ReceiveBuffer<N>; 2],
    quiet_ms: u32,
}

impl<const N: usize> RxPipeline<N> {
    /// Create a pipeline flushing `quiet_ms` after the first byte
    #[must_use]
    pub const fn new(quiet_ms: u32) -> Self {
        Self {
            buffers: [ReceiveBuffer::new(), ReceiveBuffer::new()],
            quiet_ms,
        }
    }

    /// Capacity of each buffer
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Store one byte (interrupt context)
    pub fn on_byte(&mut self, byte: u8, now_ms: u64) -> RxOutcome {
        let Some(index) = self.buffers.iter().position(ReceiveBuffer::accepts) else {
            return RxOutcome::Dropped;
        };

        let quiet_ms = self.quiet_ms;
        let buffer = &mut self.buffers[index];
        buffer.data[buffer.count] = byte;
        buffer.count += 1;

        let armed = if buffer.timer.is_none() {
            buffer.timer = Some((now_ms, quiet_ms));
            buffer.deadline()
        } else {
            None
        };

        RxOutcome::Stored {
            buffer: index,
            armed,
        }
    }

    /// Earliest armed flush deadline
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.buffers
            .iter()
            .filter(|b| matches!(b.state, BufferState::Writing))
            .filter_map(ReceiveBuffer::deadline)
            .min()
    }

    /// Claim a buffer whose timer has expired
    ///
    /// The buffer is switched to `Reading` and its timer disarmed; call
    /// [`Self::finish_flush`] once its contents are persisted.
    pub fn take_due(&mut self, now_ms: u64) -> Option<usize> {
        let index = self
            .buffers
            .iter()
            .position(|b| matches!(b.state, BufferState::Writing) && b.is_due(now_ms))?;
        let buffer = &mut self.buffers[index];
        buffer.state = BufferState::Reading;
        buffer.timer = None;
        Some(index)
    }

    /// Hand a flushed buffer back to the receive path
    pub fn finish_flush(&mut self, index: usize) {
        if let Some(buffer) = self.buffers.get_mut(index) {
            buffer.reset();
        }
    }

    /// Borrow a buffer
    #[must_use]
    pub fn buffer(&self, index: usize) -> Option<&ReceiveBuffer<N>> {
        self.buffers.get(index)
    }

    /// Discard everything and return both buffers to empty `Writing`
    pub fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.reset();
        }
    }
}
