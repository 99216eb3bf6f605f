//! Periodic Workers
//!
//! Each channel runs one worker that owns its [`Channel`] controller. The
//! worker serves setter commands from the GUI side and, on a fixed cadence,
//! injects the profile's diagnostic payload while the channel is in
//! `DebugTx` mode. Buffered channels get a second worker that drains expired
//! receive buffers to the flash log.
//!
//! The cadence and command handling are plain code so they run on the host;
//! the embassy loops around them live in [`tasks`].

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

use crate::channel::{BusPeripheral, Channel, ChannelProfile, ChannelSettings, Clock};
use crate::config::UART_TX_BUFFER_SIZE;
use crate::error::ChannelResult;
use crate::types::{Connection, PowerLevel, Termination};

/// Absolute-time schedule of debug transmissions
///
/// Deadlines are multiples of the period from the start time, so a slow
/// iteration never shifts later ones. Ticks missed entirely are skipped
/// rather than replayed in a burst.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebugCadence {
    period_ms: u32,
    next_ms: u64,
}

impl DebugCadence {
    /// First tick one period after `start_ms`
    #[must_use]
    pub const fn new(period_ms: u32, start_ms: u64) -> Self {
        let period_ms = if period_ms == 0 { 1 } else { period_ms };
        Self {
            period_ms,
            next_ms: start_ms + period_ms as u64,
        }
    }

    /// Cadence configured for a channel
    #[must_use]
    pub const fn for_profile(profile: &ChannelProfile, start_ms: u64) -> Self {
        Self::new(profile.debug_period_ms, start_ms)
    }

    /// Period in milliseconds
    #[must_use]
    pub const fn period_ms(&self) -> u32 {
        self.period_ms
    }

    /// Next deadline
    #[must_use]
    pub const fn deadline(&self) -> u64 {
        self.next_ms
    }

    /// Check if the next deadline has passed
    #[must_use]
    pub const fn is_due(&self, now_ms: u64) -> bool {
        now_ms >= self.next_ms
    }

    /// Move to the first deadline after `now_ms`, returning the ticks skipped
    pub fn advance(&mut self, now_ms: u64) -> u32 {
        let period = u64::from(self.period_ms);
        self.next_ms += period;
        if now_ms < self.next_ms {
            return 0;
        }

        let behind = (now_ms - self.next_ms) / period + 1;
        self.next_ms += behind * period;
        u32::try_from(behind).unwrap_or(u32::MAX)
    }
}

/// Request from the GUI side to a channel worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Switch the connector relay
    SetConnection(Connection),
    /// Select the connector supply
    SetPower(PowerLevel),
    /// Switch bus termination
    SetTermination(Termination),
    /// Replace the settings record
    SetSettings(ChannelSettings),
    /// Send bytes on the channel
    Transmit(Vec<u8, UART_TX_BUFFER_SIZE>),
    /// Log a status readback
    ReportStatus,
}

#[cfg(feature = "embedded")]
impl defmt::Format for ChannelCommand {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::SetConnection(c) => defmt::write!(f, "SetConnection({})", c),
            Self::SetPower(p) => defmt::write!(f, "SetPower({})", p),
            Self::SetTermination(t) => defmt::write!(f, "SetTermination({})", t),
            Self::SetSettings(s) => defmt::write!(f, "SetSettings({})", s),
            Self::Transmit(data) => defmt::write!(f, "Transmit({} bytes)", data.len()),
            Self::ReportStatus => defmt::write!(f, "ReportStatus"),
        }
    }
}

/// Run one command against a channel
pub async fn apply_command<P, B, C, D, const RX: usize, const TX: usize>(
    channel: &mut Channel<'_, P, B, C, D, RX, TX>,
    command: ChannelCommand,
) -> ChannelResult<()>
where
    P: OutputPin<Error = Infallible>,
    B: BusPeripheral,
    C: Clock,
    D: DelayNs,
{
    match command {
        ChannelCommand::SetConnection(connection) => channel.set_connection(connection),
        ChannelCommand::SetPower(level) => channel.set_power(level),
        ChannelCommand::SetTermination(termination) => channel.set_termination(termination),
        ChannelCommand::SetSettings(settings) => channel.set_settings(settings),
        ChannelCommand::Transmit(data) => channel.transmit(&data).await,
        ChannelCommand::ReportStatus => {
            let status = channel.status();
            info!("{}", status);
            Ok(())
        }
    }
}

/// Embassy worker loops
#[cfg(feature = "embedded")]
pub mod tasks {
    use core::convert::Infallible;

    use embassy_futures::select::{select, Either};
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::channel::Channel as Queue;
    use embassy_sync::signal::Signal;
    use embassy_time::{Instant, Timer};
    use embedded_hal::digital::OutputPin;
    use embedded_hal_async::delay::DelayNs;

    use super::{apply_command, ChannelCommand, DebugCadence};
    use crate::channel::{BusPeripheral, Channel, ChannelLink, Clock};
    use crate::storage::ByteStore;

    /// Depth of each channel's command queue
    pub const COMMAND_QUEUE_DEPTH: usize = 4;

    /// Command queue feeding one channel worker
    pub type CommandQueue = Queue<CriticalSectionRawMutex, ChannelCommand, COMMAND_QUEUE_DEPTH>;

    /// Raised by the receive path when a flush timer was armed
    pub type FlushSignal = Signal<CriticalSectionRawMutex, u64>;

    /// Serve commands and debug ticks for one channel, forever
    pub async fn run_channel<P, B, C, D, const RX: usize, const TX: usize>(
        mut channel: Channel<'_, P, B, C, D, RX, TX>,
        commands: &CommandQueue,
    ) -> !
    where
        P: OutputPin<Error = Infallible>,
        B: BusPeripheral,
        C: Clock,
        D: DelayNs,
    {
        let id = channel.profile().id;
        let mut cadence = DebugCadence::for_profile(channel.profile(), Instant::now().as_millis());
        info!("{}: worker started, debug every {}ms", id, cadence.period_ms());

        loop {
            let wake = Timer::at(Instant::from_millis(cadence.deadline()));
            match select(commands.receive(), wake).await {
                Either::First(command) => {
                    if let Err(err) = apply_command(&mut channel, command).await {
                        warn!("{}: command failed: {}", id, err);
                    }
                }
                Either::Second(()) => {
                    if let Err(err) = channel.debug_tick().await {
                        debug!("{}: debug transmit failed: {}", id, err);
                    }
                    let skipped = cadence.advance(Instant::now().as_millis());
                    if skipped > 0 {
                        warn!("{}: skipped {} debug ticks", id, skipped);
                    }
                }
            }
        }
    }

    /// Drain expired receive buffers of one channel into the log, forever
    pub async fn run_flush<S, C, const RX: usize>(
        link: &ChannelLink<RX>,
        armed: &FlushSignal,
        mut store: S,
        clock: C,
    ) -> !
    where
        S: ByteStore,
        C: Clock,
    {
        loop {
            armed.wait().await;
            while let Some(deadline) = link.next_flush_deadline() {
                Timer::at(Instant::from_millis(deadline)).await;
                link.flush_all_due(clock.now_ms(), &mut store);
            }
        }
    }
}
