//! Channel Controller
//!
//! One controller per front-panel channel. It owns the channel's relays,
//! settings, peripheral gate and transmit scratch buffer, and borrows the
//! interrupt-shared [`ChannelLink`]. All setters run in task context.
//!
//! Connection state machine:
//!
//! ```text
//!   Disconnected ──set_connection(Connected)──► relay On ──► gate.enable ──► Connected
//!        ▲                                          │              │
//!        │                           relay rejected │              │ init failed
//!        │                                          ▼              ▼
//!        └──────────────────────────────────── (unchanged)   relay forced Off
//!
//!   Connected ──set_connection(Disconnected)──► relay Off ──► gate.disable,
//!                                                           token released,
//!                                                           rx buffers reset
//! ```

pub mod gate;
pub mod link;
pub mod profile;
pub mod relay;
pub mod rx;
pub mod settings;
pub mod tx;

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

use crate::error::{ChannelError, ChannelResult};
use crate::storage::ByteStore;
use crate::types::{ChannelId, Connection, HalStatus, PowerLevel, RelayState, Termination};

pub use gate::{BusPeripheral, InterfaceGate};
pub use link::ChannelLink;
pub use profile::ChannelProfile;
pub use relay::{DebouncedRelay, RelayStatus};
pub use settings::{CanBitTiming, ChannelSettings, Framing, PeripheralConfig};
pub use tx::{TransmitArbiter, TxReporting};

/// Millisecond time source
pub trait Clock {
    /// Milliseconds since an arbitrary fixed point
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Relay output pins of one channel
pub struct RelayPins<P> {
    /// Connector switch relay
    pub switch: P,
    /// Supply selection relay
    pub power: Option<P>,
    /// Bus termination relay
    pub termination: Option<P>,
}

/// Readback for the GUI
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Channel identity
    pub id: ChannelId,
    /// Settings snapshot
    pub settings: ChannelSettings,
    /// Flash log write address
    pub write_address: u32,
    /// Bytes held in each receive buffer
    pub buffered: [usize; 2],
    /// Bytes received since boot
    pub rx_bytes: u32,
    /// Received bytes dropped on overrun
    pub overruns: u32,
    /// Transmissions dropped on a busy token
    pub dropped_transmits: u32,
    /// Peripheral error interrupts
    pub peripheral_errors: u32,
    /// A transmission is in flight
    pub tx_busy: bool,
}

#[cfg(feature = "embedded")]
impl defmt::Format for ChannelStatus {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "{}: {} @{=u32:#x} buf={} rx={} ovr={} drop={} err={} busy={}",
            self.id,
            self.settings,
            self.write_address,
            self.buffered,
            self.rx_bytes,
            self.overruns,
            self.dropped_transmits,
            self.peripheral_errors,
            self.tx_busy
        );
    }
}

/// Controller of one channel
pub struct Channel<'a, P, B, C, D, const RX: usize, const TX: usize> {
    profile: &'static ChannelProfile,
    link: &'a ChannelLink<RX>,
    switch_relay: DebouncedRelay<P>,
    power_relay: Option<DebouncedRelay<P>>,
    termination_relay: Option<DebouncedRelay<P>>,
    settings: ChannelSettings,
    pending: PeripheralConfig,
    gate: InterfaceGate<B>,
    arbiter: TransmitArbiter<TX>,
    clock: C,
    delay: D,
}

impl<'a, P, B, C, D, const RX: usize, const TX: usize> Channel<'a, P, B, C, D, RX, TX>
where
    P: OutputPin<Error = Infallible>,
    B: BusPeripheral,
    C: Clock,
    D: DelayNs,
{
    /// Assemble a channel; relays are only driven by [`Self::init`]
    ///
    /// A relay pin is only used when the profile also declares that relay.
    pub fn new(
        profile: &'static ChannelProfile,
        link: &'a ChannelLink<RX>,
        pins: RelayPins<P>,
        peripheral: B,
        clock: C,
        delay: D,
    ) -> Self {
        let spec = profile.switch_relay;
        let switch_relay = DebouncedRelay::new(pins.switch, spec.start, spec.min_interval_ms);
        let power_relay = pins
            .power
            .zip(profile.power_relay)
            .map(|(pin, spec)| DebouncedRelay::new(pin, spec.start, spec.min_interval_ms));
        let termination_relay = pins
            .termination
            .zip(profile.termination_relay)
            .map(|(pin, spec)| DebouncedRelay::new(pin, spec.start, spec.min_interval_ms));

        Self {
            profile,
            link,
            switch_relay,
            power_relay,
            termination_relay,
            settings: profile.defaults,
            pending: PeripheralConfig::from_settings(&profile.defaults),
            gate: InterfaceGate::new(peripheral),
            arbiter: TransmitArbiter::new(profile.tx_reporting, crate::config::TX_TOKEN_TIMEOUT_MS),
            clock,
            delay,
        }
    }

    /// Drive relays to their start positions and rebase the flash log
    ///
    /// For buffered channels the first sector of the log region is erased and
    /// the write cursor moved back to its base.
    pub fn init<S: ByteStore>(&mut self, store: &mut S) -> Result<(), S::Error> {
        let now = self.clock.now_ms();
        self.switch_relay.init(now);
        if let Some(relay) = self.power_relay.as_mut() {
            relay.init(now);
        }
        if let Some(relay) = self.termination_relay.as_mut() {
            relay.init(now);
        }

        self.settings = self.profile.defaults;
        self.pending = PeripheralConfig::from_settings(&self.settings);
        self.link.reset_rx();

        if let Some(base) = self.profile.flash_base {
            store.erase_sector(base)?;
            self.link.rebase(base);
            info!("{}: log rebased to {=u32:#x}", self.profile.id, base);
        }

        info!("{}: initialised", self.profile.id);
        Ok(())
    }

    /// Switch the channel onto or off the connector
    pub fn set_connection(&mut self, connection: Connection) -> ChannelResult<()> {
        if connection == self.settings.connection {
            return Ok(());
        }

        let now = self.clock.now_ms();
        let status = self.switch_relay.set_state(connection.relay_state(), now);
        if !status.is_settled() {
            debug!("{}: switch relay rejected ({})", self.profile.id, status);
            return Err(ChannelError::RelayRejected(status));
        }

        match connection {
            Connection::Connected => {
                if let Err(err) = self.gate.enable(&self.pending) {
                    // Never leave the connector live with a dead peripheral
                    self.switch_relay.force(RelayState::Off, self.clock.now_ms());
                    warn!("{}: connect rolled back: {}", self.profile.id, err);
                    return Err(err);
                }
            }
            Connection::Disconnected => self.shut_down(),
        }

        self.settings.connection = connection;
        info!("{}: {}", self.profile.id, connection);
        Ok(())
    }

    /// Select the connector supply level
    pub fn set_power(&mut self, level: PowerLevel) -> ChannelResult<()> {
        let now = self.clock.now_ms();
        let relay = self.power_relay.as_mut().ok_or(ChannelError::Unsupported)?;
        let status = relay.set_state(level.relay_state(), now);
        if !status.is_settled() {
            return Err(ChannelError::RelayRejected(status));
        }

        self.settings.power = Some(level);
        debug!("{}: power {}", self.profile.id, level);
        Ok(())
    }

    /// Switch bus termination
    pub fn set_termination(&mut self, termination: Termination) -> ChannelResult<()> {
        let now = self.clock.now_ms();
        let relay = self
            .termination_relay
            .as_mut()
            .ok_or(ChannelError::Unsupported)?;
        let status = relay.set_state(termination.relay_state(), now);
        if !status.is_settled() {
            return Err(ChannelError::RelayRejected(status));
        }

        self.settings.termination = Some(termination);
        debug!("{}: {}", self.profile.id, termination);
        Ok(())
    }

    /// Settings snapshot
    #[must_use]
    pub const fn settings(&self) -> ChannelSettings {
        self.settings
    }

    /// Replace the settings
    ///
    /// Bit rate and duplex mode are staged for the next connect. Connection,
    /// power and termination follow their relays and keep their live values.
    pub fn set_settings(&mut self, settings: ChannelSettings) -> ChannelResult<()> {
        if !settings.is_valid_for(self.profile) {
            warn!("{}: rejected {}", self.profile.id, settings);
            return Err(ChannelError::InvalidSettings);
        }

        self.settings = ChannelSettings {
            connection: self.settings.connection,
            power: self.settings.power,
            termination: self.settings.termination,
            ..settings
        };
        self.pending = PeripheralConfig::from_settings(&self.settings);
        debug!("{}: pending {}", self.profile.id, self.pending);
        Ok(())
    }

    /// Configuration applied on the next connect
    #[must_use]
    pub const fn pending_config(&self) -> PeripheralConfig {
        self.pending
    }

    /// Send `data` on the channel
    ///
    /// Gated on the mode the peripheral was enabled with, not on staged
    /// settings. Fire-and-forget channels return `Ok` even when the request
    /// is dropped.
    pub async fn transmit(&mut self, data: &[u8]) -> ChannelResult<()> {
        let live_tx = self
            .gate
            .active_config()
            .is_some_and(|config| config.mode.includes_transmit());
        if !self.settings.connection.is_connected() || !live_tx {
            return match self.profile.tx_reporting {
                TxReporting::Reported => Err(ChannelError::Transmit(HalStatus::Error)),
                TxReporting::FireAndForget => Ok(()),
            };
        }

        self.arbiter
            .transmit(
                self.link.token(),
                self.link.tx_stats(),
                self.gate.peripheral_mut(),
                &mut self.delay,
                data,
            )
            .await
    }

    /// One iteration of the periodic worker
    ///
    /// Sends the diagnostic payload when connected in `DebugTx` mode and
    /// reports whether it did.
    pub async fn debug_tick(&mut self) -> ChannelResult<bool> {
        if !self.settings.wants_debug_tx() {
            return Ok(false);
        }
        let payload = self.profile.debug_payload;
        self.transmit(payload).await?;
        Ok(true)
    }

    /// Readback for the GUI
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        let stats = self.link.tx_stats();
        ChannelStatus {
            id: self.profile.id,
            settings: self.settings,
            write_address: self.link.current_write_address(),
            buffered: self.link.buffered(),
            rx_bytes: self.link.rx_bytes(),
            overruns: self.link.overruns(),
            dropped_transmits: stats.dropped(),
            peripheral_errors: self.link.peripheral_errors(),
            tx_busy: self.link.token().is_held(),
        }
    }

    /// Flash log write address
    #[must_use]
    pub fn current_write_address(&self) -> u32 {
        self.link.current_write_address()
    }

    /// Channel profile
    #[must_use]
    pub const fn profile(&self) -> &'static ChannelProfile {
        self.profile
    }

    /// Interrupt-shared state
    #[must_use]
    pub const fn link(&self) -> &'a ChannelLink<RX> {
        self.link
    }

    /// Connector switch relay position
    #[must_use]
    pub const fn switch_state(&self) -> RelayState {
        self.switch_relay.state()
    }

    /// Supply relay position
    #[must_use]
    pub fn power_relay_state(&self) -> Option<RelayState> {
        self.power_relay.as_ref().map(DebouncedRelay::state)
    }

    /// Termination relay position
    #[must_use]
    pub fn termination_relay_state(&self) -> Option<RelayState> {
        self.termination_relay.as_ref().map(DebouncedRelay::state)
    }

    /// Check if the peripheral is up
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    /// Configuration the peripheral is running with, `None` while disabled
    #[must_use]
    pub const fn active_config(&self) -> Option<PeripheralConfig> {
        self.gate.active_config()
    }

    /// Borrow the peripheral
    pub fn peripheral(&self) -> &B {
        self.gate.peripheral()
    }

    /// Mutably borrow the peripheral
    pub fn peripheral_mut(&mut self) -> &mut B {
        self.gate.peripheral_mut()
    }

    /// Last payload handed to the driver
    #[must_use]
    pub fn last_transmit(&self) -> &[u8] {
        self.arbiter.scratch()
    }

    fn shut_down(&mut self) {
        self.gate.disable();
        // Whoever waits on the token must not wait for a channel that is gone;
        // an in-flight transmit is abandoned.
        self.link.token().give();
        self.link.reset_rx();
    }
}
