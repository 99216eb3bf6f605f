//! Shared test doubles for the channel controller tests
//!
//! Every double keeps its state behind `Rc` so a test can hand one clone to
//! the controller and inspect the other.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use breakout_firmware::channel::{BusPeripheral, Clock, PeripheralConfig};
use breakout_firmware::storage::ByteStore;
use breakout_firmware::types::HalStatus;

// =============================================================================
// GPIO
// =============================================================================

/// Output pin recording its level and every write
#[derive(Clone, Default)]
pub struct MockPin {
    high: Rc<Cell<Option<bool>>>,
    writes: Rc<Cell<u32>>,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last driven level, `None` if never driven
    pub fn is_high(&self) -> Option<bool> {
        self.high.get()
    }

    pub fn writes(&self) -> u32 {
        self.writes.get()
    }
}

impl embedded_hal::digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high.set(Some(false));
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high.set(Some(true));
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

// =============================================================================
// Time
// =============================================================================

/// Manually advanced millisecond clock
#[derive(Clone, Default)]
pub struct MockClock {
    now: Rc<Cell<u64>>,
}

impl MockClock {
    pub fn at(ms: u64) -> Self {
        let clock = Self::default();
        clock.set(ms);
        clock
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Delay that returns immediately and counts requested milliseconds
#[derive(Clone, Default)]
pub struct NoopDelay {
    waited_ns: Rc<Cell<u64>>,
}

impl NoopDelay {
    pub fn waited_ms(&self) -> u64 {
        self.waited_ns.get() / 1_000_000
    }
}

impl embedded_hal_async::delay::DelayNs for NoopDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waited_ns.set(self.waited_ns.get() + u64::from(ns));
    }
}

// =============================================================================
// Bus peripheral
// =============================================================================

/// Recorded state of a [`MockPeripheral`]
#[derive(Default)]
pub struct PeripheralState {
    pub calls: Vec<&'static str>,
    pub irq_priority: Option<u8>,
    pub config: Option<PeripheralConfig>,
    pub clock_on: bool,
    pub irq_on: bool,
    pub initialised: bool,
    pub receiving: bool,
    pub frames: Vec<Vec<u8>>,
    pub fail_init: Option<HalStatus>,
    pub fail_filter: Option<HalStatus>,
    pub fail_receive: Option<HalStatus>,
    pub fail_transmit: Option<HalStatus>,
}

/// Bus peripheral with a call log and failure injection
#[derive(Clone, Default)]
pub struct MockPeripheral {
    state: Rc<RefCell<PeripheralState>>,
}

impl MockPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> std::cell::Ref<'_, PeripheralState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, PeripheralState> {
        self.state.borrow_mut()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state.borrow().frames.clone()
    }

    fn log(&self, call: &'static str) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl BusPeripheral for MockPeripheral {
    fn enable_clock(&mut self) {
        self.log("enable_clock");
        self.state.borrow_mut().clock_on = true;
    }

    fn disable_clock(&mut self) {
        self.log("disable_clock");
        self.state.borrow_mut().clock_on = false;
    }

    fn set_irq_priority(&mut self, priority: u8) {
        self.log("set_irq_priority");
        self.state.borrow_mut().irq_priority = Some(priority);
    }

    fn enable_irq(&mut self) {
        self.log("enable_irq");
        self.state.borrow_mut().irq_on = true;
    }

    fn disable_irq(&mut self) {
        self.log("disable_irq");
        self.state.borrow_mut().irq_on = false;
    }

    fn init(&mut self, config: &PeripheralConfig) -> Result<(), HalStatus> {
        self.log("init");
        let mut state = self.state.borrow_mut();
        if let Some(status) = state.fail_init {
            return Err(status);
        }
        state.config = Some(*config);
        state.initialised = true;
        Ok(())
    }

    fn configure_filter(&mut self) -> Result<(), HalStatus> {
        self.log("configure_filter");
        match self.state.borrow().fail_filter {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn deinit(&mut self) {
        self.log("deinit");
        let mut state = self.state.borrow_mut();
        state.initialised = false;
        state.receiving = false;
    }

    fn start_receive(&mut self) -> Result<(), HalStatus> {
        self.log("start_receive");
        let mut state = self.state.borrow_mut();
        if let Some(status) = state.fail_receive {
            return Err(status);
        }
        state.receiving = true;
        Ok(())
    }

    fn start_transmit(&mut self, data: &[u8]) -> Result<(), HalStatus> {
        self.log("start_transmit");
        let mut state = self.state.borrow_mut();
        if let Some(status) = state.fail_transmit {
            return Err(status);
        }
        state.frames.push(data.to_vec());
        Ok(())
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Byte store keeping an address-ordered write log
#[derive(Default)]
pub struct MockStore {
    pub erased: Vec<u32>,
    pub writes: Vec<(u32, u8)>,
    pub fail_at: Vec<u32>,
    pub fail_erase: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written, in write order
    pub fn bytes(&self) -> Vec<u8> {
        self.writes.iter().map(|&(_, b)| b).collect()
    }

    /// Addresses written, in write order
    pub fn addresses(&self) -> Vec<u32> {
        self.writes.iter().map(|&(a, _)| a).collect()
    }
}

impl ByteStore for MockStore {
    type Error = ();

    fn erase_sector(&mut self, address: u32) -> Result<(), Self::Error> {
        if self.fail_erase {
            return Err(());
        }
        self.erased.push(address);
        Ok(())
    }

    fn write_byte(&mut self, address: u32, byte: u8) -> Result<(), Self::Error> {
        if self.fail_at.contains(&address) {
            return Err(());
        }
        self.writes.push((address, byte));
        Ok(())
    }

    fn write_buffer(&mut self, data: &[u8], address: u32) -> Result<(), Self::Error> {
        for (offset, &byte) in data.iter().enumerate() {
            self.write_byte(address + offset as u32, byte)?;
        }
        Ok(())
    }
}
