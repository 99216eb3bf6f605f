//! Physical Interface Gate Tests
//!
//! Tests for enable/disable sequencing and teardown on failure.
//! Run with: cargo test --target x86_64-unknown-linux-gnu --no-default-features --features std --test gate_tests

mod common;

use breakout_firmware::channel::settings::PeripheralConfig;
use breakout_firmware::channel::InterfaceGate;
use breakout_firmware::config::{self, LOWEST_APP_IRQ_PRIORITY};
use breakout_firmware::error::ChannelError;
use breakout_firmware::types::{DuplexMode, HalStatus};
use common::MockPeripheral;

fn config_with(mode: DuplexMode) -> PeripheralConfig {
    let mut config = PeripheralConfig::from_settings(&config::UART2.defaults);
    config.mode = mode;
    config
}

// =============================================================================
// Enable Sequencing
// =============================================================================

#[test]
fn enable_runs_steps_in_order() {
    let peripheral = MockPeripheral::new();
    let mut gate = InterfaceGate::new(peripheral.clone());

    gate.enable(&config_with(DuplexMode::TxRx)).unwrap();

    assert_eq!(
        peripheral.calls(),
        [
            "enable_clock",
            "set_irq_priority",
            "enable_irq",
            "init",
            "configure_filter",
            "start_receive",
        ]
    );
    assert!(gate.is_enabled());
    assert_eq!(peripheral.state().irq_priority, Some(LOWEST_APP_IRQ_PRIORITY));
    assert!(peripheral.state().receiving);
}

#[test]
fn transmit_only_does_not_arm_receive() {
    let peripheral = MockPeripheral::new();
    let mut gate = InterfaceGate::new(peripheral.clone());

    gate.enable(&config_with(DuplexMode::Tx)).unwrap();

    assert!(!peripheral.calls().contains(&"start_receive"));
    assert!(!peripheral.state().receiving);
}

#[test]
fn enable_passes_config_to_driver() {
    let peripheral = MockPeripheral::new();
    let mut gate = InterfaceGate::new(peripheral.clone());
    let mut config = config_with(DuplexMode::Rx);
    config.bit_rate = 57_600;

    gate.enable(&config).unwrap();

    assert_eq!(peripheral.state().config, Some(config));
}

// =============================================================================
// Failure Teardown
// =============================================================================

#[test]
fn init_failure_tears_down() {
    let peripheral = MockPeripheral::new();
    peripheral.state_mut().fail_init = Some(HalStatus::Timeout);
    let mut gate = InterfaceGate::new(peripheral.clone());

    let result = gate.enable(&config_with(DuplexMode::TxRx));

    assert_eq!(result, Err(ChannelError::HardwareInit(HalStatus::Timeout)));
    assert!(!gate.is_enabled());
    let calls = peripheral.calls();
    // Nothing after the failing step runs
    assert!(!calls.contains(&"configure_filter"));
    assert!(!calls.contains(&"start_receive"));
    assert_eq!(&calls[calls.len() - 3..], ["disable_irq", "deinit", "disable_clock"]);
    assert!(!peripheral.state().clock_on);
    assert!(!peripheral.state().irq_on);
}

#[test]
fn filter_failure_tears_down() {
    let peripheral = MockPeripheral::new();
    peripheral.state_mut().fail_filter = Some(HalStatus::Error);
    let mut gate = InterfaceGate::new(peripheral.clone());

    let result = gate.enable(&config_with(DuplexMode::TxRx));

    assert_eq!(result, Err(ChannelError::HardwareInit(HalStatus::Error)));
    assert!(!peripheral.calls().contains(&"start_receive"));
    assert!(!peripheral.state().initialised);
}

#[test]
fn receive_failure_tears_down() {
    let peripheral = MockPeripheral::new();
    peripheral.state_mut().fail_receive = Some(HalStatus::Busy);
    let mut gate = InterfaceGate::new(peripheral.clone());

    let result = gate.enable(&config_with(DuplexMode::Rx));

    assert_eq!(result, Err(ChannelError::HardwareInit(HalStatus::Busy)));
    assert!(!gate.is_enabled());
    assert!(!peripheral.state().clock_on);
}

// =============================================================================
// Disable
// =============================================================================

#[test]
fn disable_reverses_enable() {
    let peripheral = MockPeripheral::new();
    let mut gate = InterfaceGate::new(peripheral.clone());
    gate.enable(&config_with(DuplexMode::TxRx)).unwrap();
    peripheral.clear_calls();

    gate.disable();

    assert_eq!(peripheral.calls(), ["disable_irq", "deinit", "disable_clock"]);
    assert!(!gate.is_enabled());
    assert!(!peripheral.state().receiving);
}

#[test]
fn active_config_tracks_enable_and_disable() {
    let peripheral = MockPeripheral::new();
    let mut gate = InterfaceGate::new(peripheral.clone());
    assert_eq!(gate.active_config(), None);

    let config = config_with(DuplexMode::Rx);
    gate.enable(&config).unwrap();
    assert_eq!(gate.active_config(), Some(config));

    gate.disable();
    assert_eq!(gate.active_config(), None);
}

#[test]
fn failed_enable_leaves_no_active_config() {
    let peripheral = MockPeripheral::new();
    peripheral.state_mut().fail_init = Some(HalStatus::Error);
    let mut gate = InterfaceGate::new(peripheral.clone());

    assert!(gate.enable(&config_with(DuplexMode::TxRx)).is_err());
    assert_eq!(gate.active_config(), None);
}

#[test]
fn hal_status_labels() {
    assert_eq!(HalStatus::Error.to_string(), "HAL_ERROR");
    assert_eq!(HalStatus::Busy.to_string(), "HAL_BUSY");
    assert_eq!(HalStatus::Timeout.label(), "HAL_TIMEOUT");
}
