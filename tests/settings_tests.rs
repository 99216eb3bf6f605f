//! Channel Settings Tests
//!
//! Tests for settings validation, the derived peripheral configuration and
//! CAN bit timing.
//! Run with: cargo test --target x86_64-unknown-linux-gnu --no-default-features --features std --test settings_tests

use breakout_firmware::channel::{CanBitTiming, ChannelSettings, Framing, PeripheralConfig};
use breakout_firmware::config::{self, APB1_CLOCK_HZ};
use breakout_firmware::types::{
    Connection, DuplexMode, PowerLevel, RelayState, Termination,
};

// =============================================================================
// Duplex Mode Tests
// =============================================================================

#[test]
fn debug_tx_is_physically_full_duplex() {
    assert_eq!(DuplexMode::DebugTx.physical(), DuplexMode::TxRx);
    assert_eq!(DuplexMode::Rx.physical(), DuplexMode::Rx);
    assert_eq!(DuplexMode::Tx.physical(), DuplexMode::Tx);
}

#[test]
fn duplex_directions() {
    assert!(DuplexMode::Rx.includes_receive());
    assert!(!DuplexMode::Rx.includes_transmit());
    assert!(!DuplexMode::Tx.includes_receive());
    assert!(DuplexMode::Tx.includes_transmit());
    assert!(DuplexMode::DebugTx.includes_receive());
    assert!(DuplexMode::DebugTx.includes_transmit());
}

// =============================================================================
// Relay Mapping Tests
// =============================================================================

#[test]
fn low_power_energises_relay() {
    assert_eq!(PowerLevel::Low.relay_state(), RelayState::On);
    assert_eq!(PowerLevel::High.relay_state(), RelayState::Off);
    assert_eq!(PowerLevel::Low.millivolts(), 3300);
    assert_eq!(PowerLevel::High.millivolts(), 5000);
}

#[test]
fn connection_and_termination_mapping() {
    assert_eq!(Connection::Connected.relay_state(), RelayState::On);
    assert_eq!(Connection::Disconnected.relay_state(), RelayState::Off);
    assert_eq!(Termination::Connected.relay_state(), RelayState::On);
    assert_eq!(Termination::Disconnected.relay_state(), RelayState::Off);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn profile_defaults_are_valid() {
    for profile in [&config::UART1, &config::UART2, &config::CAN1, &config::RS232] {
        assert!(profile.defaults.is_valid_for(profile), "{:?}", profile.id);
    }
}

#[test]
fn bit_rate_outside_range_rejected() {
    let profile = &config::UART1;
    let slow = ChannelSettings {
        bit_rate: 300,
        ..profile.defaults
    };
    let fast = ChannelSettings {
        bit_rate: profile.max_bit_rate + 1,
        ..profile.defaults
    };
    assert!(!slow.is_valid_for(profile));
    assert!(!fast.is_valid_for(profile));
}

#[test]
fn power_must_match_relay_presence() {
    let uart = ChannelSettings {
        power: None,
        ..config::UART1.defaults
    };
    assert!(!uart.is_valid_for(&config::UART1));

    let rs232 = ChannelSettings {
        power: Some(PowerLevel::Low),
        ..config::RS232.defaults
    };
    assert!(!rs232.is_valid_for(&config::RS232));
}

#[test]
fn termination_must_match_relay_presence() {
    let can = ChannelSettings {
        termination: None,
        ..config::CAN1.defaults
    };
    assert!(!can.is_valid_for(&config::CAN1));

    let uart = ChannelSettings {
        termination: Some(Termination::Connected),
        ..config::UART2.defaults
    };
    assert!(!uart.is_valid_for(&config::UART2));
}

#[test]
fn can_rate_needs_exact_timing() {
    let standard = ChannelSettings {
        bit_rate: 500_000,
        ..config::CAN1.defaults
    };
    assert!(standard.is_valid_for(&config::CAN1));

    // In range, but 42 MHz has no exact split for it
    let odd = ChannelSettings {
        bit_rate: 33_333,
        ..config::CAN1.defaults
    };
    assert!(!odd.is_valid_for(&config::CAN1));
}

#[test]
fn debug_tx_only_when_connected() {
    let mut settings = ChannelSettings {
        mode: DuplexMode::DebugTx,
        ..config::UART2.defaults
    };
    assert!(!settings.wants_debug_tx());

    settings.connection = Connection::Connected;
    assert!(settings.wants_debug_tx());

    settings.mode = DuplexMode::TxRx;
    assert!(!settings.wants_debug_tx());
}

// =============================================================================
// Peripheral Configuration Tests
// =============================================================================

#[test]
fn pending_config_mirrors_rate_and_physical_mode() {
    let settings = ChannelSettings {
        bit_rate: 9600,
        mode: DuplexMode::DebugTx,
        ..config::UART2.defaults
    };
    let pending = PeripheralConfig::from_settings(&settings);
    assert_eq!(pending.bit_rate, 9600);
    assert_eq!(pending.mode, DuplexMode::TxRx);
    assert_eq!(pending.framing, Framing::EIGHT_N_ONE);
}

#[test]
fn default_framing_is_8n1() {
    let framing = Framing::default();
    assert_eq!(framing.data_bits, 8);
    assert_eq!(framing, Framing::EIGHT_N_ONE);
}

// =============================================================================
// CAN Bit Timing Tests
// =============================================================================

#[test]
fn can_timing_hits_requested_rate() {
    for rate in [10_000, 20_000, 50_000, 100_000, 125_000, 250_000, 500_000, 1_000_000] {
        let timing = CanBitTiming::for_bit_rate(APB1_CLOCK_HZ, rate).expect("timing");
        assert_eq!(timing.bit_rate(APB1_CLOCK_HZ), rate, "rate {rate}");
        assert!((1..=16).contains(&timing.bs1));
        assert!((1..=8).contains(&timing.bs2));
        assert!((1..=1024).contains(&timing.prescaler));
        assert_eq!(timing.sjw, 1);
    }
}

#[test]
fn can_timing_1m_prefers_closest_sample_point() {
    let timing = CanBitTiming::for_bit_rate(APB1_CLOCK_HZ, 1_000_000).expect("timing");
    // 14 quanta (85.7 %) beats 21 quanta (81 %)
    assert_eq!(timing.quanta(), 14);
    assert_eq!(timing.prescaler, 3);
    assert_eq!(timing.sample_point_permille(), 857);
}

#[test]
fn can_timing_sample_point_near_target() {
    for rate in [125_000, 250_000, 500_000] {
        let timing = CanBitTiming::for_bit_rate(APB1_CLOCK_HZ, rate).expect("timing");
        let sp = timing.sample_point_permille();
        assert!((800..=900).contains(&sp), "rate {rate}: {sp}");
    }
}
