//! Receive Pipeline Tests
//!
//! Tests for the receive double buffer, its flush timers and the flush into
//! the byte log through the channel link.
//! Run with: cargo test --target x86_64-unknown-linux-gnu --no-default-features --features std --test rx_tests

mod common;

use breakout_firmware::channel::rx::{BufferState, RxOutcome, RxPipeline};
use breakout_firmware::channel::ChannelLink;
use breakout_firmware::config::{
    self, LOG_REGION_SIZE, RX_BUFFER_SIZE, RX_FLUSH_QUIET_MS, UART1_FLASH_BASE,
};
use common::MockStore;

const QUIET: u64 = RX_FLUSH_QUIET_MS as u64;

// =============================================================================
// Double Buffer Tests
// =============================================================================

#[test]
fn first_byte_arms_timer() {
    let mut rx: RxPipeline<8> = RxPipeline::new(100);

    assert_eq!(
        rx.on_byte(0x41, 1000),
        RxOutcome::Stored {
            buffer: 0,
            armed: Some(1100),
        }
    );
    // Already running: not re-armed, deadline stays
    assert_eq!(
        rx.on_byte(0x42, 1050),
        RxOutcome::Stored {
            buffer: 0,
            armed: None,
        }
    );
    assert_eq!(rx.next_deadline(), Some(1100));
}

#[test]
fn overflow_spills_into_second_buffer() {
    let mut rx: RxPipeline<4> = RxPipeline::new(100);
    for byte in 0..4 {
        rx.on_byte(byte, 0);
    }
    assert!(rx.buffer(0).unwrap().is_full());

    assert_eq!(
        rx.on_byte(4, 10),
        RxOutcome::Stored {
            buffer: 1,
            armed: Some(110),
        }
    );
    assert_eq!(rx.buffer(1).unwrap().contents(), [4]);
}

#[test]
fn both_full_drops() {
    let mut rx: RxPipeline<2> = RxPipeline::new(100);
    for byte in 0..4 {
        assert!(matches!(rx.on_byte(byte, 0), RxOutcome::Stored { .. }));
    }
    assert_eq!(rx.on_byte(9, 0), RxOutcome::Dropped);
}

#[test]
fn reading_buffer_is_skipped_by_receive() {
    let mut rx: RxPipeline<4> = RxPipeline::new(100);
    rx.on_byte(1, 0);
    assert_eq!(rx.take_due(100), Some(0));
    assert_eq!(rx.buffer(0).unwrap().state(), BufferState::Reading);
    assert!(!rx.buffer(0).unwrap().timer_running());

    // Buffer A is being read, new bytes land in B
    assert!(matches!(rx.on_byte(2, 101), RxOutcome::Stored { buffer: 1, .. }));

    rx.finish_flush(0);
    assert_eq!(rx.buffer(0).unwrap().state(), BufferState::Writing);
    assert!(rx.buffer(0).unwrap().is_empty());
}

#[test]
fn take_due_waits_for_quiet_period() {
    let mut rx: RxPipeline<4> = RxPipeline::new(100);
    rx.on_byte(1, 500);
    assert_eq!(rx.take_due(599), None);
    assert_eq!(rx.take_due(600), Some(0));
    assert_eq!(rx.take_due(600), None);
}

#[test]
fn reset_empties_both_buffers() {
    let mut rx: RxPipeline<2> = RxPipeline::new(100);
    for byte in 0..4 {
        rx.on_byte(byte, 0);
    }
    rx.reset();
    for i in 0..2 {
        let buffer = rx.buffer(i).unwrap();
        assert!(buffer.is_empty());
        assert!(!buffer.timer_running());
        assert_eq!(buffer.state(), BufferState::Writing);
    }
    assert_eq!(rx.next_deadline(), None);
}

// =============================================================================
// Loss Accounting
// =============================================================================

#[test]
fn no_loss_up_to_twice_capacity() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
    for i in 0..2 * RX_BUFFER_SIZE {
        link.on_rx_byte(i as u8, 0);
    }
    assert_eq!(link.buffered(), [RX_BUFFER_SIZE, RX_BUFFER_SIZE]);
    assert_eq!(link.overruns(), 0);
}

#[test]
fn excess_beyond_twice_capacity_is_dropped_and_counted() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
    let excess = 37;
    for i in 0..2 * RX_BUFFER_SIZE + excess {
        link.on_rx_byte(i as u8, 0);
    }
    assert_eq!(link.buffered(), [RX_BUFFER_SIZE, RX_BUFFER_SIZE]);
    assert_eq!(link.overruns(), excess as u32);
    assert_eq!(link.rx_bytes(), (2 * RX_BUFFER_SIZE + excess) as u32);
}

#[test]
fn three_hundred_bytes_split_256_44() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
    for i in 0..300u32 {
        link.on_rx_byte(i as u8, 0);
    }
    assert_eq!(link.buffered(), [256, 44]);
    assert_eq!(link.overruns(), 0);
}

#[test]
fn unbuffered_channel_stores_nothing() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART2);
    assert!(!link.has_buffered_rx());
    assert_eq!(link.on_rx_byte(0x55, 0), None);
    assert_eq!(link.rx_bytes(), 1);
    assert_eq!(link.buffered(), [0, 0]);
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn flush_writes_bytes_in_order_and_advances_cursor() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
    let mut store = MockStore::new();
    for &byte in b"hello" {
        link.on_rx_byte(byte, 10);
    }

    assert!(link.flush_due(10 + QUIET - 1, &mut store).is_none());
    let report = link.flush_due(10 + QUIET, &mut store).unwrap();

    assert_eq!(report.start, UART1_FLASH_BASE);
    assert_eq!(report.written, 5);
    assert_eq!(report.failed, 0);
    assert_eq!(store.bytes(), b"hello");
    assert_eq!(
        store.addresses(),
        (UART1_FLASH_BASE..UART1_FLASH_BASE + 5).collect::<Vec<_>>()
    );
    assert_eq!(link.current_write_address(), UART1_FLASH_BASE + 5);
    assert_eq!(link.buffered(), [0, 0]);
}

#[test]
fn consecutive_flushes_append() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
    let mut store = MockStore::new();

    link.on_rx_byte(0xA1, 0);
    link.flush_due(QUIET, &mut store);
    link.on_rx_byte(0xB2, 500);
    link.flush_due(500 + QUIET, &mut store);

    assert_eq!(store.writes, [(0, 0xA1), (1, 0xB2)]);
    assert_eq!(link.current_write_address(), 2);
}

#[test]
fn flush_with_nothing_due_is_noop() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
    let mut store = MockStore::new();

    assert!(link.flush_due(10_000, &mut store).is_none());
    assert_eq!(link.flush_all_due(10_000, &mut store), 0);
    assert!(store.writes.is_empty());
    assert_eq!(link.current_write_address(), UART1_FLASH_BASE);
}

#[test]
fn flush_all_drains_both_buffers() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
    let mut store = MockStore::new();
    for i in 0..300u32 {
        link.on_rx_byte(i as u8, 0);
    }

    assert_eq!(link.flush_all_due(QUIET, &mut store), 300);
    assert_eq!(store.writes.len(), 300);
    assert_eq!(link.current_write_address(), 300);
    assert_eq!(link.buffered(), [0, 0]);
    assert_eq!(link.next_flush_deadline(), None);
}

#[test]
fn store_failures_counted_cursor_still_advances() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
    let mut store = MockStore::new();
    store.fail_at = vec![1];
    for &byte in &[1, 2, 3] {
        link.on_rx_byte(byte, 0);
    }

    let report = link.flush_due(QUIET, &mut store).unwrap();

    assert_eq!(report.written, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(store.writes, [(0, 1), (2, 3)]);
    assert_eq!(link.current_write_address(), 3);
}

#[test]
fn bytes_arriving_during_flush_wait_land_in_other_buffer() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
    let mut store = MockStore::new();
    link.on_rx_byte(0x01, 0);
    // Fills A, the last byte arms B later than A
    for _ in 0..RX_BUFFER_SIZE {
        link.on_rx_byte(0x02, 50);
    }
    assert_eq!(link.buffered(), [RX_BUFFER_SIZE, 1]);
    assert_eq!(link.next_flush_deadline(), Some(QUIET));

    link.flush_due(QUIET, &mut store);
    assert_eq!(link.buffered(), [0, 1]);
    assert_eq!(link.next_flush_deadline(), Some(50 + QUIET));
}

#[test]
fn outcome_check_surfaces_overrun() {
    use breakout_firmware::error::ChannelError;

    let stored = RxOutcome::Stored {
        buffer: 0,
        armed: Some(100),
    };
    assert_eq!(stored.check(), Ok(Some(100)));
    assert_eq!(RxOutcome::Dropped.check(), Err(ChannelError::BufferOverrun));
}

#[test]
fn log_stops_at_end_of_erased_region() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
    let mut store = MockStore::new();
    let end = UART1_FLASH_BASE + LOG_REGION_SIZE;
    assert_eq!(link.log_end(), end);

    let mut now = 0;
    while link.current_write_address() < end {
        for _ in 0..RX_BUFFER_SIZE {
            link.on_rx_byte(0x5A, now);
        }
        now += QUIET;
        link.flush_all_due(now, &mut store);
    }
    assert_eq!(store.writes.len(), LOG_REGION_SIZE as usize);

    for _ in 0..10 {
        link.on_rx_byte(0x77, now);
    }
    let report = link.flush_due(now + QUIET, &mut store).unwrap();

    assert_eq!(report.written, 0);
    assert_eq!(report.discarded, 10);
    assert_eq!(link.log_discarded(), 10);
    assert_eq!(link.current_write_address(), end);
    assert!(store.addresses().iter().all(|&a| a < end));
    // Buffer handed back even though nothing was written
    assert_eq!(link.buffered(), [0, 0]);
}

#[test]
fn rebase_reopens_full_log() {
    let link: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
    let mut store = MockStore::new();
    link.rebase(0x2000);
    assert_eq!(link.log_end(), 0x2000 + LOG_REGION_SIZE);

    link.on_rx_byte(0x01, 0);
    let report = link.flush_due(QUIET, &mut store).unwrap();
    assert_eq!(report.discarded, 0);
    assert_eq!(store.writes, [(0x2000, 0x01)]);
}
