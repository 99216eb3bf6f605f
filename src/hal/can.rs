//! bxCAN Sessions
//!
//! Raw byte transport over CAN1: outgoing bytes are packed into standard
//! data frames of up to eight bytes with a fixed identifier, incoming frames
//! are unpacked into the channel link byte by byte. Filters accept all.

use core::num::{NonZeroU16, NonZeroU8};

use embassy_futures::select::{select3, Either3};
use embassy_stm32::can::filter::Mask32;
use embassy_stm32::can::util::NominalBitTiming;
use embassy_stm32::can::{Can, CanRx, CanTx, Fifo, Frame, StandardId};
use embassy_time::Instant;

use crate::channel::settings::CanBitTiming;
use crate::channel::{ChannelLink, PeripheralConfig};
use crate::config::{APB1_CLOCK_HZ, CAN_TX_BUFFER_SIZE, CAN_TX_STD_ID};
use crate::hal::port::{PortControl, PortRequest};
use crate::types::HalStatus;

/// Reject bit rates with no exact segment split on APB1
pub fn check_config(config: &PeripheralConfig) -> Result<(), HalStatus> {
    CanBitTiming::for_bit_rate(APB1_CLOCK_HZ, config.bit_rate)
        .map(|_| ())
        .ok_or(HalStatus::Error)
}

fn nominal_timing(timing: CanBitTiming) -> Option<NominalBitTiming> {
    Some(NominalBitTiming {
        prescaler: NonZeroU16::new(timing.prescaler)?,
        seg1: NonZeroU8::new(timing.bs1)?,
        seg2: NonZeroU8::new(timing.bs2)?,
        sync_jump_width: NonZeroU8::new(timing.sjw)?,
    })
}

/// Serve an open CAN peripheral until the next lifecycle request, which is
/// returned
pub async fn serve<const RX: usize, const TX: usize>(
    mut can: Can<'_>,
    config: &PeripheralConfig,
    link: &ChannelLink<RX>,
    control: &PortControl<TX>,
) -> PortRequest {
    let Some(timing) =
        CanBitTiming::for_bit_rate(APB1_CLOCK_HZ, config.bit_rate).and_then(nominal_timing)
    else {
        debug!("{}: {}", link.id(), HalStatus::Error);
        link.on_peripheral_error();
        return control.request().await;
    };

    can.modify_config().set_bit_timing(timing);
    can.modify_filters()
        .enable_bank(0, Fifo::Fifo0, Mask32::accept_all());
    can.enable().await;

    let (tx, rx) = can.split();
    let receive = config.mode.includes_receive();

    let rx_loop = async {
        if receive {
            receive_loop(rx, link).await;
        } else {
            core::future::pending::<()>().await;
        }
    };

    let next = match select3(rx_loop, transmit_loop(tx, link, control), control.request()).await {
        Either3::Third(request) => request,
        Either3::First(()) | Either3::Second(()) => control.request().await,
    };
    debug!("{}: session ended by {}", link.id(), next);
    next
}

async fn receive_loop<const RX: usize>(mut rx: CanRx<'_>, link: &ChannelLink<RX>) {
    loop {
        match rx.read().await {
            Ok(envelope) => {
                let now = Instant::now().as_millis();
                for &byte in envelope.frame.data() {
                    link.on_rx_byte(byte, now);
                }
            }
            Err(err) => {
                debug!("{}: bus error {}", link.id(), err);
                link.on_peripheral_error();
            }
        }
    }
}

async fn transmit_loop<const RX: usize, const TX: usize>(
    mut tx: CanTx<'_>,
    link: &ChannelLink<RX>,
    control: &PortControl<TX>,
) {
    let Some(id) = StandardId::new(CAN_TX_STD_ID) else {
        return;
    };

    loop {
        let payload = control.next_frame().await;
        let mut ok = true;
        for chunk in payload.chunks(CAN_TX_BUFFER_SIZE) {
            match Frame::new_data(id, chunk) {
                Ok(frame) => {
                    tx.write(&frame).await;
                }
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }

        if ok {
            link.on_tx_complete();
        } else {
            debug!("{}: {}", link.id(), HalStatus::Error);
            link.on_peripheral_error();
        }
    }
}
