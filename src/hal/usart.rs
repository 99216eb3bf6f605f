//! USART Sessions
//!
//! Serves one open period of a UART/RS232 channel: received bytes go to the
//! channel link one at a time, queued frames are written out and their
//! completion releases the transmit token. The session ends on the next
//! lifecycle request, dropping the driver.

use embassy_futures::select::{select3, Either3};
use embassy_stm32::mode::Async;
use embassy_stm32::usart::{self, Uart, UartRx, UartTx};
use embassy_time::Instant;

use crate::channel::rx::RxOutcome;
use crate::channel::settings::{Parity, StopBits};
use crate::channel::{ChannelLink, PeripheralConfig};
use crate::config::SYSTEM_CLOCK_HZ;
use crate::hal::port::{PortControl, PortRequest};
use crate::types::HalStatus;
use crate::worker::tasks::FlushSignal;

/// Translate a channel configuration into driver settings
#[must_use]
pub fn driver_config(config: &PeripheralConfig) -> usart::Config {
    let mut out = usart::Config::default();
    out.baudrate = config.bit_rate;
    out.data_bits = if config.framing.data_bits == 9 {
        usart::DataBits::DataBits9
    } else {
        usart::DataBits::DataBits8
    };
    out.stop_bits = match config.framing.stop_bits {
        StopBits::One => usart::StopBits::STOP1,
        StopBits::Two => usart::StopBits::STOP2,
    };
    out.parity = match config.framing.parity {
        Parity::None => usart::Parity::ParityNone,
        Parity::Even => usart::Parity::ParityEven,
        Parity::Odd => usart::Parity::ParityOdd,
    };
    out
}

/// Reject rates the USART cannot divide down to (16x oversampling)
pub fn check_config(config: &PeripheralConfig) -> Result<(), HalStatus> {
    if config.bit_rate == 0 || config.bit_rate > SYSTEM_CLOCK_HZ / 2 / 16 {
        return Err(HalStatus::Error);
    }
    Ok(())
}

/// Serve an open USART until the next lifecycle request, which is returned
pub async fn serve<const RX: usize, const TX: usize>(
    uart: Uart<'_, Async>,
    config: &PeripheralConfig,
    link: &ChannelLink<RX>,
    control: &PortControl<TX>,
    flush: Option<&FlushSignal>,
) -> PortRequest {
    let (tx, rx) = uart.split();
    let receive = config.mode.includes_receive();

    let rx_loop = async {
        if receive {
            receive_loop(rx, link, flush).await;
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

async fn receive_loop<const RX: usize>(
    mut rx: UartRx<'_, Async>,
    link: &ChannelLink<RX>,
    flush: Option<&FlushSignal>,
) {
    let mut byte = [0u8; 1];
    loop {
        match rx.read(&mut byte).await {
            Ok(()) => {
                let now = Instant::now().as_millis();
                match link.on_rx_byte(byte[0], now).map(RxOutcome::check) {
                    Some(Ok(Some(deadline))) => {
                        if let Some(flush) = flush {
                            flush.signal(deadline);
                        }
                    }
                    Some(Err(err)) => trace!("{}: {}", link.id(), err),
                    _ => {}
                }
            }
            Err(err) => {
                trace!("{}: rx error {}", link.id(), err);
                link.on_peripheral_error();
            }
        }
    }
}

async fn transmit_loop<const RX: usize, const TX: usize>(
    mut tx: UartTx<'_, Async>,
    link: &ChannelLink<RX>,
    control: &PortControl<TX>,
) {
    loop {
        let frame = control.next_frame().await;
        match tx.write(&frame).await {
            Ok(()) => link.on_tx_complete(),
            Err(err) => {
                trace!("{}: tx error {}", link.id(), err);
                link.on_peripheral_error();
            }
        }
    }
}
