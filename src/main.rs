//! Breakout Monitor Main Application
//!
//! Entry point for the STM32F407-based breakout monitor firmware.
//! Initializes hardware, builds the four channel controllers and spawns
//! their worker, pump and flush tasks.

#![no_std]
#![no_main]

use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_stm32::can::{self as bxcan, Can};
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::interrupt::Interrupt;
use embassy_stm32::mode::Blocking;
use embassy_stm32::spi::{self, Spi};
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{self as stm_usart, Uart};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_time::Delay;
use {defmt_rtt as _, panic_probe as _};

use breakout_firmware::channel::{Channel, ChannelLink, RelayPins};
use breakout_firmware::config::{self, RX_BUFFER_SIZE, UART_TX_BUFFER_SIZE, CAN_TX_BUFFER_SIZE};
use breakout_firmware::drivers::spi_flash::SpiFlash;
use breakout_firmware::hal::gpio::{relay_output, FaultLed};
use breakout_firmware::hal::port::{PortAdapter, PortControl, PortRequest};
use breakout_firmware::hal::spi::ChipSelectDevice;
use breakout_firmware::hal::timer::SystemClock;
use breakout_firmware::hal::{can, usart};
use breakout_firmware::types::ChannelId;
use breakout_firmware::worker::tasks::{run_channel, run_flush, CommandQueue, FlushSignal};

// Bind interrupt handlers
bind_interrupts!(struct Irqs {
    USART1 => stm_usart::InterruptHandler<peripherals::USART1>;
    USART2 => stm_usart::InterruptHandler<peripherals::USART2>;
    USART3 => stm_usart::InterruptHandler<peripherals::USART3>;
    CAN1_TX => bxcan::TxInterruptHandler<peripherals::CAN1>;
    CAN1_RX0 => bxcan::Rx0InterruptHandler<peripherals::CAN1>;
    CAN1_RX1 => bxcan::Rx1InterruptHandler<peripherals::CAN1>;
    CAN1_SCE => bxcan::SceInterruptHandler<peripherals::CAN1>;
});

type Flash = SpiFlash<ChipSelectDevice<Spi<'static, Blocking>, Output<'static>>>;

type UartChannel = Channel<
    'static,
    Output<'static>,
    PortAdapter<UART_TX_BUFFER_SIZE>,
    SystemClock,
    Delay,
    RX_BUFFER_SIZE,
    UART_TX_BUFFER_SIZE,
>;

type CanChannel = Channel<
    'static,
    Output<'static>,
    PortAdapter<CAN_TX_BUFFER_SIZE>,
    SystemClock,
    Delay,
    RX_BUFFER_SIZE,
    CAN_TX_BUFFER_SIZE,
>;

// Interrupt-shared channel state
static UART1_LINK: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART1);
static UART2_LINK: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::UART2);
static CAN1_LINK: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::CAN1);
static RS232_LINK: ChannelLink<RX_BUFFER_SIZE> = ChannelLink::new(&config::RS232);

// Controller to pump task
static UART1_PORT: PortControl<UART_TX_BUFFER_SIZE> = PortControl::new();
static UART2_PORT: PortControl<UART_TX_BUFFER_SIZE> = PortControl::new();
static CAN1_PORT: PortControl<CAN_TX_BUFFER_SIZE> = PortControl::new();
static RS232_PORT: PortControl<UART_TX_BUFFER_SIZE> = PortControl::new();

// GUI side to channel workers
static UART1_COMMANDS: CommandQueue = CommandQueue::new();
static UART2_COMMANDS: CommandQueue = CommandQueue::new();
static CAN1_COMMANDS: CommandQueue = CommandQueue::new();
static RS232_COMMANDS: CommandQueue = CommandQueue::new();

static UART1_FLUSH: FlushSignal = FlushSignal::new();

static UART1_IRQS: [Interrupt; 1] = [Interrupt::USART1];
static UART2_IRQS: [Interrupt; 1] = [Interrupt::USART2];
static RS232_IRQS: [Interrupt; 1] = [Interrupt::USART3];
static CAN1_IRQS: [Interrupt; 4] = [
    Interrupt::CAN1_TX,
    Interrupt::CAN1_RX0,
    Interrupt::CAN1_RX1,
    Interrupt::CAN1_SCE,
];

/// Peripherals owned by a USART pump task
struct UartResources<T, RX, TX, TXDMA, RXDMA> {
    usart: T,
    rx: RX,
    tx: TX,
    tx_dma: TXDMA,
    rx_dma: RXDMA,
}

/// Peripherals owned by the CAN pump task
struct CanResources {
    can: peripherals::CAN1,
    rx: peripherals::PB8,
    tx: peripherals::PB9,
}

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Breakout Monitor Firmware v{}", env!("CARGO_PKG_VERSION"));

    // 8 MHz HSE -> 168 MHz SYSCLK, APB1 = 42 MHz
    let mut clocks = embassy_stm32::Config::default();
    {
        use embassy_stm32::rcc::{
            AHBPrescaler, APBPrescaler, Hse, HseMode, Pll, PllMul, PllPDiv, PllPreDiv, PllQDiv,
            PllSource, Sysclk,
        };
        clocks.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Oscillator,
        });
        clocks.rcc.pll_src = PllSource::HSE;
        clocks.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL168,
            divp: Some(PllPDiv::DIV2),
            divq: Some(PllQDiv::DIV7),
            divr: None,
        });
        clocks.rcc.ahb_pre = AHBPrescaler::DIV1;
        clocks.rcc.apb1_pre = APBPrescaler::DIV4;
        clocks.rcc.apb2_pre = APBPrescaler::DIV2;
        clocks.rcc.sys = Sysclk::PLL1_P;
    }
    let p = embassy_stm32::init(clocks);

    info!("Peripherals initialized");

    let mut fault = FaultLed::new(Output::new(p.PD13, Level::Low, Speed::Low));

    // SPI2 log flash: PB13 = SCK, PB15 = MOSI, PB14 = MISO, PB12 = CS
    let mut spi_config = spi::Config::default();
    spi_config.frequency = Hertz(10_000_000);
    let bus = Spi::new_blocking(p.SPI2, p.PB13, p.PB15, p.PB14, spi_config);
    let cs = Output::new(p.PB12, Level::High, Speed::VeryHigh);
    let mut flash: Flash = SpiFlash::new(ChipSelectDevice::new(bus, cs));

    match flash.jedec_id() {
        Ok(id) => info!(
            "Log flash {=u8:#x}/{=u8:#x}, {} bytes",
            id.manufacturer,
            id.memory_type,
            id.size_bytes()
        ),
        Err(err) => {
            warn!("Log flash not responding: {}", err);
            fault.raise();
        }
    }

    let clock = SystemClock::new();

    let mut uart1: UartChannel = Channel::new(
        &config::UART1,
        &UART1_LINK,
        RelayPins {
            switch: relay_output(p.PC0, config::UART1.switch_relay),
            power: config::UART1.power_relay.map(|spec| relay_output(p.PE0, spec)),
            termination: None,
        },
        PortAdapter::new(ChannelId::Uart1, &UART1_PORT, &UART1_IRQS, usart::check_config),
        clock,
        Delay,
    );
    let mut uart2: UartChannel = Channel::new(
        &config::UART2,
        &UART2_LINK,
        RelayPins {
            switch: relay_output(p.PC1, config::UART2.switch_relay),
            power: config::UART2.power_relay.map(|spec| relay_output(p.PE1, spec)),
            termination: None,
        },
        PortAdapter::new(ChannelId::Uart2, &UART2_PORT, &UART2_IRQS, usart::check_config),
        clock,
        Delay,
    );
    let mut can1: CanChannel = Channel::new(
        &config::CAN1,
        &CAN1_LINK,
        RelayPins {
            switch: relay_output(p.PE2, config::CAN1.switch_relay),
            power: None,
            termination: config::CAN1
                .termination_relay
                .map(|spec| relay_output(p.PE3, spec)),
        },
        PortAdapter::new(ChannelId::Can1, &CAN1_PORT, &CAN1_IRQS, can::check_config),
        clock,
        Delay,
    );
    let mut rs232: UartChannel = Channel::new(
        &config::RS232,
        &RS232_LINK,
        RelayPins {
            switch: relay_output(p.PE4, config::RS232.switch_relay),
            power: None,
            termination: None,
        },
        PortAdapter::new(ChannelId::Rs232, &RS232_PORT, &RS232_IRQS, usart::check_config),
        clock,
        Delay,
    );

    if let Err(err) = uart1.init(&mut flash) {
        warn!("UART1 log erase failed: {}", err);
        fault.raise();
    }
    // Only buffered channels touch the store
    for result in [uart2.init(&mut flash), can1.init(&mut flash), rs232.init(&mut flash)] {
        if let Err(err) = result {
            warn!("Channel init failed: {}", err);
            fault.raise();
        }
    }

    info!("Channels initialized");

    // Pump tasks own the bus peripherals
    unwrap!(spawner.spawn(uart1_pump(UartResources {
        usart: p.USART1,
        rx: p.PA10,
        tx: p.PA9,
        tx_dma: p.DMA2_CH7,
        rx_dma: p.DMA2_CH5,
    })));
    unwrap!(spawner.spawn(uart2_pump(UartResources {
        usart: p.USART2,
        rx: p.PA3,
        tx: p.PA2,
        tx_dma: p.DMA1_CH6,
        rx_dma: p.DMA1_CH5,
    })));
    unwrap!(spawner.spawn(rs232_pump(UartResources {
        usart: p.USART3,
        rx: p.PB11,
        tx: p.PB10,
        tx_dma: p.DMA1_CH3,
        rx_dma: p.DMA1_CH1,
    })));
    unwrap!(spawner.spawn(can1_pump(CanResources {
        can: p.CAN1,
        rx: p.PB8,
        tx: p.PB9,
    })));

    // Workers own the controllers
    unwrap!(spawner.spawn(uart_worker(uart1, &UART1_COMMANDS)));
    unwrap!(spawner.spawn(uart_worker(uart2, &UART2_COMMANDS)));
    unwrap!(spawner.spawn(uart_worker(rs232, &RS232_COMMANDS)));
    unwrap!(spawner.spawn(can_worker(can1, &CAN1_COMMANDS)));
    unwrap!(spawner.spawn(uart1_flush(flash, clock)));

    info!("Tasks spawned");
}

/// Command and debug-transmit worker of a UART-type channel
#[embassy_executor::task(pool_size = 3)]
async fn uart_worker(channel: UartChannel, commands: &'static CommandQueue) {
    run_channel(channel, commands).await
}

/// Command and debug-transmit worker of the CAN channel
#[embassy_executor::task]
async fn can_worker(channel: CanChannel, commands: &'static CommandQueue) {
    run_channel(channel, commands).await
}

/// Drains UART1 receive buffers into the log flash
#[embassy_executor::task]
async fn uart1_flush(flash: Flash, clock: SystemClock) {
    run_flush(&UART1_LINK, &UART1_FLUSH, flash, clock).await
}

#[embassy_executor::task]
async fn uart1_pump(
    mut r: UartResources<
        peripherals::USART1,
        peripherals::PA10,
        peripherals::PA9,
        peripherals::DMA2_CH7,
        peripherals::DMA2_CH5,
    >,
) {
    let mut request = UART1_PORT.request().await;
    loop {
        request = match request {
            PortRequest::Close => UART1_PORT.request().await,
            PortRequest::Open(cfg) => {
                let opened = Uart::new(
                    &mut r.usart,
                    &mut r.rx,
                    &mut r.tx,
                    Irqs,
                    &mut r.tx_dma,
                    &mut r.rx_dma,
                    usart::driver_config(&cfg),
                );
                match opened {
                    Ok(uart) => {
                        usart::serve(uart, &cfg, &UART1_LINK, &UART1_PORT, Some(&UART1_FLUSH)).await
                    }
                    Err(err) => {
                        warn!("UART1: open failed: {}", err);
                        UART1_LINK.on_peripheral_error();
                        UART1_PORT.request().await
                    }
                }
            }
        };
    }
}

#[embassy_executor::task]
async fn uart2_pump(
    mut r: UartResources<
        peripherals::USART2,
        peripherals::PA3,
        peripherals::PA2,
        peripherals::DMA1_CH6,
        peripherals::DMA1_CH5,
    >,
) {
    let mut request = UART2_PORT.request().await;
    loop {
        request = match request {
            PortRequest::Close => UART2_PORT.request().await,
            PortRequest::Open(cfg) => {
                let opened = Uart::new(
                    &mut r.usart,
                    &mut r.rx,
                    &mut r.tx,
                    Irqs,
                    &mut r.tx_dma,
                    &mut r.rx_dma,
                    usart::driver_config(&cfg),
                );
                match opened {
                    Ok(uart) => usart::serve(uart, &cfg, &UART2_LINK, &UART2_PORT, None).await,
                    Err(err) => {
                        warn!("UART2: open failed: {}", err);
                        UART2_LINK.on_peripheral_error();
                        UART2_PORT.request().await
                    }
                }
            }
        };
    }
}

#[embassy_executor::task]
async fn rs232_pump(
    mut r: UartResources<
        peripherals::USART3,
        peripherals::PB11,
        peripherals::PB10,
        peripherals::DMA1_CH3,
        peripherals::DMA1_CH1,
    >,
) {
    let mut request = RS232_PORT.request().await;
    loop {
        request = match request {
            PortRequest::Close => RS232_PORT.request().await,
            PortRequest::Open(cfg) => {
                let opened = Uart::new(
                    &mut r.usart,
                    &mut r.rx,
                    &mut r.tx,
                    Irqs,
                    &mut r.tx_dma,
                    &mut r.rx_dma,
                    usart::driver_config(&cfg),
                );
                match opened {
                    Ok(uart) => usart::serve(uart, &cfg, &RS232_LINK, &RS232_PORT, None).await,
                    Err(err) => {
                        warn!("RS232: open failed: {}", err);
                        RS232_LINK.on_peripheral_error();
                        RS232_PORT.request().await
                    }
                }
            }
        };
    }
}

#[embassy_executor::task]
async fn can1_pump(mut r: CanResources) {
    let mut request = CAN1_PORT.request().await;
    loop {
        request = match request {
            PortRequest::Close => CAN1_PORT.request().await,
            PortRequest::Open(cfg) => {
                let can = Can::new(&mut r.can, &mut r.rx, &mut r.tx, Irqs);
                can::serve(can, &cfg, &CAN1_LINK, &CAN1_PORT).await
            }
        };
    }
}
