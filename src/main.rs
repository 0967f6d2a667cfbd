//! tagmux - three-slot NFC tag poller for the nRF52840.
//!
//! Three PN532 readers sit behind a TCA9548A I²C multiplexer. Two
//! executors share the chip:
//!
//! 1. **Scan** (thread mode) - at most one slot per tick is selected, read
//!    and fed into its debounce state. Between ticks the loop waits up to
//!    one scan interval for a command line and answers it from the
//!    published values with scanning suspended.
//! 2. **USB** (interrupt executor on SWI1) - the device stack and the
//!    serial port. It preempts the scan loop, so a blocking tag read never
//!    stalls enumeration or host traffic.

#![no_std]
#![no_main]

mod usb;

use core::cell::RefCell;
use core::convert::Infallible;

use defmt::{info, unwrap, warn};
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_futures::select::{select, Either};
use embassy_nrf::config::{Config as NrfConfig, HfclkSource};
use embassy_nrf::interrupt;
use embassy_nrf::interrupt::{InterruptExt, Priority};
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_time::{Delay, Instant, Timer};
use embedded_hal_bus::i2c::RefCellDevice;
use pn532::i2c::I2CInterface;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use tagmux::config::{BOOT_SETTLE_MS, SCAN_INTERVAL_MS};
use tagmux::pn532_ext::Pn532Reader;
use tagmux::tca9548a::Tca9548a;
use tagmux::{handle_line, ScanScheduler, TagReader};
use usb::serial;

bind_interrupts!(struct Irqs {
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

static I2C_BUS: StaticCell<RefCell<Twim<'static, peripherals::TWISPI0>>> = StaticCell::new();

static EXECUTOR_USB: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn EGU1_SWI1() {
    EXECUTOR_USB.on_interrupt()
}

/// `pn532` deadline timer on top of the Embassy time driver.
#[derive(Default)]
struct EmbassyCountDown {
    deadline: Option<Instant>,
}

impl pn532::CountDown for EmbassyCountDown {
    type Time = core::time::Duration;

    fn start<D: Into<Self::Time>>(&mut self, count: D) {
        let micros = u64::try_from(count.into().as_micros()).unwrap_or(u64::MAX);
        self.deadline = Instant::now().checked_add(embassy_time::Duration::from_micros(micros));
    }

    fn wait(&mut self) -> nb::Result<(), Infallible> {
        match self.deadline {
            Some(deadline) if Instant::now() < deadline => Err(nb::Error::WouldBlock),
            _ => Ok(()),
        }
    }
}

/// Builds the USB stack on the USB executor, then hands it to a local task.
/// The device and class are not `Send`, so they are created where they run.
#[embassy_executor::task]
async fn usb_bootstrap(usbd: peripherals::USBD) {
    let spawner = Spawner::for_current_executor().await;
    let serial::UsbSerial { device, class } = serial::init(usbd);
    unwrap!(spawner.spawn(usb_serial(device, class)));
}

#[embassy_executor::task]
async fn usb_serial(
    device: embassy_usb::UsbDevice<'static, serial::UsbDriver>,
    class: embassy_usb::class::cdc_acm::CdcAcmClass<'static, serial::UsbDriver>,
) -> ! {
    serial::run(device, class).await
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("tagmux starting");

    // USB needs the external crystal.
    let mut nrf_config = NrfConfig::default();
    nrf_config.hfclk_source = HfclkSource::ExternalXtal;
    let p = embassy_nrf::init(nrf_config);

    interrupt::EGU1_SWI1.set_priority(Priority::P6);
    let usb_spawner = EXECUTOR_USB.start(interrupt::EGU1_SWI1);
    unwrap!(usb_spawner.spawn(usb_bootstrap(p.USBD)));

    // Shared I²C bus: SDA P0.26, SCL P0.27.
    let mut twim_config = twim::Config::default();
    twim_config.frequency = twim::Frequency::K100;
    let twim = Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim_config);
    let bus = I2C_BUS.init(RefCell::new(twim));

    let mux = Tca9548a::new(RefCellDevice::new(bus));
    let nfc = Pn532Reader::new(
        I2CInterface {
            i2c: RefCellDevice::new(bus),
        },
        EmbassyCountDown::default(),
    );
    let mut reader = TagReader::new(mux, nfc, Delay);

    if let Err(e) = reader.init() {
        warn!("mux reset failed: {}", e);
    }
    Timer::after_millis(BOOT_SETTLE_MS).await;

    let mut scheduler = ScanScheduler::default();

    info!("scanning started");

    loop {
        scheduler.poll(Instant::now().as_millis(), &mut reader);

        let line = match select(serial::next_line(), Timer::after_millis(SCAN_INTERVAL_MS)).await {
            Either::First(line) => line,
            Either::Second(()) => continue,
        };

        if let Some(response) = handle_line(&mut scheduler, &line) {
            serial::queue_response(response);
        }
    }
}
