//! USB CDC-ACM serial port.
//!
//! Initialises the Embassy USB stack on the nRF52840 hardware USB
//! peripheral and exposes one CDC-ACM interface. Everything here runs on
//! the USB executor; the scan loop only sees two queues:
//!
//! - complete command lines, from the host ([`next_line`])
//! - response lines, to the host ([`queue_response`])

use defmt::{info, warn};
use embassy_futures::select::{select3, Either3};
use embassy_nrf::usb::vbus_detect::HardwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_nrf::{self, bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{with_timeout, Duration};
use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, Config, UsbDevice};
use static_cell::StaticCell;
use tagmux::command::{Line, LineBuffer, Response};
use tagmux::config;

bind_interrupts!(struct Irqs {
    USBD => embassy_nrf::usb::InterruptHandler<peripherals::USBD>;
    CLOCK_POWER => embassy_nrf::usb::vbus_detect::InterruptHandler;
});

pub type UsbDriver = Driver<'static, peripherals::USBD, HardwareVbusDetect>;

static CDC_STATE: StaticCell<State> = StaticCell::new();
static USB_CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_CTRL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static USB_POWER_HANDLER: StaticCell<UsbPowerHandler> = StaticCell::new();

static LINES: Channel<CriticalSectionRawMutex, Line, { config::COMMAND_QUEUE_DEPTH }> =
    Channel::new();
static RESPONSES: Channel<CriticalSectionRawMutex, Response, { config::COMMAND_QUEUE_DEPTH }> =
    Channel::new();

struct UsbPowerHandler;

impl embassy_usb::Handler for UsbPowerHandler {
    fn suspended(&mut self, suspended: bool) {
        info!("USB bus suspended={}", suspended);
    }
}

/// Build result: the device runner and the serial class.
pub struct UsbSerial {
    pub device: UsbDevice<'static, UsbDriver>,
    pub class: CdcAcmClass<'static, UsbDriver>,
}

/// Initialise the USB stack and create the serial port.
///
/// Must be called exactly once. All static buffers are consumed here.
pub fn init(usbd: peripherals::USBD) -> UsbSerial {
    let driver = Driver::new(usbd, Irqs, HardwareVbusDetect::new(Irqs));

    let mut usb_config = Config::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(config::USB_SERIAL_NUMBER);
    usb_config.max_power = 100; // mA
    usb_config.max_packet_size_0 = 64;

    // CDC-ACM is two interfaces tied together by an IAD.
    usb_config.device_class = 0xEF;
    usb_config.device_sub_class = 0x02;
    usb_config.device_protocol = 0x01;
    usb_config.composite_with_iads = true;

    let mut builder = Builder::new(
        driver,
        usb_config,
        USB_CONFIG_DESC.init([0u8; 256]),
        USB_BOS_DESC.init([0u8; 256]),
        USB_MSOS_DESC.init([0u8; 256]),
        USB_CTRL_BUF.init([0u8; 64]),
    );

    builder.handler(USB_POWER_HANDLER.init(UsbPowerHandler));

    let class = CdcAcmClass::new(
        &mut builder,
        CDC_STATE.init(State::new()),
        config::USB_PACKET_SIZE,
    );
    let device = builder.build();

    info!("USB CDC-ACM serial port initialised");

    UsbSerial { device, class }
}

/// Run the device stack and both serial directions. Never returns.
pub async fn run(mut device: UsbDevice<'static, UsbDriver>, class: CdcAcmClass<'static, UsbDriver>) -> ! {
    info!("USB device task started");
    let (mut tx, mut rx) = class.split();
    match select3(device.run(), read_lines(&mut rx), write_responses(&mut tx)).await {
        Either3::First(never) | Either3::Second(never) | Either3::Third(never) => never,
    }
}

/// Wait for the next complete command line from the host.
pub async fn next_line() -> Line {
    LINES.receive().await
}

/// Hand a response to the USB side. Dropped if the host is not keeping up.
pub fn queue_response(response: Response) {
    if RESPONSES.try_send(response).is_err() {
        warn!("USB serial: response queue full, dropped");
    }
}

fn submit_line(line: Line) {
    if LINES.try_send(line).is_err() {
        warn!("USB serial: command queue full, line dropped");
    }
}

/// Assemble host bytes into lines. A line still unterminated after
/// [`config::LINE_IDLE_TIMEOUT_MS`] of silence is taken as complete.
async fn read_lines(rx: &mut Receiver<'static, UsbDriver>) -> ! {
    let mut lines = LineBuffer::new();
    let mut packet = [0u8; config::USB_PACKET_SIZE as usize];
    let idle = Duration::from_millis(config::LINE_IDLE_TIMEOUT_MS);

    loop {
        rx.wait_connection().await;
        info!("USB serial connected");

        loop {
            let read = if lines.is_pending() {
                match with_timeout(idle, rx.read_packet(&mut packet)).await {
                    Ok(read) => read,
                    Err(_) => {
                        if let Some(line) = lines.flush() {
                            submit_line(line);
                        }
                        continue;
                    }
                }
            } else {
                rx.read_packet(&mut packet).await
            };

            match read {
                Ok(n) => {
                    for &byte in &packet[..n] {
                        if let Some(line) = lines.push(byte) {
                            submit_line(line);
                        }
                    }
                }
                Err(EndpointError::BufferOverflow) => warn!("USB serial packet overflow"),
                Err(EndpointError::Disabled) => {
                    info!("USB serial disconnected");
                    break;
                }
            }
        }
    }
}

/// Send queued responses, giving each [`config::USB_WRITE_TIMEOUT_MS`].
async fn write_responses(tx: &mut Sender<'static, UsbDriver>) -> ! {
    let timeout = Duration::from_millis(config::USB_WRITE_TIMEOUT_MS);
    loop {
        let response = RESPONSES.receive().await;
        match with_timeout(timeout, write_line(tx, response.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("USB serial write failed: {}", e),
            Err(_) => warn!("USB serial write timed out, response dropped"),
        }
    }
}

/// Write one response line, splitting it into full-size packets.
///
/// A line that ends exactly on a packet boundary is followed by a
/// zero-length packet so the host sees the transfer end.
async fn write_line(tx: &mut Sender<'static, UsbDriver>, line: &[u8]) -> Result<(), EndpointError> {
    let packet = usize::from(config::USB_PACKET_SIZE);
    for chunk in line.chunks(packet) {
        tx.write_packet(chunk).await?;
    }
    if line.len() % packet == 0 {
        tx.write_packet(&[]).await?;
    }
    Ok(())
}
