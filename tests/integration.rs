//! Integration tests for tagmux host-testable logic.
//!
//! A simulated bench stands in for the hardware: a TCA9548A at 0x70 on
//! the I²C bus decides which PN532 answers on the reader link. The real
//! mux driver, PN532 transceiver, reader adapter, scheduler and command
//! interface run on top.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;
use std::task::Poll;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use tagmux::config::{MUX_I2C_ADDRESS, SCAN_INTERVAL_MS};
use tagmux::pn532_ext::Pn532Reader;
use tagmux::tca9548a::Tca9548a;
use tagmux::{handle_line, Channel, LineBuffer, Reading, ScanScheduler, TagReader};

const ACK: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];

// ═══════════════════════════════════════════════════════════════════════════
// Simulated bench
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
enum Tag {
    None,
    Ntag([u8; 64]),
    Classic([[u8; 16]; 3]),
}

/// One PN532, answering at the frame level.
struct SimReader {
    tag: Tag,
    pending: VecDeque<Vec<u8>>,
}

impl SimReader {
    fn new(tag: Tag) -> Self {
        Self {
            tag,
            pending: VecDeque::new(),
        }
    }

    fn respond(&self, command: u8, data: &[u8]) -> Vec<u8> {
        match (command, data, &self.tag) {
            (0x02, _, _) => vec![0x32, 0x01, 0x06, 0x07],
            (0x14, _, _) | (0x32, _, _) => vec![],
            (0x4A, _, Tag::None) => vec![0x00],
            (0x4A, _, Tag::Ntag(_)) => {
                vec![0x01, 0x01, 0x00, 0x44, 0x00, 0x07, 0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0x80]
            }
            (0x4A, _, Tag::Classic(_)) => {
                vec![0x01, 0x01, 0x00, 0x04, 0x08, 0x04, 0x11, 0x22, 0x33, 0x44]
            }
            (0x40, [0x01, 0x60, ..], Tag::Classic(_)) => vec![0x00],
            (0x40, [0x01, 0x30, block], Tag::Classic(blocks)) => {
                let mut out = vec![0x00];
                match block {
                    4..=6 => out.extend_from_slice(&blocks[(*block - 4) as usize]),
                    _ => return vec![0x01],
                }
                out
            }
            (0x40, [0x01, 0x30, page], Tag::Ntag(memory)) => {
                let start = *page as usize * 4;
                let mut out = vec![0x00];
                out.extend((start..start + 16).map(|i| memory.get(i).copied().unwrap_or(0)));
                out
            }
            // Auth on an NTAG, or anything while no tag is present.
            (0x40, _, _) => vec![0x14],
            _ => vec![0x00],
        }
    }

    fn on_write(&mut self, bytes: &[u8]) {
        let len = bytes[3] as usize;
        let command = bytes[6];
        let reply = self.respond(command, &bytes[7..5 + len]);

        let mut body = vec![0xD5, command + 1];
        body.extend_from_slice(&reply);
        let body_len = body.len() as u8;
        let dcs = body.iter().fold(0u8, |s, b| s.wrapping_add(*b)).wrapping_neg();
        let mut frame = vec![0x00, 0x00, 0xFF, body_len, body_len.wrapping_neg()];
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&[dcs, 0x00]);

        self.pending.clear();
        self.pending.push_back(ACK.to_vec());
        self.pending.push_back(frame);
    }

    fn on_read(&mut self, buf: &mut [u8]) {
        buf.fill(0);
        if let Some(front) = self.pending.pop_front() {
            let n = front.len().min(buf.len());
            buf[..n].copy_from_slice(&front[..n]);
        }
    }
}

#[derive(Default)]
struct Bench {
    mask: u8,
    readers: [Option<SimReader>; 8],
    /// Mask after every mux write.
    mask_history: Vec<u8>,
}

impl Bench {
    fn with_reader(mut self, port: u8, tag: Tag) -> Self {
        self.readers[port as usize] = Some(SimReader::new(tag));
        self
    }

    fn set_tag(&mut self, port: u8, tag: Tag) {
        if let Some(reader) = self.readers[port as usize].as_mut() {
            reader.tag = tag;
        }
    }

    /// The PN532 reachable right now, if exactly one port is open.
    fn selected(&mut self) -> Option<&mut SimReader> {
        if self.mask.count_ones() != 1 {
            return None;
        }
        self.readers[self.mask.trailing_zeros() as usize].as_mut()
    }
}

const NAK: ErrorKind = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);

/// Handle to the shared bench: an I²C bus for the mux and the PN532 link
/// behind it.
#[derive(Clone)]
struct BusHandle(Rc<RefCell<Bench>>);

impl ErrorType for BusHandle {
    type Error = ErrorKind;
}

impl I2c for BusHandle {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut bench = self.0.borrow_mut();
        for op in operations {
            match (address, op) {
                (MUX_I2C_ADDRESS, Operation::Write(bytes)) => {
                    bench.mask = bytes[0];
                    let mask = bench.mask;
                    bench.mask_history.push(mask);
                }
                _ => return Err(NAK),
            }
        }
        Ok(())
    }
}

impl pn532::Interface for BusHandle {
    type Error = ErrorKind;

    fn write(&mut self, frame: &mut [u8]) -> Result<(), ErrorKind> {
        self.0.borrow_mut().selected().ok_or(NAK)?.on_write(frame);
        Ok(())
    }

    fn wait_ready(&mut self) -> Poll<Result<(), ErrorKind>> {
        match self.0.borrow_mut().selected() {
            None => Poll::Ready(Err(NAK)),
            Some(reader) if reader.pending.is_empty() => Poll::Pending,
            Some(_) => Poll::Ready(Ok(())),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        self.0.borrow_mut().selected().ok_or(NAK)?.on_read(buf);
        Ok(())
    }
}

/// Counts polls instead of time: one poll per millisecond of timeout.
#[derive(Default)]
struct PollBudget(u128);

impl pn532::CountDown for PollBudget {
    type Time = Duration;

    fn start<D: Into<Self::Time>>(&mut self, count: D) {
        self.0 = count.into().as_millis();
    }

    fn wait(&mut self) -> nb::Result<(), Infallible> {
        if self.0 == 0 {
            return Ok(());
        }
        self.0 -= 1;
        Err(nb::Error::WouldBlock)
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

type BenchReader = TagReader<Tca9548a<BusHandle>, Pn532Reader<BusHandle, PollBudget>, NoDelay>;

fn rig(bench: Bench) -> (BenchReader, Rc<RefCell<Bench>>) {
    let bench = Rc::new(RefCell::new(bench));
    let reader = TagReader::new(
        Tca9548a::new(BusHandle(bench.clone())),
        Pn532Reader::new(BusHandle(bench.clone()), PollBudget::default()),
        NoDelay,
    );
    (reader, bench)
}

/// Three PN532s on ports 5, 6, 7, all with empty fields.
fn three_readers() -> Bench {
    Bench::default()
        .with_reader(5, Tag::None)
        .with_reader(6, Tag::None)
        .with_reader(7, Tag::None)
}

fn ntag_with_text(text: &[u8]) -> Tag {
    let mut memory = [0u8; 64];
    memory[12..16].copy_from_slice(&[0xE1, 0x10, 0x12, 0x00]);
    let record_len = 7 + text.len();
    memory[16] = 0x03;
    memory[17] = record_len as u8;
    memory[18..25].copy_from_slice(&[0xD1, 0x01, (text.len() + 3) as u8, b'T', 0x02, b'e', b'n']);
    memory[25..25 + text.len()].copy_from_slice(text);
    memory[25 + text.len()] = 0xFE;
    Tag::Ntag(memory)
}

fn classic_with_text(text: &[u8]) -> Tag {
    let mut sector = [0u8; 48];
    sector[0] = 0x03;
    sector[1] = (7 + text.len()) as u8;
    sector[2..9].copy_from_slice(&[0xD1, 0x01, (text.len() + 3) as u8, b'T', 0x02, b'e', b'n']);
    sector[9..9 + text.len()].copy_from_slice(text);
    sector[9 + text.len()] = 0xFE;

    let mut blocks = [[0u8; 16]; 3];
    for (block, chunk) in blocks.iter_mut().zip(sector.chunks_exact(16)) {
        block.copy_from_slice(chunk);
    }
    Tag::Classic(blocks)
}

/// Run `rounds` full round-robin passes, one tick per scan interval.
fn run_rounds(scheduler: &mut ScanScheduler, reader: &mut BenchReader, clock: &mut u64, rounds: usize) {
    for _ in 0..rounds * 3 {
        *clock += SCAN_INTERVAL_MS;
        assert!(scheduler.poll(*clock, reader).is_some());
    }
}

fn query(scheduler: &mut ScanScheduler, line: &str) -> String {
    handle_line(scheduler, line)
        .expect("valid query is answered")
        .to_string()
}

// ═══════════════════════════════════════════════════════════════════════════
// End-to-end scenarios
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn ntag_on_slot_two_is_published_after_two_rounds() {
    let (mut reader, _bench) = rig(three_readers().with_reader(6, ntag_with_text(b"PLA Red")));
    let mut scheduler = ScanScheduler::default();
    let mut clock = 0;

    run_rounds(&mut scheduler, &mut reader, &mut clock, 1);
    assert_eq!(query(&mut scheduler, "scan TAG2"), "TAG2:empty\r\n");

    run_rounds(&mut scheduler, &mut reader, &mut clock, 1);
    assert_eq!(query(&mut scheduler, "scan TAG2"), "TAG2:PLA Red\r\n");
    assert_eq!(query(&mut scheduler, "SCAN tag1"), "TAG1:empty\r\n");
    assert_eq!(query(&mut scheduler, "SCAN TAG3"), "TAG3:empty\r\n");
}

#[test]
fn classic_tag_on_slot_three_is_decoded() {
    let (mut reader, _bench) =
        rig(three_readers().with_reader(7, classic_with_text(b"PETG Galaxy Black")));
    let mut scheduler = ScanScheduler::default();
    let mut clock = 0;

    run_rounds(&mut scheduler, &mut reader, &mut clock, 2);
    assert_eq!(query(&mut scheduler, "scan tag3"), "TAG3:PETG Galaxy Black\r\n");
}

#[test]
fn removal_is_published_only_after_five_empty_rounds() {
    let (mut reader, bench) = rig(three_readers().with_reader(5, ntag_with_text(b"ASA")));
    let mut scheduler = ScanScheduler::default();
    let mut clock = 0;

    run_rounds(&mut scheduler, &mut reader, &mut clock, 2);
    assert_eq!(query(&mut scheduler, "scan TAG1"), "TAG1:ASA\r\n");

    bench.borrow_mut().set_tag(5, Tag::None);
    run_rounds(&mut scheduler, &mut reader, &mut clock, 4);
    assert_eq!(query(&mut scheduler, "scan TAG1"), "TAG1:ASA\r\n");

    run_rounds(&mut scheduler, &mut reader, &mut clock, 1);
    assert_eq!(query(&mut scheduler, "scan TAG1"), "TAG1:empty\r\n");
}

#[test]
fn brief_dropout_does_not_flicker() {
    let tag = ntag_with_text(b"TPU 95A");
    let (mut reader, bench) = rig(three_readers().with_reader(6, tag.clone()));
    let mut scheduler = ScanScheduler::default();
    let mut clock = 0;

    run_rounds(&mut scheduler, &mut reader, &mut clock, 2);
    bench.borrow_mut().set_tag(6, Tag::None);
    run_rounds(&mut scheduler, &mut reader, &mut clock, 2);
    bench.borrow_mut().set_tag(6, tag);
    run_rounds(&mut scheduler, &mut reader, &mut clock, 1);

    assert_eq!(scheduler.stable(Channel::Tag2).as_str(), "TPU 95A");
    assert!(scheduler.state(Channel::Tag2).is_settled());
}

#[test]
fn missing_reader_reads_empty_and_leaves_mux_closed() {
    let bench = Bench::default()
        .with_reader(6, ntag_with_text(b"HIPS"))
        .with_reader(7, Tag::None);
    let (mut reader, bench) = rig(bench);
    reader.init().unwrap();

    assert_eq!(reader.read(Channel::Tag1), Reading::Empty);
    assert_eq!(reader.read(Channel::Tag2).as_str(), "HIPS");

    let bench = bench.borrow();
    assert_eq!(bench.mask, 0x00);
    // close-all, select, deselect per read.
    assert_eq!(bench.mask_history, vec![0x00, 0x00, 0x20, 0x00, 0x00, 0x40, 0x00]);
}

#[test]
fn serial_byte_stream_answers_each_query_line() {
    let (mut reader, _bench) = rig(three_readers().with_reader(6, ntag_with_text(b"Nylon")));
    let mut scheduler = ScanScheduler::default();
    let mut clock = 0;
    run_rounds(&mut scheduler, &mut reader, &mut clock, 2);

    let mut lines = LineBuffer::new();
    let mut out = String::new();
    for &byte in b"scan TAG2\r\nhello\nSCAN: tag2\nSCAN TAG9\r\nscan tag2".iter() {
        if let Some(line) = lines.push(byte) {
            if let Some(response) = handle_line(&mut scheduler, &line) {
                out.push_str(&response);
            }
        }
    }
    // The last query has no terminator; the idle flush completes it.
    let line = lines.flush().expect("pending query");
    out.push_str(&handle_line(&mut scheduler, &line).expect("answered"));
    assert_eq!(out, "TAG2:Nylon\r\nTAG2:Nylon\r\nTAG2:Nylon\r\n");
}

#[test]
fn suspended_scheduler_does_not_touch_the_bus() {
    let (mut reader, bench) = rig(three_readers());
    let mut scheduler = ScanScheduler::default();

    scheduler.suspend();
    assert_eq!(scheduler.poll(1_000, &mut reader), None);
    assert!(bench.borrow().mask_history.is_empty());

    scheduler.resume();
    assert_eq!(scheduler.poll(1_040, &mut reader), Some(Channel::Tag1));
    assert!(!bench.borrow().mask_history.is_empty());
}
