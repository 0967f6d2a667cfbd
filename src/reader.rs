//! Tag reader adapter - one reading per slot per call.
//!
//! Selects the slot's mux port exclusively, waits for the bus to settle,
//! checks that a reader answers and tries two read strategies:
//!
//! 1. MIFARE Classic: authenticate sector 1 with the factory key and read
//!    blocks 4..=6 (48 bytes).
//! 2. NTAG / Ultralight: read pages 3..=15 (52 bytes).
//!
//! The port is closed again on every exit path. Every failure degrades to
//! [`Reading::Empty`]; the debounce layer absorbs transient misses.

use embedded_hal::delay::DelayNs;

use crate::bus::{Multiplexer, Transceiver};
use crate::config::{
    CHANNEL_SETTLE_MS, CLASSIC_BLOCKS, CLASSIC_BLOCK_SIZE, CLASSIC_DEFAULT_KEY,
    DETECT_TIMEOUT_MS, PAGE_COUNT, PAGE_SIZE, PAGE_START,
};
use crate::error::Error;
use crate::log_macros::{debug, info, warning};
use crate::ndef;
use crate::scheduler::ChannelReader;
use crate::tag::{Channel, Reading};

const CLASSIC_DUMP_LEN: usize = CLASSIC_BLOCKS.len() * CLASSIC_BLOCK_SIZE;
const PAGE_DUMP_LEN: usize = PAGE_COUNT as usize * PAGE_SIZE;

/// Reader adapter over a multiplexer, a transceiver and a delay source.
pub struct TagReader<M, T, D> {
    mux: M,
    nfc: T,
    delay: D,
}

impl<M, T, D> TagReader<M, T, D>
where
    M: Multiplexer,
    T: Transceiver,
    D: DelayNs,
{
    pub fn new(mux: M, nfc: T, delay: D) -> Self {
        Self { mux, nfc, delay }
    }

    /// Boot-time reset: disconnect every mux port.
    pub fn init(&mut self) -> Result<(), Error> {
        self.mux.close_all()?;
        info!("mux: all ports closed");
        Ok(())
    }

    /// Read one slot. Always returns either `Empty` or decoded text.
    pub fn read(&mut self, channel: Channel) -> Reading {
        let port = channel.mux_port();

        let selected = self
            .mux
            .close_all()
            .and_then(|()| self.mux.open_channel(port));
        let reading = match selected {
            Ok(()) => {
                self.delay.delay_ms(CHANNEL_SETTLE_MS);
                self.read_selected()
            }
            Err(e) => {
                warning!("TAG{}: mux select failed: {}", channel.number(), e);
                Reading::Empty
            }
        };

        if let Err(e) = self.mux.close_channel(port) {
            warning!("TAG{}: mux close failed: {}", channel.number(), e);
        }
        reading
    }

    /// Release the collaborators.
    pub fn release(self) -> (M, T, D) {
        (self.mux, self.nfc, self.delay)
    }

    fn read_selected(&mut self) -> Reading {
        if self.nfc.firmware_version().is_err() {
            return Reading::Empty;
        }
        if let Err(e) = self.nfc.configure_session() {
            debug!("session setup failed: {}", e);
        }

        let uid = match self.nfc.detect_target(DETECT_TIMEOUT_MS) {
            Ok(Some(uid)) if !uid.is_empty() => uid,
            _ => return Reading::Empty,
        };

        // Once the Classic triplet reads, its result is final.
        if let Some(dump) = self.read_classic(&uid) {
            return ndef::decode(&dump);
        }
        match self.read_pages() {
            Some(dump) => ndef::decode(&dump),
            None => Reading::Empty,
        }
    }

    fn read_classic(&mut self, uid: &[u8]) -> Option<[u8; CLASSIC_DUMP_LEN]> {
        self.nfc
            .authenticate_block(uid, CLASSIC_BLOCKS[0], &CLASSIC_DEFAULT_KEY)
            .ok()?;

        let mut dump = [0u8; CLASSIC_DUMP_LEN];
        for (chunk, &block) in dump
            .chunks_exact_mut(CLASSIC_BLOCK_SIZE)
            .zip(CLASSIC_BLOCKS.iter())
        {
            chunk.copy_from_slice(&self.nfc.read_block(block).ok()?);
        }
        Some(dump)
    }

    fn read_pages(&mut self) -> Option<[u8; PAGE_DUMP_LEN]> {
        let mut dump = [0u8; PAGE_DUMP_LEN];
        for (chunk, page) in dump.chunks_exact_mut(PAGE_SIZE).zip(PAGE_START..) {
            chunk.copy_from_slice(&self.nfc.read_page(page).ok()?);
        }
        Some(dump)
    }
}

impl<M, T, D> ChannelReader for TagReader<M, T, D>
where
    M: Multiplexer,
    T: Transceiver,
    D: DelayNs,
{
    fn read_channel(&mut self, channel: Channel) -> Reading {
        self.read(channel)
    }
}
