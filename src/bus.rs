//! Collaborator interfaces the reader adapter drives.
//!
//! Both are synchronous and fallible. Concrete I²C implementations live in
//! [`crate::tca9548a`] and [`crate::pn532_ext`]; tests use scripted fakes.

use crate::error::Error;

/// Longest ISO14443A UID (triple size).
pub const MAX_UID_LEN: usize = 10;

/// UID of a detected target.
pub type TargetId = heapless::Vec<u8, MAX_UID_LEN>;

/// MIFARE Classic sector key.
pub type MifareKey = [u8; 6];

/// Reader identity reported by GetFirmwareVersion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion {
    pub ic: u8,
    pub version: u8,
    pub revision: u8,
    pub support: u8,
}

/// I²C channel multiplexer. Only one port may be open at a time.
pub trait Multiplexer {
    fn close_all(&mut self) -> Result<(), Error>;
    fn open_channel(&mut self, port: u8) -> Result<(), Error>;
    fn close_channel(&mut self, port: u8) -> Result<(), Error>;
}

/// NFC transceiver behind the currently open mux port.
pub trait Transceiver {
    /// Presence check; fails when no reader answers on the bus.
    fn firmware_version(&mut self) -> Result<FirmwareVersion, Error>;

    /// Per-presence-check session setup (SAM mode, activation retries).
    fn configure_session(&mut self) -> Result<(), Error>;

    /// Look for one ISO14443A target, giving up after `timeout_ms`.
    /// `Ok(None)` means no tag in the field.
    fn detect_target(&mut self, timeout_ms: u32) -> Result<Option<TargetId>, Error>;

    /// MIFARE Classic key-A authentication for the sector holding `block`.
    fn authenticate_block(&mut self, uid: &[u8], block: u8, key: &MifareKey)
        -> Result<(), Error>;

    /// Read one 16-byte MIFARE Classic block (after authentication).
    fn read_block(&mut self, block: u8) -> Result<[u8; 16], Error>;

    /// Read one 4-byte NTAG/Ultralight page.
    fn read_page(&mut self, page: u8) -> Result<[u8; 4], Error>;
}
