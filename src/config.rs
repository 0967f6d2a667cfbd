//! Application-wide constants and compile-time configuration.
//!
//! All bus addresses, timing parameters, tag memory layouts and protocol
//! constants live here so they can be tuned in one place.

// Scan scheduling

/// Minimum time between two scan ticks (ms).
pub const SCAN_INTERVAL_MS: u64 = 40;

/// Settle time after switching the multiplexer before talking to the reader (ms).
pub const CHANNEL_SETTLE_MS: u32 = 20;

/// Upper bound on a single passive-target detection (ms).
pub const DETECT_TIMEOUT_MS: u32 = 80;

/// Boot delay after closing all mux channels, before the first scan (ms).
pub const BOOT_SETTLE_MS: u64 = 300;

// Debounce

/// Consecutive identical text observations required to publish new text.
pub const THRESHOLD_TEXT: u8 = 2;

/// Consecutive "empty" observations required to clear published text.
pub const THRESHOLD_EMPTY: u8 = 5;

// Multiplexer

/// TCA9548A 7-bit I2C address (A0..A2 tied low).
pub const MUX_I2C_ADDRESS: u8 = 0x70;

/// Physical mux ports for TAG1, TAG2, TAG3.
pub const MUX_PORTS: [u8; 3] = [5, 6, 7];

// PN532

/// Passive activation retries programmed on every session (0xFF = forever).
pub const PN532_ACTIVATION_RETRIES: u8 = 2;

/// Deadline for a regular command, ACK and response together (ms).
pub const PN532_RESPONSE_TIMEOUT_MS: u32 = 100;

// Tag memory layouts

/// MIFARE Classic data blocks read in one go (sector 1, trailer excluded).
pub const CLASSIC_BLOCKS: [u8; 3] = [4, 5, 6];

/// MIFARE Classic block size in bytes.
pub const CLASSIC_BLOCK_SIZE: usize = 16;

/// Publicly known factory key A.
pub const CLASSIC_DEFAULT_KEY: [u8; 6] = [0xFF; 6];

/// First NTAG/Ultralight user page read.
pub const PAGE_START: u8 = 3;

/// Number of consecutive pages read (3..=15).
pub const PAGE_COUNT: u8 = 13;

/// NTAG/Ultralight page size in bytes.
pub const PAGE_SIZE: usize = 4;

/// Bytes rendered as raw ASCII when no NDEF text record is found.
pub const FALLBACK_PREFIX_LEN: usize = 16;

/// Capacity of a decoded text value. Large enough for the page buffer.
pub const TEXT_CAPACITY: usize = 64;

// Serial command interface

/// Longest command line accepted before the line is discarded.
pub const COMMAND_LINE_CAPACITY: usize = 64;

/// Longest response line (`TAGn:` + text + CRLF).
pub const RESPONSE_CAPACITY: usize = TEXT_CAPACITY + 8;

/// A partial line with no terminator is taken as complete after this
/// much serial silence (ms).
pub const LINE_IDLE_TIMEOUT_MS: u64 = 30;

/// Command lines and responses queued between USB and the scan loop.
pub const COMMAND_QUEUE_DEPTH: usize = 4;

// USB

/// USB VID/PID - use the "pid.codes" open-source test VID.
/// Replace with your own allocated VID/PID for production.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0002;

/// USB device strings.
pub const USB_MANUFACTURER: &str = "tagmux";
pub const USB_PRODUCT: &str = "Three-slot NFC tag reader";
pub const USB_SERIAL_NUMBER: &str = "000001";

/// CDC-ACM bulk endpoint packet size.
pub const USB_PACKET_SIZE: u16 = 64;

/// A response the host does not collect within this time is dropped (ms).
pub const USB_WRITE_TIMEOUT_MS: u64 = 100;

// GPIO pin assignments (nRF52840-DK defaults)
//
// These are logical names; actual `embassy_nrf::peripherals::*` types are
// selected in `main.rs`.  Adjust for your custom PCB.
//
//   I²C SDA        → P0.26
//   I²C SCL        → P0.27
