//! Host-testable core of the tagmux firmware.
//!
//! Everything that does not touch nRF52840 peripherals lives here: the
//! NDEF text decoder, per-slot debounce, the round-robin scheduler, the
//! serial command protocol, the reader adapter, the TCA9548A driver
//! (generic over `embedded-hal` 1.0) and the PN532 transceiver on top of
//! the `pn532` crate.
//!
//! Usage: `cargo test`
//!
//! Note: The embedded binary uses main.rs with #![no_std] and #![no_main]
//! and is only built with `--features embedded`.

#![cfg_attr(not(test), no_std)]

mod log_macros;

pub mod bus;
pub mod command;
pub mod config;
pub mod debounce;
pub mod error;
pub mod ndef;
pub mod pn532_ext;
pub mod reader;
pub mod scheduler;
pub mod tag;
pub mod tca9548a;

pub use command::{handle_line, parse_command, LineBuffer};
pub use error::Error;
pub use reader::TagReader;
pub use scheduler::{ChannelReader, ScanScheduler};
pub use tag::{Channel, Reading};

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests - cross-module behaviour
// ═══════════════════════════════════════════════════════════════════════════
