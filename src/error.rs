//! Unified error type for tagmux.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the reader stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // I2C
    /// An I²C transaction was not acknowledged or failed on the bus.
    Bus,

    /// Multiplexer port outside 0..=7.
    InvalidChannel(u8),

    // PN532
    /// The reader did not deliver its response before the deadline.
    Timeout,

    /// The reader did not acknowledge a command, or sent a malformed ACK.
    NoAck,

    /// A response frame failed validation (preamble, checksum, length).
    Frame,

    /// InDataExchange reported a non-zero status (RF error, auth failure, ...).
    Status(u8),

    // Generic
    /// Buffer too small for the requested operation.
    BufferOverflow,
}
