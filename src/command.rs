//! Line-oriented serial command interface.
//!
//! ```text
//! host → device:  scan TAG2\n
//! device → host:  TAG2:Spool 42\r\n
//! ```
//!
//! A query is any line that starts with `SCAN` and whose first `TAG` is
//! followed by a slot digit, so `scan TAG2`, `SCAN: tag2` and `scantag2x`
//! all ask about slot 2. Matching is ASCII case-insensitive after trimming
//! whitespace. Anything else gets no answer at all.

use core::fmt::Write as _;

use crate::config::{COMMAND_LINE_CAPACITY, RESPONSE_CAPACITY};
use crate::scheduler::ScanScheduler;
use crate::tag::{Channel, Reading};

/// One response line, CRLF-terminated.
pub type Response = heapless::String<RESPONSE_CAPACITY>;

const VERB: &[u8] = b"SCAN";
const NOUN: &[u8] = b"TAG";

/// Parse a query line into the slot it asks about.
pub fn parse_command(line: &str) -> Option<Channel> {
    let line = line.trim().as_bytes();
    strip_prefix_ignore_case(line, VERB)?;
    let at = line
        .windows(NOUN.len())
        .position(|word| word.eq_ignore_ascii_case(NOUN))?;
    match line.get(at + NOUN.len()).copied()? {
        digit @ b'1'..=b'3' => Channel::from_number(digit - b'0'),
        _ => None,
    }
}

/// Render `TAG<n>:<value>\r\n`.
pub fn format_response(channel: Channel, value: &Reading) -> Response {
    let mut out = Response::new();
    // Capacity covers the prefix plus the largest possible text.
    let _ = write!(out, "TAG{}:{}\r\n", channel.number(), value);
    out
}

/// Answer one line against the published state, scanning suspended.
pub fn handle_line(scheduler: &mut ScanScheduler, line: &str) -> Option<Response> {
    let channel = parse_command(line)?;
    Some(scheduler.while_suspended(|s| format_response(channel, s.stable(channel))))
}

fn strip_prefix_ignore_case<'a>(bytes: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    if bytes.len() >= prefix.len() && bytes[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&bytes[prefix.len()..])
    } else {
        None
    }
}

/// One complete command line, terminator stripped.
pub type Line = heapless::String<COMMAND_LINE_CAPACITY>;

/// Assembles serial bytes into command lines.
///
/// `\n` or `\r` ends a line; blank lines are skipped. A line that would
/// overflow is dropped up to its terminator. Hosts that send no
/// terminator at all are served by [`LineBuffer::flush`] once the serial
/// line goes idle.
pub struct LineBuffer {
    buf: heapless::Vec<u8, COMMAND_LINE_CAPACITY>,
    overflowed: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            overflowed: false,
        }
    }

    /// Push one byte; returns the completed line when `byte` terminates one.
    pub fn push(&mut self, byte: u8) -> Option<Line> {
        if byte == b'\n' || byte == b'\r' {
            let overflowed = core::mem::replace(&mut self.overflowed, false);
            let line = core::str::from_utf8(&self.buf)
                .ok()
                .filter(|line| !overflowed && !line.is_empty())
                .and_then(|line| Line::try_from(line).ok());
            self.buf.clear();
            return line;
        }

        if !self.overflowed && self.buf.push(byte).is_err() {
            self.overflowed = true;
            self.buf.clear();
        }
        None
    }

    /// Bytes of an unterminated line are buffered.
    pub fn is_pending(&self) -> bool {
        !self.buf.is_empty() || self.overflowed
    }

    /// End the buffered line as if a terminator had arrived.
    pub fn flush(&mut self) -> Option<Line> {
        self.push(b'\n')
    }
}
