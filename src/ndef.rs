//! NDEF text extraction from raw tag memory dumps.
//!
//! Tag memory rarely starts cleanly at a record header: Type 2 tags carry a
//! capability container and TLV wrapper in front, MIFARE Classic sectors
//! may hold MAD leftovers, and some writers produce slightly off layouts.
//! Instead of walking the TLV chain we scan every offset for a short
//! well-known `T` record and take the first one that is well formed.
//!
//! Short record layout as matched here (no ID field):
//! ```text
//! i-3: header   MB ME CF SR IL TNF(3)   TNF = 1, SR = 1
//! i-2: type length                       = 1
//! i-1: payload length (1 byte, SR)
//! i  : type                              = 'T'
//! i+1: status   UTF16(1) RFU(1) LANG_LEN(5)
//!      language code (LANG_LEN bytes)
//!      text (rest of payload)
//! ```

use crate::config::FALLBACK_PREFIX_LEN;
use crate::tag::{Reading, TagText};

/// Type Name Format field of the record header.
const TNF_MASK: u8 = 0x07;
const TNF_WELL_KNOWN: u8 = 0x01;

/// Short Record flag.
const FLAG_SR: u8 = 0x10;

/// Well-known record type "T".
const RTD_TEXT: u8 = b'T';

/// Language code length bits of the text status byte.
const LANG_LEN_MASK: u8 = 0x1F;

/// Terminator TLV; text never continues past it.
const TLV_TERMINATOR: u8 = 0xFE;

/// Header + type length + payload length + type + status + 1 text byte.
const MIN_RECORD_LEN: usize = 6;

/// Placeholder for bytes outside printable ASCII.
const PLACEHOLDER: char = '.';

/// Decode a tag memory dump into a reading.
///
/// Prefers the first well-formed NDEF text record; otherwise renders the
/// first [`FALLBACK_PREFIX_LEN`] bytes as ASCII up to the first NUL.
pub fn decode(buf: &[u8]) -> Reading {
    match extract_text(buf) {
        Some(text) => Reading::from_text(text),
        None => ascii_prefix(&buf[..buf.len().min(FALLBACK_PREFIX_LEN)]),
    }
}

/// Find the first well-formed short NDEF text record anywhere in `buf`.
pub fn extract_text(buf: &[u8]) -> Option<TagText> {
    if buf.len() < MIN_RECORD_LEN {
        return None;
    }
    // `i` is the offset of the type byte; two bytes must follow it.
    (3..buf.len() - 2).find_map(|i| text_record_at(buf, i))
}

/// Render bytes as printable ASCII, stopping at the first NUL.
pub fn ascii_prefix(bytes: &[u8]) -> Reading {
    let mut out = TagText::new();
    push_printable(&mut out, bytes.iter().copied().take_while(|&b| b != 0x00));
    Reading::from_text(out)
}

fn text_record_at(buf: &[u8], type_at: usize) -> Option<TagText> {
    let header = buf[type_at - 3];
    let type_len = buf[type_at - 2];
    let payload_len = buf[type_at - 1] as usize;

    if header & TNF_MASK != TNF_WELL_KNOWN
        || header & FLAG_SR == 0
        || type_len != 1
        || buf[type_at] != RTD_TEXT
        || payload_len == 0
    {
        return None;
    }

    let payload_start = type_at + 1;
    let payload = buf.get(payload_start..payload_start + payload_len)?;
    let lang_len = (payload[0] & LANG_LEN_MASK) as usize;
    let text = payload.get(1 + lang_len..).filter(|t| !t.is_empty())?;

    let mut out = TagText::new();
    push_printable(
        &mut out,
        text.iter()
            .copied()
            .take_while(|&b| b != 0x00 && b != TLV_TERMINATOR),
    );
    (!out.is_empty()).then_some(out)
}

fn push_printable(out: &mut TagText, bytes: impl Iterator<Item = u8>) {
    for b in bytes {
        let c = if (32..=126).contains(&b) { b as char } else { PLACEHOLDER };
        if out.push(c).is_err() {
            break;
        }
    }
}
