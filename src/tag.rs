//! Logical reader slots and the values observed on them.

use core::fmt;

use crate::config::{MUX_PORTS, TEXT_CAPACITY};

/// Decoded, printable-ASCII tag text.
pub type TagText = heapless::String<TEXT_CAPACITY>;

/// Wire spelling of the "no tag / nothing readable" value.
pub const EMPTY: &str = "empty";

/// One of the three logical reader slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Tag1,
    Tag2,
    Tag3,
}

impl Channel {
    /// All slots in round-robin order.
    pub const ALL: [Channel; 3] = [Channel::Tag1, Channel::Tag2, Channel::Tag3];

    /// Slot from its 1-based protocol number (`TAG1` → 1).
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Channel::Tag1),
            2 => Some(Channel::Tag2),
            3 => Some(Channel::Tag3),
            _ => None,
        }
    }

    /// 1-based protocol number.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// 0-based array index.
    pub fn index(self) -> usize {
        match self {
            Channel::Tag1 => 0,
            Channel::Tag2 => 1,
            Channel::Tag3 => 2,
        }
    }

    /// Physical multiplexer port wired to this slot.
    pub fn mux_port(self) -> u8 {
        MUX_PORTS[self.index()]
    }

    /// Next slot in round-robin order, wrapping after `Tag3`.
    pub fn next(self) -> Self {
        match self {
            Channel::Tag1 => Channel::Tag2,
            Channel::Tag2 => Channel::Tag3,
            Channel::Tag3 => Channel::Tag1,
        }
    }
}

/// Result of one read attempt, and the value published per slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reading {
    /// No tag, reader silent, or nothing printable on the tag.
    #[default]
    Empty,
    /// Non-empty decoded text.
    Text(TagText),
}

impl Reading {
    /// Build a reading from decoded text. An empty string, or a tag that
    /// literally says `empty`, is `Empty`: both render the same on the wire
    /// and must debounce as a removal.
    pub fn from_text(text: TagText) -> Self {
        if text.is_empty() || text == EMPTY {
            Reading::Empty
        } else {
            Reading::Text(text)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Reading::Empty)
    }

    /// Protocol rendering: the text, or `empty`.
    pub fn as_str(&self) -> &str {
        match self {
            Reading::Empty => EMPTY,
            Reading::Text(text) => text.as_str(),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
