//! Round-robin scan scheduler.
//!
//! One physical reader is time-sliced across the three slots: every tick
//! reads exactly one slot, feeds the reading into that slot's debounce
//! state and moves the cursor on. Ticks are paced by a minimum interval
//! and are dropped outright while the scheduler is suspended, so the bus
//! is quiet while a command response is being written.

use crate::config::SCAN_INTERVAL_MS;
use crate::debounce::TagState;
use crate::log_macros::debug;
use crate::tag::{Channel, Reading};

/// Anything that can produce one reading for a slot.
///
/// Implemented by [`crate::reader::TagReader`] on hardware and by scripted
/// fakes in tests.
pub trait ChannelReader {
    fn read_channel(&mut self, channel: Channel) -> Reading;
}

/// Owns the per-slot debounce states and the scan cursor.
pub struct ScanScheduler {
    states: [TagState; 3],
    cursor: Channel,
    interval_ms: u64,
    last_tick_ms: u64,
    suspended: bool,
}

impl Default for ScanScheduler {
    fn default() -> Self {
        Self::new(SCAN_INTERVAL_MS)
    }
}

impl ScanScheduler {
    /// Scheduler starting at `Tag1` with every slot settled on empty.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            states: Default::default(),
            cursor: Channel::Tag1,
            interval_ms,
            last_tick_ms: 0,
            suspended: false,
        }
    }

    /// Run one tick if the interval has elapsed and the scheduler is not
    /// suspended. Returns the slot that was read.
    pub fn poll<R: ChannelReader>(&mut self, now_ms: u64, reader: &mut R) -> Option<Channel> {
        if self.suspended || now_ms.wrapping_sub(self.last_tick_ms) < self.interval_ms {
            return None;
        }
        self.last_tick_ms = now_ms;

        let channel = self.cursor;
        let reading = reader.read_channel(channel);
        self.observe(channel, reading);
        self.cursor = channel.next();
        Some(channel)
    }

    /// Feed one observation into a slot's debounce state.
    pub fn observe(&mut self, channel: Channel, reading: Reading) {
        let slot = &mut self.states[channel.index()];
        let before_settled = slot.is_settled();
        let next = core::mem::take(slot).apply(reading);
        if next.is_settled() && !before_settled {
            debug!("TAG{}: settled on {}", channel.number(), next.stable().as_str());
        }
        *slot = next;
    }

    /// Published value of a slot.
    pub fn stable(&self, channel: Channel) -> &Reading {
        self.states[channel.index()].stable()
    }

    /// Full debounce state of a slot.
    pub fn state(&self, channel: Channel) -> &TagState {
        &self.states[channel.index()]
    }

    /// Slot the next tick will read.
    pub fn cursor(&self) -> Channel {
        self.cursor
    }

    /// Stop ticking until [`resume`](Self::resume). Skipped ticks are not made up.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Run `f` with scanning suspended, then restore the previous state.
    pub fn while_suspended<T>(&mut self, f: impl FnOnce(&Self) -> T) -> T {
        let was_suspended = core::mem::replace(&mut self.suspended, true);
        let out = f(self);
        self.suspended = was_suspended;
        out
    }
}
