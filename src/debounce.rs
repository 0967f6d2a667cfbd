//! Per-slot hysteresis: turns noisy per-poll readings into a stable value.
//!
//! A slot is either settled on its published value or has a pending
//! change that needs a run of identical observations before it is
//! promoted. Appearing text is promoted after [`THRESHOLD_TEXT`]
//! consecutive matches; removal (the empty reading) needs
//! [`THRESHOLD_EMPTY`], which absorbs brief RF dropouts.

use crate::config::{THRESHOLD_EMPTY, THRESHOLD_TEXT};
use crate::tag::Reading;

/// Which kind of change a pending candidate represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Text appearing, or one text replacing another.
    Arrival,
    /// Published text going back to empty.
    Removal,
}

impl Direction {
    /// Direction implied by an observed candidate.
    pub fn of(candidate: &Reading) -> Self {
        if candidate.is_empty() {
            Direction::Removal
        } else {
            Direction::Arrival
        }
    }

    /// Consecutive observations needed before promotion.
    pub fn threshold(self) -> u8 {
        match self {
            Direction::Arrival => THRESHOLD_TEXT,
            Direction::Removal => THRESHOLD_EMPTY,
        }
    }
}

/// Debounce state of one slot.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TagState {
    /// No change under evaluation.
    Settled(Reading),
    /// `candidate` has been seen `count` times in a row and differs from `stable`.
    Pending {
        stable: Reading,
        candidate: Reading,
        count: u8,
        direction: Direction,
    },
}

impl Default for TagState {
    fn default() -> Self {
        TagState::Settled(Reading::Empty)
    }
}

impl TagState {
    /// Feed one observation and return the next state.
    ///
    /// | observation          | result                                    |
    /// |----------------------|-------------------------------------------|
    /// | equals `stable`      | `Settled(stable)` (pending change dropped) |
    /// | equals `candidate`   | count + 1, promote at threshold           |
    /// | anything else        | new candidate with count 1                |
    pub fn apply(self, observed: Reading) -> TagState {
        let (stable, pending) = match self {
            TagState::Settled(stable) => (stable, None),
            TagState::Pending {
                stable,
                candidate,
                count,
                ..
            } => (stable, Some((candidate, count))),
        };

        if observed == stable {
            return TagState::Settled(stable);
        }

        let count = match pending {
            Some((candidate, count)) if candidate == observed => count.saturating_add(1),
            _ => 1,
        };
        let direction = Direction::of(&observed);

        if count >= direction.threshold() {
            TagState::Settled(observed)
        } else {
            TagState::Pending {
                stable,
                candidate: observed,
                count,
                direction,
            }
        }
    }

    /// Last published value.
    pub fn stable(&self) -> &Reading {
        match self {
            TagState::Settled(stable) | TagState::Pending { stable, .. } => stable,
        }
    }

    /// Value under evaluation, if any.
    pub fn candidate(&self) -> Option<&Reading> {
        match self {
            TagState::Settled(_) => None,
            TagState::Pending { candidate, .. } => Some(candidate),
        }
    }

    /// Consecutive sightings of the candidate (0 when settled).
    pub fn count(&self) -> u8 {
        match self {
            TagState::Settled(_) => 0,
            TagState::Pending { count, .. } => *count,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, TagState::Settled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TagText;

    fn text(s: &str) -> Reading {
        let mut t = TagText::new();
        t.push_str(s).unwrap();
        Reading::Text(t)
    }

    fn feed(mut state: TagState, observations: &[Reading]) -> TagState {
        for obs in observations {
            state = state.apply(obs.clone());
        }
        state
    }

    #[test]
    fn starts_settled_on_empty() {
        let state = TagState::default();
        assert!(state.is_settled());
        assert_eq!(state.stable(), &Reading::Empty);
        assert_eq!(state.candidate(), None);
        assert_eq!(state.count(), 0);
    }

    #[test]
    fn text_promotes_on_second_match() {
        let state = TagState::default().apply(text("HELLO"));
        assert_eq!(state.stable(), &Reading::Empty);
        assert_eq!(state.candidate(), Some(&text("HELLO")));
        assert_eq!(state.count(), 1);
        assert!(matches!(
            state,
            TagState::Pending {
                direction: Direction::Arrival,
                ..
            }
        ));

        let state = state.apply(text("HELLO"));
        assert_eq!(state, TagState::Settled(text("HELLO")));
    }

    #[test]
    fn removal_needs_five_empties() {
        let state = TagState::Settled(text("HELLO"));
        let state = feed(state, &vec![Reading::Empty; 4]);
        assert_eq!(state.stable(), &text("HELLO"));
        assert_eq!(state.count(), 4);
        assert!(matches!(
            state,
            TagState::Pending {
                direction: Direction::Removal,
                ..
            }
        ));

        let state = state.apply(Reading::Empty);
        assert_eq!(state, TagState::Settled(Reading::Empty));
    }

    #[test]
    fn stable_observation_cancels_pending_change() {
        let state = feed(TagState::Settled(text("A")), &vec![Reading::Empty; 3]);
        assert_eq!(state.count(), 3);

        let state = state.apply(text("A"));
        assert_eq!(state, TagState::Settled(text("A")));

        // The removal run starts over.
        let state = feed(state, &vec![Reading::Empty; 4]);
        assert_eq!(state.stable(), &text("A"));
    }

    #[test]
    fn repeating_stable_value_is_idempotent() {
        let mut state = TagState::Settled(text("A"));
        for _ in 0..10 {
            state = state.apply(text("A"));
            assert_eq!(state, TagState::Settled(text("A")));
        }
    }

    #[test]
    fn different_observation_restarts_count() {
        let state = feed(TagState::default(), &[text("A"), text("B")]);
        assert_eq!(state.candidate(), Some(&text("B")));
        assert_eq!(state.count(), 1);
        assert_eq!(state.stable(), &Reading::Empty);
    }

    #[test]
    fn text_replacing_text_uses_low_threshold() {
        let state = feed(TagState::Settled(text("A")), &[text("B"), text("B")]);
        assert_eq!(state, TagState::Settled(text("B")));
    }

    #[test]
    fn dropout_inside_text_run_delays_promotion() {
        let state = feed(
            TagState::default(),
            &[text("A"), Reading::Empty, text("A")],
        );
        // The empty reading equals stable and cleared the candidate.
        assert_eq!(state.count(), 1);
        assert_eq!(state.stable(), &Reading::Empty);
    }

    #[test]
    fn interrupted_removal_starts_over() {
        let state = feed(
            TagState::Settled(text("A")),
            &[
                Reading::Empty,
                Reading::Empty,
                text("B"),
                Reading::Empty,
                Reading::Empty,
                Reading::Empty,
                Reading::Empty,
            ],
        );
        assert_eq!(state.stable(), &text("A"));
        assert_eq!(state.count(), 4);
    }

    #[test]
    fn thresholds_match_direction() {
        assert_eq!(Direction::of(&Reading::Empty), Direction::Removal);
        assert_eq!(Direction::of(&text("x")), Direction::Arrival);
        assert_eq!(Direction::Arrival.threshold(), 2);
        assert_eq!(Direction::Removal.threshold(), 5);
    }
}
