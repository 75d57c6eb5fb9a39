//  _____       ______   ____
// |_   _|     |  ____|/ ____|  Institute of Embedded Systems
//   | |  _ __ | |__  | (___    Zurich University of Applied Sciences
//   | | | '_ \|  __|  \___ \   8401 Winterthur, Switzerland
//  _| |_| | | | |____ ____) |
// |_____|_| |_|______|_____/
//
// Copyright 2025 Institute of Embedded Systems at Zurich University of Applied Sciences.
// All rights reserved.
// SPDX-License-Identifier: MIT

//! Adaptive beacon cadence: fast while the topology is unsettled, exponentially slower once it
//! has been stable for a while.

use rand_core::RngCore;

use crate::{TimeMs, TRICKLE_IMAX_DOUBLINGS, TRICKLE_IMIN_MS, TRICKLE_K};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrickleState {
    interval: TimeMs,
    counter: u8,
}

impl Default for TrickleState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrickleState {
    pub fn new() -> Self {
        Self {
            interval: TRICKLE_IMIN_MS,
            counter: 0,
        }
    }

    pub fn interval(&self) -> TimeMs {
        self.interval
    }

    fn max_interval() -> TimeMs {
        TRICKLE_IMIN_MS << TRICKLE_IMAX_DOUBLINGS
    }

    /// Uniformly random delay in `[I/2, I]`, used to schedule the next beacon.
    pub fn next_fire_delay(&self, mut rng: impl RngCore) -> TimeMs {
        let half = self.interval / 2;
        half + rng.next_u32() as TimeMs % (self.interval - half + 1)
    }

    /// The interval has elapsed: double it up to the cap and reset the counter for the next one.
    /// [`Self::should_fire`] must be consulted *before* this call, since it reads the counter this
    /// resets.
    pub fn update(&mut self) {
        self.interval = (self.interval * 2).min(Self::max_interval());
        self.counter = 0;
    }

    /// Whether a scheduled beacon should actually be emitted this round (redundancy suppression):
    /// suppressed once `k` consistent transmissions have been observed this interval.
    pub fn should_fire(&self) -> bool {
        self.counter < TRICKLE_K
    }

    /// Record a consistent transmission observed during the current interval (this mote's own
    /// periodic beacon, or a neighbor's DIO that changed nothing). Caps at `k`: once suppression
    /// has kicked in, further observations don't need to count further.
    pub fn observe_consistency(&mut self) {
        if self.counter < TRICKLE_K {
            self.counter += 1;
        }
    }

    /// Inconsistency observed (topology change, new/changed parent, rank change, children
    /// added/removed): collapse back to the fastest cadence.
    pub fn reset(&mut self) {
        self.interval = TRICKLE_IMIN_MS;
        self.counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng as Rng;

    #[test]
    fn init_starts_at_imin() {
        let t = TrickleState::new();
        assert_eq!(t.interval(), TRICKLE_IMIN_MS);
    }

    #[test]
    fn reset_returns_to_imin() {
        let mut t = TrickleState::new();
        for _ in 0..6 {
            t.update();
        }
        assert!(t.interval() > TRICKLE_IMIN_MS);
        t.reset();
        assert_eq!(t.interval(), TRICKLE_IMIN_MS);
    }

    #[test]
    fn update_doubles_up_to_cap() {
        let mut t = TrickleState::new();
        let max = TRICKLE_IMIN_MS << TRICKLE_IMAX_DOUBLINGS;
        for _ in 0..20 {
            t.update();
            assert!(t.interval() >= TRICKLE_IMIN_MS);
            assert!(t.interval() <= max);
        }
        assert_eq!(t.interval(), max);
    }

    #[test]
    fn next_fire_delay_stays_within_half_interval_window() {
        let t = TrickleState::new();
        for _ in 0..200 {
            let delay = t.next_fire_delay(Rng);
            assert!(delay >= t.interval() / 2);
            assert!(delay <= t.interval());
        }
    }

    #[test]
    fn consistency_suppresses_fire_until_next_interval() {
        let mut t = TrickleState::new();
        assert!(t.should_fire());
        for _ in 0..TRICKLE_K {
            t.observe_consistency();
        }
        assert!(!t.should_fire());
        t.update();
        assert!(t.should_fire(), "counter resets for the next interval");
    }
}
