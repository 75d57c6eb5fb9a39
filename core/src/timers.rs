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

//! The engine's notion of time is "what's due next": a small fixed-capacity priority queue of
//! scheduled timers, ordered by due time, so `Mote::progress` can ask for a single `Action::Wait`
//! target instead of juggling several independent deadlines by hand.

use heapless::sorted_linked_list::{LinkedIndexU8, Min, SortedLinkedList};

use crate::TimeMs;

/// What a timer firing means to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerKind {
    /// Trickle-scheduled beacon (DIS while detached, DIO once attached; an attached non-root mote
    /// also re-advertises its own DAO upward on this same fire, §4.7).
    Beacon,
    /// No DIO heard from the current parent within the liveness window.
    ParentLoss,
    /// Sweep the routing table for children that have gone quiet.
    ChildrenEvict,
    /// LIGHT_SENSOR's own periodic sample.
    Sense,
    /// MOBILE_OPERATOR's next MAINT probe within a maintenance burst.
    MaintProbe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub kind: TimerKind,
    pub due: TimeMs,
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.due.cmp(&other.due)
    }
}

/// Up to one pending timer per kind, plus a little headroom; five kinds currently exist.
const MAX_TIMERS: usize = 8;

/// A due-time-ordered queue of scheduled timers.
pub struct Timers {
    queue: SortedLinkedList<Timer, LinkedIndexU8, Min, MAX_TIMERS>,
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

impl Timers {
    pub fn new() -> Self {
        Self {
            queue: SortedLinkedList::new_u8(),
        }
    }

    /// Schedule `kind` to fire at `due`, replacing any existing timer of the same kind.
    pub fn schedule(&mut self, kind: TimerKind, due: TimeMs) {
        self.cancel(kind);
        // Capacity is sized generously above the number of kinds in use; this only fails if a
        // caller schedules the same kind twice without an intervening cancel, which `cancel`
        // above already rules out.
        let _ = self.queue.push(Timer { kind, due });
    }

    /// Drop any pending timer of `kind`, if one is scheduled.
    pub fn cancel(&mut self, kind: TimerKind) {
        self.queue.find_mut(|t| t.kind == kind).map(|f| f.pop());
    }

    /// The due time of the next timer to fire, if any are scheduled.
    pub fn next_due(&self) -> Option<TimeMs> {
        self.queue.peek().map(|t| t.due)
    }

    /// Pop every timer due at or before `now`, in due-time order.
    pub fn pop_due(&mut self, now: TimeMs) -> Option<Timer> {
        match self.queue.peek() {
            Some(t) if t.due <= now => self.queue.pop(),
            _ => None,
        }
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.queue.iter().any(|t| t.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_due_returns_earliest_first() {
        let mut timers = Timers::new();
        timers.schedule(TimerKind::Sense, 500);
        timers.schedule(TimerKind::Beacon, 100);
        timers.schedule(TimerKind::ParentLoss, 300);
        assert_eq!(timers.next_due(), Some(100));
        assert_eq!(timers.pop_due(1000).unwrap().kind, TimerKind::Beacon);
        assert_eq!(timers.pop_due(1000).unwrap().kind, TimerKind::ParentLoss);
        assert_eq!(timers.pop_due(1000).unwrap().kind, TimerKind::Sense);
        assert!(timers.pop_due(1000).is_none());
    }

    #[test]
    fn pop_due_respects_now() {
        let mut timers = Timers::new();
        timers.schedule(TimerKind::Beacon, 500);
        assert!(timers.pop_due(100).is_none());
        assert!(timers.pop_due(500).is_some());
    }

    #[test]
    fn scheduling_same_kind_replaces_previous() {
        let mut timers = Timers::new();
        timers.schedule(TimerKind::ParentLoss, 1000);
        timers.schedule(TimerKind::ParentLoss, 2000);
        assert_eq!(timers.next_due(), Some(2000));
        timers.pop_due(2000);
        assert!(timers.next_due().is_none());
    }

    #[test]
    fn cancel_removes_pending_timer() {
        let mut timers = Timers::new();
        timers.schedule(TimerKind::ChildrenEvict, 50);
        timers.cancel(TimerKind::ChildrenEvict);
        assert!(!timers.is_scheduled(TimerKind::ChildrenEvict));
    }
}
