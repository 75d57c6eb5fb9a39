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

//! Per-mote state carried across `progress()` calls: DODAG membership, the downward routing
//! table, the trickle clock, pending timers, and the small outbound queues the state machine
//! drains one frame/event at a time.

use heapless::Vec;

use crate::dodag::{is_better_parent, is_eligible_parent, ChooseOutcome, ParentInfo};
use crate::message::{HostEvent, Message};
use crate::routing::RoutingTable;
use crate::timers::Timers;
use crate::trickle::TrickleState;
use crate::{
    NodeId, Rank, RoleType, TimeMs, INFINITE_RANK, MAINT_BURST_COUNT, MAX_PENDING_HOST_EVENTS,
    MAX_PENDING_TX,
};

/// A queued outbound frame. `None` destination means link-layer broadcast.
pub type OutboundFrame = (Option<NodeId>, Message);

pub(crate) struct Context {
    pub(crate) role: RoleType,
    pub(crate) self_addr: NodeId,
    pub(crate) in_dodag: bool,
    pub(crate) rank: Rank,
    pub(crate) parent: Option<ParentInfo>,
    pub(crate) routing_table: RoutingTable,
    pub(crate) trickle: TrickleState,
    pub(crate) timers: Timers,
    pending_tx: Vec<OutboundFrame, MAX_PENDING_TX>,
    host_events: Vec<HostEvent, MAX_PENDING_HOST_EVENTS>,
    /// MOBILE_OPERATOR only: MAINT probes still owed in the current burst.
    pub(crate) maint_burst_remaining: u8,
    /// MOBILE_OPERATOR only: MAINTACKs received for the current burst.
    pub(crate) maintack_count: u8,
}

impl Context {
    pub(crate) fn new(role: RoleType, self_addr: NodeId) -> Self {
        Self {
            role,
            self_addr,
            in_dodag: role == RoleType::Root,
            rank: if role == RoleType::Root { 0 } else { INFINITE_RANK },
            parent: None,
            routing_table: RoutingTable::new(),
            trickle: TrickleState::new(),
            timers: Timers::new(),
            pending_tx: Vec::new(),
            host_events: Vec::new(),
            maint_burst_remaining: 0,
            maintack_count: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        let role = self.role;
        let self_addr = self.self_addr;
        *self = Self::new(role, self_addr);
    }

    /// Queue an outbound frame for the state machine to drain as `Action::Transmit`. Silently
    /// drops the frame if the queue is already full, which would only happen if a single incoming
    /// frame somehow triggered more fan-out than the routing table can hold entries for.
    pub(crate) fn enqueue_tx(&mut self, dest: Option<NodeId>, message: Message) {
        let _ = self.pending_tx.push((dest, message));
    }

    pub(crate) fn drain_tx(&mut self) -> Option<OutboundFrame> {
        if self.pending_tx.is_empty() {
            None
        } else {
            Some(self.pending_tx.remove(0))
        }
    }

    pub(crate) fn has_pending_tx(&self) -> bool {
        !self.pending_tx.is_empty()
    }

    /// ROOT only: record an event for the supervisory host to pick up.
    pub(crate) fn push_host_event(&mut self, event: HostEvent) {
        let _ = self.host_events.push(event);
    }

    pub(crate) fn drain_host_event(&mut self) -> Option<HostEvent> {
        if self.host_events.is_empty() {
            None
        } else {
            Some(self.host_events.remove(0))
        }
    }

    /// A DIO was heard from some neighbor that is not (yet) the current parent: either there is
    /// no parent yet, or `from` is a candidate to replace the current one. The caller is
    /// responsible for routing DIOs from the current parent to [`Self::update_parent`] instead.
    pub(crate) fn on_dio(
        &mut self,
        from: NodeId,
        rank: Rank,
        role: RoleType,
        rss: i8,
        now: TimeMs,
    ) -> ChooseOutcome {
        if self.role == RoleType::Root || !is_eligible_parent(self.role, role) {
            return ChooseOutcome::Unchanged;
        }
        // A candidate at rank `INFINITE_RANK` is an explicit withdrawal; one at `INFINITE_RANK -
        // 1` would make `rank + 1` collide with the sentinel itself (invariant 2: an attached
        // node's rank is always < INFINITE_RANK). Both are refused as parents.
        if rank >= INFINITE_RANK - 1 {
            return ChooseOutcome::Unchanged;
        }

        match self.parent {
            None => {
                self.attach(from, rank, role, rss, now);
                ChooseOutcome::New
            }
            Some(current) => {
                debug_assert_ne!(current.addr, from, "caller must use update_parent for this");
                if is_better_parent(&current, rank, rss, role) {
                    self.attach(from, rank, role, rss, now);
                    ChooseOutcome::Changed
                } else {
                    ChooseOutcome::Unchanged
                }
            }
        }
    }

    fn attach(&mut self, from: NodeId, rank: Rank, role: RoleType, rss: i8, now: TimeMs) {
        self.parent = Some(ParentInfo {
            addr: from,
            rank,
            rss,
            role,
        });
        self.rank = rank.saturating_add(1);
        self.in_dodag = true;
        self.trickle.reset();
        let _ = now;
    }

    /// A DIO arrived from the current parent: refresh its advertised rank/role/rss. Returns
    /// whether the parent's rank changed, in which case the caller must re-advertise its own DIO
    /// and reset the trickle timer.
    ///
    /// Panics if called when there is no current parent; the dispatcher must route DIOs by
    /// sender address before calling this.
    pub(crate) fn update_parent(&mut self, rank: Rank, role: RoleType, rss: i8) -> bool {
        let current = self.parent.expect("update_parent with no parent attached");
        self.parent = Some(ParentInfo {
            addr: current.addr,
            rank,
            rss,
            role,
        });
        let rank_changed = rank != current.rank;
        if rank_changed {
            self.rank = rank.saturating_add(1);
        }
        rank_changed
    }

    /// The parent liveness timer expired (or the parent itself advertised `INFINITE_RANK`): drop
    /// back to the detached state and start soliciting again from the fastest trickle cadence.
    pub(crate) fn detach(&mut self) {
        if self.role == RoleType::Root {
            return;
        }
        self.parent = None;
        self.in_dodag = false;
        self.rank = INFINITE_RANK;
        self.routing_table.clear();
        self.trickle.reset();
    }

    pub(crate) fn start_maint_burst(&mut self) {
        self.maint_burst_remaining = MAINT_BURST_COUNT;
        self.maintack_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_dio_attaches_and_raises_rank() {
        let mut ctx = Context::new(RoleType::Forwarder, 2);
        let outcome = ctx.on_dio(1, 0, RoleType::Root, -60, 0);
        assert_eq!(outcome, ChooseOutcome::New);
        assert_eq!(ctx.rank, 1);
        assert!(ctx.in_dodag);
    }

    #[test]
    fn forwarder_ignores_non_root_dio() {
        let mut ctx = Context::new(RoleType::Forwarder, 2);
        let outcome = ctx.on_dio(5, 1, RoleType::Forwarder, -40, 0);
        assert_eq!(outcome, ChooseOutcome::Unchanged);
        assert!(ctx.parent.is_none());
    }

    #[test]
    fn better_same_role_parent_switches() {
        let mut ctx = Context::new(RoleType::LightSensor, 9);
        ctx.on_dio(1, 1, RoleType::Forwarder, -80, 0);
        let outcome = ctx.on_dio(2, 0, RoleType::Forwarder, -80, 1000);
        assert_eq!(outcome, ChooseOutcome::Changed);
        assert_eq!(ctx.parent.unwrap().addr, 2);
    }

    #[test]
    fn detach_resets_rank_and_clears_parent() {
        let mut ctx = Context::new(RoleType::Forwarder, 2);
        ctx.on_dio(1, 0, RoleType::Root, -60, 0);
        ctx.detach();
        assert!(ctx.parent.is_none());
        assert!(!ctx.in_dodag);
        assert_eq!(ctx.rank, INFINITE_RANK);
    }

    #[test]
    fn root_never_attaches_or_detaches() {
        let mut ctx = Context::new(RoleType::Root, 1);
        ctx.on_dio(9, 0, RoleType::Forwarder, 0, 0);
        assert!(ctx.parent.is_none());
        ctx.detach();
        assert_eq!(ctx.rank, 0);
    }
}
