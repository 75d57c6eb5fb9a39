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

//! The protocol state machine itself: one [`Mote`] per node, driven by `Protocol::progress`.
//!
//! Dispatch is a flat match over [`Message`] rather than a `State` enum with transitions, since
//! this protocol reacts to whatever frame or timer is due next rather than stepping through a
//! fixed sequence of phases the way a TDMA join/beacon/data cycle would.

use heapless::Vec;
use rand_core::RngCore;

use protocol_api::{Action, Protocol};

use crate::context::Context;
use crate::dodag::ChooseOutcome;
use crate::message::{HostEvent, Message};
use crate::routing::PutOutcome;
use crate::timers::TimerKind;
use crate::{
    event_log_action, event_log_detach, event_log_parent, event_log_reset, event_log_route,
    Channel, MoteAction, NodeId, Rank, RoleType, TimeMs, INFINITE_RANK, CHILDREN_SWEEP_PERIOD_MS,
    LIGHT_JITTER_MS, LIGHT_PERIOD_MS, MAINT_BURST_COUNT, MAINT_PROBE_SPACING_MS,
    MAX_PENDING_HOST_EVENTS, MAX_ROUTING_ENTRIES, TIMEOUT_PARENT_MS,
};

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
use defmt::info;
#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
use log::info;

pub struct Mote {
    id: NodeId,
    ctx: Context,
}

impl Mote {
    fn new_internal(role: RoleType, id: NodeId) -> Self {
        let mut ctx = Context::new(role, id);
        ctx.timers.schedule(TimerKind::Beacon, 0);
        if role == RoleType::Root {
            ctx.timers.schedule(TimerKind::ChildrenEvict, CHILDREN_SWEEP_PERIOD_MS);
        }
        event_log_reset!(0u64, id, role);
        Self { id, ctx }
    }

    fn handle_message<T: RngCore>(&mut self, message: Message, rssi: i8, now: TimeMs, rng: &mut T) {
        match message {
            Message::Dis => {
                if self.ctx.in_dodag {
                    self.enqueue_own_dio();
                }
            }
            Message::Dio { from, rank, role } => self.handle_dio(from, rank, role, rssi, now, rng),
            Message::Dao {
                origin,
                origin_role,
                reporter,
            } => self.handle_dao(origin, origin_role, reporter, now),
            Message::TurnOn { target_role } => self.handle_turn_on(target_role, now, rng),
            Message::Ack { from, role } => self.handle_ack(from, role),
            Message::Light { from, level } => self.handle_light(from, level),
            Message::Maint { src } => self.handle_maint(src),
            Message::MaintAck { dst } => self.handle_maint_ack(dst, now),
        }
    }

    fn enqueue_own_dio(&mut self) {
        self.ctx.enqueue_tx(
            None,
            Message::Dio {
                from: self.id,
                rank: self.ctx.rank,
                role: self.ctx.role.as_u8(),
            },
        );
    }

    /// Re-advertise this mote's own DAO to its parent. Per §4.7, this piggybacks on the same
    /// trickle-scheduled timer as the periodic DIO rather than running on a timer of its own, so
    /// its cadence slows down alongside the beacon's as the DODAG stabilizes. No-op at ROOT (which
    /// has no parent to report to) and while detached.
    fn enqueue_own_dao(&mut self) {
        if self.ctx.role == RoleType::Root {
            return;
        }
        if let Some(parent) = self.ctx.parent {
            self.ctx.enqueue_tx(
                Some(parent.addr),
                Message::Dao {
                    origin: self.id,
                    origin_role: self.ctx.role.as_u8(),
                    reporter: self.id,
                },
            );
        }
    }

    fn handle_dio<T: RngCore>(
        &mut self,
        from: NodeId,
        rank: Rank,
        role: u8,
        rssi: i8,
        now: TimeMs,
        rng: &mut T,
    ) {
        let role = match RoleType::from_u8(role) {
            Some(role) => role,
            None => return,
        };

        if let Some(parent) = self.ctx.parent {
            if parent.addr == from {
                // `rank == INFINITE_RANK` is an explicit withdrawal; `rank == INFINITE_RANK - 1`
                // is treated the same way, since computing `rank + 1` for our own rank would
                // otherwise collide with the sentinel (invariant 2).
                if rank >= INFINITE_RANK - 1 {
                    self.ctx.detach();
                    self.cancel_application_timers(now);
                    event_log_detach!(now, self.id);
                } else {
                    self.ctx.timers.schedule(TimerKind::ParentLoss, now + TIMEOUT_PARENT_MS);
                    let rank_changed = self.ctx.update_parent(rank, role, rssi);
                    if rank_changed {
                        self.enqueue_own_dio();
                        self.ctx.trickle.reset();
                    } else {
                        self.ctx.trickle.observe_consistency();
                    }
                }
                return;
            }
        }

        let outcome = self.ctx.on_dio(from, rank, role, rssi, now);
        match outcome {
            ChooseOutcome::New => {
                if let Some(parent) = self.ctx.parent {
                    event_log_parent!(now, self.id, outcome, parent);
                }
                self.ctx.enqueue_tx(
                    Some(from),
                    Message::Dao {
                        origin: self.id,
                        origin_role: self.ctx.role.as_u8(),
                        reporter: self.id,
                    },
                );
                self.ctx.timers.schedule(TimerKind::Beacon, now);
                self.ctx.timers.schedule(TimerKind::ParentLoss, now + TIMEOUT_PARENT_MS);
                self.ctx
                    .timers
                    .schedule(TimerKind::ChildrenEvict, now + CHILDREN_SWEEP_PERIOD_MS);
                if self.ctx.role == RoleType::LightSensor {
                    let delay = light_jitter(rng);
                    self.ctx.timers.schedule(TimerKind::Sense, now + delay);
                }
                if self.ctx.role == RoleType::MobileOperator {
                    self.ctx.start_maint_burst();
                    self.ctx.timers.schedule(TimerKind::MaintProbe, now);
                }
            }
            ChooseOutcome::Changed => {
                if let Some(parent) = self.ctx.parent {
                    event_log_parent!(now, self.id, outcome, parent);
                }
                self.enqueue_own_dio();
                self.ctx.enqueue_tx(
                    Some(from),
                    Message::Dao {
                        origin: self.id,
                        origin_role: self.ctx.role.as_u8(),
                        reporter: self.id,
                    },
                );
                self.ctx.timers.schedule(TimerKind::ParentLoss, now + TIMEOUT_PARENT_MS);
            }
            ChooseOutcome::Unchanged => self.ctx.trickle.observe_consistency(),
        }
    }

    fn handle_dao(&mut self, origin: NodeId, origin_role: u8, reporter: NodeId, now: TimeMs) {
        let role = match RoleType::from_u8(origin_role) {
            Some(role) => role,
            None => return,
        };
        let outcome = self.ctx.routing_table.put(origin, role, reporter, now);
        match outcome {
            PutOutcome::New | PutOutcome::Update => {
                event_log_route!(now, self.id, outcome, origin, reporter);
                if outcome == PutOutcome::New {
                    self.ctx.trickle.reset();
                }
                if self.ctx.role != RoleType::Root {
                    if let Some(parent) = self.ctx.parent {
                        self.ctx.enqueue_tx(
                            Some(parent.addr),
                            Message::Dao {
                                origin,
                                origin_role,
                                reporter: self.id,
                            },
                        );
                    }
                }
            }
            PutOutcome::Full => {}
        }
    }

    fn handle_turn_on<T: RngCore>(&mut self, target_role: u8, now: TimeMs, rng: &mut T) {
        let target = match RoleType::from_u8(target_role) {
            Some(role) => role,
            None => return,
        };

        if self.ctx.role.as_u8() == target_role {
            match self.ctx.role {
                RoleType::ActuatorSprinkler | RoleType::ActuatorLight => {
                    event_log_action!(now, self.id, "actuate");
                    if let Some(parent) = self.ctx.parent {
                        self.ctx.enqueue_tx(
                            Some(parent.addr),
                            Message::Ack {
                                from: self.id,
                                role: self.ctx.role.as_u8(),
                            },
                        );
                    }
                }
                RoleType::LightSensor => {
                    let level = sample_light(rng);
                    if let Some(parent) = self.ctx.parent {
                        self.ctx.enqueue_tx(
                            Some(parent.addr),
                            Message::Light { from: self.id, level },
                        );
                    }
                }
                _ => {}
            }
        } else {
            self.multicast_by_role(target, Message::TurnOn { target_role });
        }
    }

    fn handle_ack(&mut self, from: NodeId, role: u8) {
        if self.ctx.role == RoleType::Root {
            let role = match RoleType::from_u8(role) {
                Some(role) => role,
                None => return,
            };
            self.ctx.push_host_event(HostEvent::Ack { from, role });
        } else if let Some(parent) = self.ctx.parent {
            self.ctx.enqueue_tx(Some(parent.addr), Message::Ack { from, role });
        }
    }

    fn handle_light(&mut self, from: NodeId, level: u16) {
        if self.ctx.role == RoleType::Root {
            self.ctx.push_host_event(HostEvent::Light { from, level });
        } else if let Some(parent) = self.ctx.parent {
            self.ctx.enqueue_tx(Some(parent.addr), Message::Light { from, level });
        }
    }

    fn handle_maint(&mut self, src: NodeId) {
        if self.ctx.role.is_actuator() {
            self.forward_toward(src, Message::MaintAck { dst: src });
        } else {
            self.forward_toward_actuator_class(Message::Maint { src });
        }
    }

    fn handle_maint_ack(&mut self, dst: NodeId, now: TimeMs) {
        if self.ctx.role == RoleType::MobileOperator && dst == self.id {
            self.ctx.maintack_count += 1;
            if self.ctx.maintack_count >= MAINT_BURST_COUNT {
                event_log_action!(now, self.id, "maint_complete");
            }
        } else {
            self.forward_toward(dst, Message::MaintAck { dst });
        }
    }

    /// Forward `message` toward `dest`: via the routing table if `dest` is a known descendant,
    /// else up toward the current parent. Dropped silently if neither applies (unknown
    /// destination at a node with no parent, e.g. the root).
    fn forward_toward(&mut self, dest: NodeId, message: Message) {
        if let Some(entry) = self.ctx.routing_table.get(dest) {
            self.ctx.enqueue_tx(Some(entry.next_hop), message);
        } else if let Some(parent) = self.ctx.parent {
            self.ctx.enqueue_tx(Some(parent.addr), message);
        }
    }

    /// Forward `message` toward any known actuator-class descendant, else up toward the parent.
    /// Used for MAINT probes, which carry no target role of their own.
    fn forward_toward_actuator_class(&mut self, message: Message) {
        let next_hop = self
            .ctx
            .routing_table
            .iter()
            .find(|entry| entry.role.is_actuator())
            .map(|entry| entry.next_hop);
        if let Some(next_hop) = next_hop {
            self.ctx.enqueue_tx(Some(next_hop), message);
        } else if let Some(parent) = self.ctx.parent {
            self.ctx.enqueue_tx(Some(parent.addr), message);
        }
    }

    /// Send one copy of `message` per distinct next hop among routing entries matching
    /// `target_role`.
    fn multicast_by_role(&mut self, target_role: RoleType, message: Message) {
        let mut seen: Vec<NodeId, MAX_ROUTING_ENTRIES> = Vec::new();
        for entry in self.ctx.routing_table.iter_role(target_role) {
            if !seen.contains(&entry.next_hop) {
                let _ = seen.push(entry.next_hop);
                self.ctx.enqueue_tx(Some(entry.next_hop), message.clone());
            }
        }
    }

    fn handle_timer<T: RngCore>(&mut self, kind: TimerKind, now: TimeMs, rng: &mut T) {
        match kind {
            TimerKind::Beacon => self.fire_beacon(now, rng),
            TimerKind::ParentLoss => self.fire_parent_loss(now),
            TimerKind::ChildrenEvict => self.fire_children_evict(now),
            TimerKind::Sense => self.fire_sense(now, rng),
            TimerKind::MaintProbe => self.fire_maint_probe(now),
        }
    }

    /// §4.6/§9 open question 4: a mobile terminal's beacon timer is a one-shot that is only
    /// re-armed while detached (to keep re-soliciting DIS). Once attached it emits no further
    /// DIO/DAO of its own — nothing is ever expected to route through a roaming handheld, so it
    /// has no DODAG position to keep advertising. Every other role keeps re-arming forever.
    ///
    /// Per §4.7, DAO re-advertisement piggybacks on this same trickle-scheduled fire rather than
    /// running on a timer of its own, so it shares the DIO's cadence as the DODAG stabilizes.
    fn fire_beacon<T: RngCore>(&mut self, now: TimeMs, rng: &mut T) {
        if !self.ctx.in_dodag {
            self.ctx.enqueue_tx(None, Message::Dis);
            self.ctx.timers.schedule(TimerKind::Beacon, now + crate::TRICKLE_IMIN_MS);
            return;
        }
        if self.ctx.trickle.should_fire() {
            self.enqueue_own_dio();
            self.enqueue_own_dao();
        }
        self.ctx.trickle.update();
        if self.ctx.role != RoleType::MobileOperator {
            let delay = self.ctx.trickle.next_fire_delay(&mut *rng);
            self.ctx.timers.schedule(TimerKind::Beacon, now + delay);
        }
    }

    fn fire_parent_loss(&mut self, now: TimeMs) {
        self.ctx.detach();
        self.cancel_application_timers(now);
        event_log_detach!(now, self.id);
    }

    fn fire_children_evict(&mut self, now: TimeMs) {
        self.ctx.routing_table.evict_stale(now);
        self.ctx
            .timers
            .schedule(TimerKind::ChildrenEvict, now + CHILDREN_SWEEP_PERIOD_MS);
    }

    fn fire_sense<T: RngCore>(&mut self, now: TimeMs, rng: &mut T) {
        if self.ctx.role == RoleType::LightSensor && self.ctx.in_dodag {
            let level = sample_light(rng);
            if let Some(parent) = self.ctx.parent {
                self.ctx.enqueue_tx(Some(parent.addr), Message::Light { from: self.id, level });
            }
        }
        let delay = light_jitter(rng);
        self.ctx.timers.schedule(TimerKind::Sense, now + delay);
    }

    fn fire_maint_probe(&mut self, now: TimeMs) {
        if self.ctx.maint_burst_remaining == 0 {
            return;
        }
        self.ctx.maint_burst_remaining -= 1;
        self.forward_toward_actuator_class(Message::Maint { src: self.id });
        if self.ctx.maint_burst_remaining > 0 {
            self.ctx.timers.schedule(TimerKind::MaintProbe, now + MAINT_PROBE_SPACING_MS);
        }
    }

    /// Per §5: on detach, every application timer is cancelled and the beacon timer is rearmed
    /// to start re-soliciting immediately.
    fn cancel_application_timers(&mut self, now: TimeMs) {
        self.ctx.timers.cancel(TimerKind::ParentLoss);
        self.ctx.timers.cancel(TimerKind::ChildrenEvict);
        self.ctx.timers.cancel(TimerKind::Sense);
        self.ctx.timers.cancel(TimerKind::MaintProbe);
        self.ctx.timers.schedule(TimerKind::Beacon, now);
    }

    /// ROOT only: translate a supervisory host command (`WATER`/`LIGHTBULBS`, §6) into the same
    /// dispatch a locally-destined TURNON would get. Since ROOT is never itself an actuator or
    /// light sensor, this always takes the multicast-by-role fan-out branch of
    /// [`Self::handle_turn_on`]. Ignored at any other role.
    pub fn issue_turn_on<T: RngCore>(&mut self, target_role: RoleType, now: TimeMs, rng: &mut T) {
        if self.ctx.role == RoleType::Root {
            self.handle_turn_on(target_role.as_u8(), now, rng);
        }
    }

    fn drain_host_events(&mut self) -> Option<Vec<HostEvent, MAX_PENDING_HOST_EVENTS>> {
        let mut events = Vec::new();
        while let Some(event) = self.ctx.drain_host_event() {
            let _ = events.push(event);
        }
        if events.is_empty() {
            None
        } else {
            Some(events)
        }
    }
}

fn sample_light<T: RngCore>(rng: &mut T) -> u16 {
    (rng.next_u32() % 1024) as u16
}

/// `LIGHT_PERIOD_MS` plus a uniform jitter in `[-LIGHT_JITTER_MS, +LIGHT_JITTER_MS]`.
fn light_jitter<T: RngCore>(rng: &mut T) -> TimeMs {
    let span = 2 * LIGHT_JITTER_MS + 1;
    let offset = rng.next_u32() as TimeMs % span;
    LIGHT_PERIOD_MS - LIGHT_JITTER_MS + offset
}

impl Protocol for Mote {
    type TimeMs = TimeMs;
    type NodeId = NodeId;
    type Channel = Channel;
    type Message = Message;
    type Role = RoleType;
    type Data = HostEvent;

    fn new(id: NodeId, role: RoleType) -> Self {
        Self::new_internal(role, id)
    }

    fn progress<T: RngCore>(
        &mut self,
        time: TimeMs,
        message: Option<(Message, i8)>,
        mut rng: T,
    ) -> (MoteAction, Option<impl IntoIterator<Item = HostEvent>>) {
        if let Some((message, rssi)) = message {
            self.handle_message(message, rssi, time, &mut rng);
        } else if let Some(timer) = self.ctx.timers.pop_due(time) {
            self.handle_timer(timer.kind, time, &mut rng);
        }

        let action = if let Some((dest, message)) = self.ctx.drain_tx() {
            Action::Transmit {
                channel: (),
                dest,
                message,
                delay: None,
            }
        } else {
            let end = self
                .ctx
                .timers
                .next_due()
                .map(|due| due.max(time))
                .unwrap_or_else(|| time.saturating_add(crate::TRICKLE_IMIN_MS));
            Action::Receive { end, channel: () }
        };

        (action, self.drain_host_events())
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn role(&self) -> RoleType {
        self.ctx.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn rng() -> StepRng {
        StepRng::new(7, 11)
    }

    fn progress(mote: &mut Mote, time: TimeMs, message: Option<(Message, i8)>) -> MoteAction {
        mote.progress(time, message, rng()).0
    }

    #[test]
    fn root_solicits_nothing_and_announces_dio_on_first_tick() {
        let mut root = Mote::new(1, RoleType::Root);
        let action = progress(&mut root, 0, None);
        match action {
            Action::Transmit { dest: None, message: Message::Dio { from, rank, .. }, .. } => {
                assert_eq!(from, 1);
                assert_eq!(rank, 0);
            }
            other => panic!("expected a broadcast DIO, got {other:?}"),
        }
    }

    /// S1 — a forwarder joins the root: DIS while detached, attach on DIO, DAO reported upward.
    #[test]
    fn forwarder_joins_root_via_dis_dio_dao() {
        let mut forwarder = Mote::new(2, RoleType::Forwarder);
        let action = progress(&mut forwarder, 0, None);
        assert!(matches!(action, Action::Transmit { message: Message::Dis, dest: None, .. }));

        let action = progress(
            &mut forwarder,
            100,
            Some((
                Message::Dio { from: 1, rank: 0, role: RoleType::Root.as_u8() },
                -40,
            )),
        );
        match action {
            Action::Transmit { dest: Some(1), message: Message::Dao { origin, reporter, .. }, .. } => {
                assert_eq!(origin, 2);
                assert_eq!(reporter, 2);
            }
            other => panic!("expected a DAO addressed to the new parent, got {other:?}"),
        }
        assert_eq!(forwarder.ctx.rank, 1);
        assert!(forwarder.ctx.in_dodag);
    }

    /// S2 — a light sensor's report is forwarded hop by hop up to the root.
    #[test]
    fn light_reading_forwards_to_parent() {
        let mut sensor = Mote::new(3, RoleType::LightSensor);
        progress(&mut sensor, 0, None);
        progress(
            &mut sensor,
            0,
            Some((Message::Dio { from: 2, rank: 1, role: RoleType::Forwarder.as_u8() }, -50)),
        );

        let action = progress(
            &mut sensor,
            1,
            Some((Message::TurnOn { target_role: RoleType::LightSensor.as_u8() }, -50)),
        );
        match action {
            Action::Transmit { dest: Some(2), message: Message::Light { from, .. }, .. } => {
                assert_eq!(from, 3);
            }
            other => panic!("expected a LIGHT reading addressed to the parent, got {other:?}"),
        }
    }

    /// S3 — a forwarder fans a TURNON out by role, deduplicated by next hop.
    #[test]
    fn turn_on_fans_out_by_role_deduplicated_by_next_hop() {
        let mut forwarder = Mote::new(2, RoleType::Forwarder);
        forwarder.ctx.routing_table.put(10, RoleType::ActuatorSprinkler, 10, 0);
        forwarder.ctx.routing_table.put(11, RoleType::ActuatorSprinkler, 10, 0);
        forwarder.ctx.routing_table.put(12, RoleType::ActuatorLight, 12, 0);

        forwarder.handle_turn_on(RoleType::ActuatorSprinkler.as_u8(), 0, &mut rng());
        assert!(forwarder.ctx.has_pending_tx());
        let (dest, _) = forwarder.ctx.drain_tx().unwrap();
        assert_eq!(dest, Some(10));
        assert!(forwarder.ctx.drain_tx().is_none());
    }

    /// S4 — losing the parent detaches and clears the routing table.
    #[test]
    fn parent_loss_detaches_and_clears_routes() {
        let mut forwarder = Mote::new(2, RoleType::Forwarder);
        progress(&mut forwarder, 0, None);
        progress(
            &mut forwarder,
            0,
            Some((Message::Dio { from: 1, rank: 0, role: RoleType::Root.as_u8() }, -40)),
        );
        forwarder.ctx.routing_table.put(9, RoleType::LightSensor, 9, 0);
        assert!(forwarder.ctx.in_dodag);

        forwarder.fire_parent_loss(TIMEOUT_PARENT_MS);
        assert!(!forwarder.ctx.in_dodag);
        assert_eq!(forwarder.ctx.rank, INFINITE_RANK);
        assert!(forwarder.ctx.routing_table.is_empty());
    }

    /// S3 — the root translates a host command into the same multicast-by-role fan-out a
    /// forwarder would do with an incoming TURNON.
    #[test]
    fn root_issues_turn_on_via_multicast_by_role() {
        let mut root = Mote::new(1, RoleType::Root);
        root.ctx.routing_table.put(4, RoleType::ActuatorSprinkler, 2, 0);
        root.ctx.routing_table.put(5, RoleType::ActuatorSprinkler, 2, 0);
        root.ctx.routing_table.put(6, RoleType::ActuatorLight, 2, 0);

        root.issue_turn_on(RoleType::ActuatorSprinkler, 0, &mut rng());
        assert!(root.ctx.has_pending_tx());
        let (dest, message) = root.ctx.drain_tx().unwrap();
        assert_eq!(dest, Some(2));
        assert!(matches!(message, Message::TurnOn { target_role } if target_role == RoleType::ActuatorSprinkler.as_u8()));
        assert!(root.ctx.drain_tx().is_none(), "dedup by next hop: only one copy sent to B");
    }

    /// S6 — a mobile operator counts three MAINTACKs as a complete maintenance round. Mobile
    /// terminals refuse ROOT as a parent directly (§4.2's eligibility table), so it attaches
    /// behind a forwarder, as in the spec's own S6 topology.
    #[test]
    fn maintack_burst_counts_to_three() {
        let mut mobile = Mote::new(5, RoleType::MobileOperator);
        progress(&mut mobile, 0, None);
        progress(
            &mut mobile,
            0,
            Some((Message::Dio { from: 2, rank: 1, role: RoleType::Forwarder.as_u8() }, -40)),
        );
        assert_eq!(mobile.ctx.maint_burst_remaining, MAINT_BURST_COUNT);

        for _ in 0..3 {
            mobile.handle_maint_ack(5, 0);
        }
        assert_eq!(mobile.ctx.maintack_count, 3);
    }
}
