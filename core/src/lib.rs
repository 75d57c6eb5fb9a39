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

#![cfg_attr(not(test), no_std)]

use rand_core::RngCore;

use protocol_api::*;

mod codec;
mod context;
mod dodag;
mod event_log;
mod message;
mod mote;
mod routing;
mod timers;
mod trickle;

pub use crate::codec::{decode, encode, CodecError};
pub use crate::dodag::ParentInfo;
pub use crate::message::{HostEvent, Message};
pub use crate::mote::Mote;
pub use crate::routing::{PutOutcome, RoutingEntry, RoutingTable};
pub use crate::timers::{Timer, TimerKind};
pub use crate::trickle::TrickleState;

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
use defmt::{debug, error, info, warn};

#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
use log::{debug, error, info, warn};

/// Time as milliseconds since start
pub type TimeMs = u64;
/// Node identifier
pub type NodeId = u32;
/// A tick's channel selector. The radio link used by this protocol has no channel concept; kept
/// generic to satisfy `protocol_api::Protocol` without hard-coding `()` into every state.
pub type Channel = ();

pub(crate) type MoteAction = Action<TimeMs, NodeId, Message, Channel>;

/// Role tag, closed set per the routing layer's topology rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RoleType {
    Root = 0,
    Forwarder = 1,
    LightSensor = 2,
    ActuatorSprinkler = 3,
    ActuatorLight = 4,
    MobileOperator = 5,
}

impl RoleType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RoleType::Root),
            1 => Some(RoleType::Forwarder),
            2 => Some(RoleType::LightSensor),
            3 => Some(RoleType::ActuatorSprinkler),
            4 => Some(RoleType::ActuatorLight),
            5 => Some(RoleType::MobileOperator),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this role is one of the two actuator kinds. Used to find a MAINT target class
    /// (`forward_toward_actuator_class`) and to decide whether a TURNON recipient should actuate
    /// and ACK rather than forward further.
    pub(crate) fn is_actuator(self) -> bool {
        matches!(self, RoleType::ActuatorSprinkler | RoleType::ActuatorLight)
    }
}

/// Rank used to detect detachment; 0 is reserved for the root.
pub type Rank = u8;
pub const INFINITE_RANK: Rank = 255;

/// RSS improvement (dB) required to switch same-role parents.
pub(crate) const RSS_THRESHOLD: i8 = 3;

/// Parent liveness timeout (ms). A detach fires if no DIO arrives from the current parent within
/// this window.
pub(crate) const TIMEOUT_PARENT_MS: TimeMs = 50_000;
/// Routing-entry staleness timeout (ms): 2x the steady-state trickle interval and comfortably
/// above TIMEOUT_PARENT_MS, so a child is never evicted from its parent's table before it would
/// have detached and stopped advertising on its own.
pub(crate) const TIMEOUT_CHILDREN_MS: TimeMs = 120_000;
/// Nominal period between LIGHT_SENSOR samples, minus jitter applied at schedule time.
pub(crate) const LIGHT_PERIOD_MS: TimeMs = 60_000;
pub(crate) const LIGHT_JITTER_MS: TimeMs = 5_000;

/// Trickle base interval.
pub(crate) const TRICKLE_IMIN_MS: TimeMs = 30_000;
/// Trickle doublings cap: I never exceeds Imin * 2^Imax.
pub(crate) const TRICKLE_IMAX_DOUBLINGS: u8 = 4;
/// Trickle redundancy constant.
pub(crate) const TRICKLE_K: u8 = 1;

/// How often a mote sweeps its own routing table for children that have gone quiet.
pub(crate) const CHILDREN_SWEEP_PERIOD_MS: TimeMs = TIMEOUT_CHILDREN_MS / 2;
/// Delay between the three probes of a MOBILE_OPERATOR maintenance burst.
pub(crate) const MAINT_PROBE_SPACING_MS: TimeMs = 1_000;

/// Bounded routing-table capacity.
pub(crate) const MAX_ROUTING_ENTRIES: usize = 16;
/// Number of MAINT probes a mobile operator fires per maintenance round.
pub(crate) const MAINT_BURST_COUNT: u8 = 3;
/// Maximum outbound frames a single `progress()` call may enqueue (multicast-by-role fan-out is
/// bounded by routing table capacity, so this only needs to be at least that large).
pub(crate) const MAX_PENDING_TX: usize = MAX_ROUTING_ENTRIES + 1;
/// Maximum host events (ACK/LIGHT deliveries) queued for the supervisory host between polls.
pub(crate) const MAX_PENDING_HOST_EVENTS: usize = 8;

/// Wraps defmt::write and returns Ok() to make it behave like core::write!.
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! defmt_write_wrapper {
    ($($arg:expr),*) => {{
        defmt::write!($($arg),*);
        Ok(())
    }};
}
