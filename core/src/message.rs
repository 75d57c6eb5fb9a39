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

use core::fmt::Display;
use serde::{Deserialize, Serialize};

use crate::{NodeId, RoleType};

/// Protocol message, tagged on the wire per [`crate::codec`].
///
/// The link carries no address header of its own (every frame is a broadcast that whoever is in
/// range receives), so any message whose handling depends on who sent or who it is meant for
/// carries that address as a field of its own.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Solicit a DIO from anyone in earshot. Tag 2.
    Dis,
    /// DODAG advertisement. Tag 3.
    Dio { from: NodeId, rank: u8, role: u8 },
    /// Destination advertisement, re-originated hop by hop: `origin`/`origin_role` identify the
    /// descendant being advertised, `reporter` is whoever is transmitting this particular frame
    /// (the next hop back toward `origin`). Tag 4.
    Dao {
        origin: NodeId,
        origin_role: u8,
        reporter: NodeId,
    },
    /// Actuator command, multicast by role: forwarded downward toward every matching descendant.
    /// Tag 5.
    TurnOn { target_role: u8 },
    /// Actuator acknowledgement, propagated upward. Tag 6.
    Ack { from: NodeId, role: u8 },
    /// Light sensor reading, propagated upward. Tag 7.
    Light { from: NodeId, level: u16 },
    /// Maintenance probe, broadcast by a mobile operator while attached. Tag 8.
    Maint { src: NodeId },
    /// Maintenance reply, addressed back to the probing operator. Tag 9.
    MaintAck { dst: NodeId },
}

/// message as JSON to make it parseable
macro_rules! message_to_json_string {
    ($fmt:expr,$write:tt,$message:expr) => {
        match $message {
            Message::Dis => $write!($fmt, "{{\"kind\":\"dis\"}}"),
            Message::Dio { from, rank, role } => {
                $write!(
                    $fmt,
                    "{{\"kind\":\"dio\",\"from\":{},\"rank\":{},\"role\":{}}}",
                    from,
                    rank,
                    role
                )
            }
            Message::Dao {
                origin,
                origin_role,
                reporter,
            } => {
                $write!(
                    $fmt,
                    "{{\"kind\":\"dao\",\"origin\":{},\"origin_role\":{},\"reporter\":{}}}",
                    origin,
                    origin_role,
                    reporter
                )
            }
            Message::TurnOn { target_role } => {
                $write!($fmt, "{{\"kind\":\"turnon\",\"target_role\":{}}}", target_role)
            }
            Message::Ack { from, role } => {
                $write!($fmt, "{{\"kind\":\"ack\",\"from\":{},\"role\":{}}}", from, role)
            }
            Message::Light { from, level } => {
                $write!(
                    $fmt,
                    "{{\"kind\":\"light\",\"from\":{},\"level\":{}}}",
                    from,
                    level
                )
            }
            Message::Maint { src } => {
                $write!($fmt, "{{\"kind\":\"maint\",\"src\":{}}}", src)
            }
            Message::MaintAck { dst } => {
                $write!($fmt, "{{\"kind\":\"maintack\",\"dst\":{}}}", dst)
            }
        }
    };
}

impl Display for Message {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        message_to_json_string!(fmt, write, self)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Message {
    fn format(&self, fmt: defmt::Formatter) {
        fn wrapper(msg: &Message, fmt: defmt::Formatter) -> core::fmt::Result {
            message_to_json_string!(fmt, crate::defmt_write_wrapper, msg)
        }
        let _ = wrapper(self, fmt);
    }
}

/// An event surfaced to the supervisory serial host. Only ever produced by a ROOT-role mote.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostEvent {
    /// `Ack received from:\n<roleInteger>`
    Ack { from: NodeId, role: RoleType },
    /// `LIGHTSENSOR<level>\nLIGHTSENSOR`
    Light { from: NodeId, level: u16 },
}

impl protocol_api::ProtocolData<crate::Mote> for HostEvent {
    fn get_source(&self) -> NodeId {
        match self {
            HostEvent::Ack { from, .. } => *from,
            HostEvent::Light { from, .. } => *from,
        }
    }
}
