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

use std::{
    fs::File,
    io::{self, Write},
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use rand::RngCore;

use crate::*;

/// RSSI (dBm) synthesized from inter-node distance: strong and flat up close, falling off
/// linearly past the near field. There is no real radio here, only a topology; this stands in for
/// the link facade's `rssi_of_last()` (§6) well enough to exercise the better-parent/RSS rule
/// (§4.2, scenario S5).
pub fn synthetic_rssi(distance: f32) -> i8 {
    let rssi = -30.0 - distance;
    rssi.clamp(i8::MIN as f32, -1.0) as i8
}

/// Type that adds meta data to protocol
#[derive(Debug)]
pub struct ProtocolWrapper {
    protocol: ProtocolImpl,
    location: Coordinates,
    /// Set while the node is in `Action::Receive`, so `forward_message` knows it's eligible.
    receiving: bool,
}

impl ProtocolWrapper {
    pub fn new(protocol: ProtocolImpl, location: Coordinates) -> Self {
        Self {
            protocol,
            location,
            receiving: false,
        }
    }

    pub fn location(&self) -> &Coordinates {
        &self.location
    }

    pub fn receiving(&self) -> bool {
        self.receiving
    }

    #[doc(alias = "mote_core::Mote::id")]
    pub fn id(&self) -> NodeId {
        self.protocol.id()
    }

    pub fn role(&self) -> RoleType {
        self.protocol.role()
    }

    /// ROOT only: inject a supervisory `WATER`/`LIGHTBULBS` command (§6), bypassing the network.
    pub fn issue_turn_on<T: RngCore>(&mut self, target_role: RoleType, now: TimeMs, rng: &mut T) {
        self.protocol.issue_turn_on(target_role, now, rng);
    }

    #[must_use]
    #[doc(alias = "mote_core::Mote::progress")]
    pub fn progress(
        &mut self,
        time: TimeMs,
        message: Option<(Message, i8)>,
        rng: impl RngCore,
    ) -> (Action, Option<Vec<Data>>) {
        let (action, host_events) = self.protocol.progress(time, message, rng);

        self.receiving = matches!(action, Action::Receive { .. });

        let host_events = host_events.map(Vec::from_iter);

        if self.protocol.role() != RoleType::Root && host_events.is_some() {
            panic!("bug: non-root node surfaced a host event");
        }

        (action, host_events)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Transmit,
    Receive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWrapper {
    pub kind: MessageKind,
    /// Who originally sent this frame. Needed at delivery time to compute the recipient's RSSI.
    pub origin: NodeId,
    /// `None` is a link-layer broadcast; `Some(id)` is addressed best-effort unicast.
    pub dest: Option<NodeId>,
    pub message: Message,
    /// whether message collided with another
    pub is_corrupt: bool,
}

impl MessageWrapper {
    pub fn new(kind: MessageKind, origin: NodeId, dest: Option<NodeId>, message: Message) -> Self {
        Self {
            kind,
            origin,
            dest,
            message,
            is_corrupt: false,
        }
    }
}

#[derive(Debug, Clone, Eq)]
pub struct Event {
    pub time: TimeMs,
    pub node_id: NodeId,
    pub message: Option<MessageWrapper>,
    /// A supervisory host command (§6) scheduled to arrive at ROOT at `time`, bypassing the radio
    /// link entirely — there's no network delay or visibility check on the host/root link.
    pub host_command: Option<RoleType>,
}

impl Event {
    pub fn new(time: TimeMs, node_id: NodeId, message: Option<MessageWrapper>) -> Self {
        Self {
            time,
            node_id,
            message,
            host_command: None,
        }
    }

    pub fn host_command(time: TimeMs, root_id: NodeId, target_role: RoleType) -> Self {
        Self {
            time,
            node_id: root_id,
            message: None,
            host_command: Some(target_role),
        }
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time.cmp(&other.time)
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coordinates {
    pub x: i64,
    pub y: i64,
}

impl From<(i64, i64)> for Coordinates {
    fn from(value: (i64, i64)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}

pub fn get_distance(a: &Coordinates, b: &Coordinates) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    ((dx.pow(2) + dy.pow(2)) as f32).sqrt()
}

/// Check if two nodes are in range of each other
pub fn check_visibility_based_on_distance(
    a: &ProtocolWrapper,
    b: &ProtocolWrapper,
    range: u32,
) -> bool {
    get_distance(a.location(), b.location()) < range as f32
}

/// Get the node ids that should receive `sender`'s frame: every node in radio range, narrowed to
/// `dest` alone when the frame is an addressed unicast rather than a broadcast.
pub fn get_recipients(
    sender: &ProtocolWrapper,
    dest: Option<NodeId>,
    nodes: &[ProtocolWrapper],
    mut check_visibility: impl FnMut(&ProtocolWrapper, &ProtocolWrapper) -> bool,
) -> Vec<NodeId> {
    match dest {
        Some(dest) => {
            let target = &nodes[dest as usize];
            if target.id() != sender.id() && check_visibility(sender, target) {
                vec![dest]
            } else {
                Vec::new()
            }
        }
        None => nodes
            .iter()
            .filter(|node| node.id() != sender.id() && check_visibility(sender, node))
            .map(|node| node.id())
            .collect(),
    }
}

/// Forward messages to nodes that are visible to the sender
#[allow(clippy::too_many_arguments)]
pub fn forward_message(
    departure_time: TimeMs,
    sender_id: NodeId,
    dest: Option<NodeId>,
    message: &Message,
    event_queue: &mut SortedLinkedList<Event>,
    nodes: &[ProtocolWrapper],
    mut check_visibility: impl FnMut(&ProtocolWrapper, &ProtocolWrapper) -> bool,
    packet_error_rate_ppt: Option<u32>,
    mut rng: impl RngCore,
) {
    let mut recipients = get_recipients(&nodes[sender_id as usize], dest, nodes, &mut check_visibility);

    // check for collisions with messages arriving at an overlapping recipient from another
    // simultaneous transmission: every mote is always listening on the one shared broadcast
    // channel (§9's re-architecture note: no per-channel concept survives into this protocol), so
    // any two transmissions whose time-on-air windows overlap and share a recipient corrupt each
    // other at that recipient.
    for event in event_queue.iter_mut() {
        if departure_time >= event.time || departure_time + TIME_ON_AIR <= event.time - TIME_ON_AIR
        {
            // events don't overlap
            // events are sorted by time so all remaining events don't overlap as well
            break;
        }

        let event_message = match event.message.as_mut() {
            Some(message) => message,
            None => continue,
        };

        if event_message.kind != MessageKind::Receive {
            continue;
        }

        recipients.retain(|r| {
            if check_visibility(&nodes[sender_id as usize], &nodes[*r as usize]) {
                warn!(
                    "message collision at node {:x}:\nmessage from node {:x}: {}\nmessage from node {:x}: {}",
                    *r, sender_id, message, event.node_id, event_message.message
                );
                event_message.is_corrupt = true;
                false
            } else {
                true
            }
        })
    }

    if recipients.is_empty() {
        return;
    }

    info!("forwarding message from {:x} to {:x?}", sender_id, recipients);

    // drop messages based on packet error rate
    if let Some(per) = packet_error_rate_ppt {
        recipients.retain(|_| {
            if rng.next_u32() % 1000 < per {
                warn!("packet error simulation: dropping message");
                false
            } else {
                true
            }
        });
    }

    // cancel receive time out events of recipients
    event_queue.retain(|e| !recipients.contains(&e.node_id));

    for recipient in recipients {
        event_queue.push(Event::new(
            departure_time + TIME_ON_AIR,
            recipient,
            Some(MessageWrapper::new(
                MessageKind::Receive,
                sender_id,
                dest,
                message.clone(),
            )),
        ));
    }
}

pub fn write_metadata_to_file(
    nodes: &[ProtocolWrapper],
    node_range: u32,
    file_path: &str,
) -> io::Result<()> {
    let mut node_loc_file = File::create(file_path)?;
    node_loc_file.write_all(format!("{{\n\"node_range\":{node_range},\n").as_bytes())?;
    node_loc_file.write_all("\"nodes\":\n[\n".as_bytes())?;
    let mut node_iter = nodes.iter();
    let mut next = node_iter.next();
    while let Some(node) = next {
        node_loc_file.write_all(
            format!(
                "{{\"id\":{},\"role\":{},\"location\":{{\"x\":{},\"y\":{}}}}}",
                node.id(),
                node.role() as u8,
                node.location().x,
                node.location().y
            )
            .as_bytes(),
        )?;
        next = node_iter.next();
        if next.is_some() {
            node_loc_file.write_all(",".as_bytes())?;
        }
        node_loc_file.write_all("\n".as_bytes())?;
    }
    node_loc_file.write_all("]\n}\n".as_bytes())?;
    Ok(())
}
