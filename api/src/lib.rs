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

/// A states' action
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action<TIME, NODE, MESSAGE, CHANNEL> {
    /// Do nothing
    None,
    /// Wait until `end`
    Wait { end: TIME },
    /// Listen for message until `end`
    Receive { end: TIME, channel: CHANNEL },
    /// Send message with optional delay. `dest = None` is a link-layer broadcast; `Some(id)` is a
    /// best-effort addressed unicast to that neighbor.
    Transmit {
        channel: CHANNEL,
        dest: Option<NODE>,
        message: MESSAGE,
        delay: Option<TIME>,
    },
}

pub trait ProtocolData<P: Protocol + ?Sized> {
    fn get_source(&self) -> P::NodeId;
}

pub trait Protocol {
    type TimeMs: Copy + Eq + Ord;
    type NodeId: Copy + Eq;
    type Channel: Copy + Eq;
    type Message: Clone + PartialEq;
    /// Per-node role tag, fixed at construction.
    type Role: Copy + Eq;
    /// Events surfaced to a supervisory host (only ever produced by a root-role node).
    type Data: Clone + ProtocolData<Self>;

    fn new(id: Self::NodeId, role: Self::Role) -> Self;

    /// Make progress in state machine
    ///
    /// `message` is the frame delivered since the last call, paired with the link facade's
    /// `rssi_of_last()` reading for it. Returns the action to execute and any events surfaced to
    /// the supervisory host. This function must be called again after the returned action has
    /// been executed.
    #[must_use]
    #[allow(clippy::type_complexity)]
    fn progress<T: RngCore>(
        &mut self,
        time: Self::TimeMs,
        message: Option<(Self::Message, i8)>,
        rng: T,
    ) -> (
        Action<Self::TimeMs, Self::NodeId, Self::Message, Self::Channel>,
        Option<impl IntoIterator<Item = Self::Data>>,
    );

    /// Get the node's ID
    fn id(&self) -> Self::NodeId;

    /// Get the node's role
    fn role(&self) -> Self::Role;
}
