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

//! Downward routing table: maps a descendant's address to the direct neighbor through which it
//! is reached, plus that descendant's role and when it was last heard from.
//!
//! Backed by a flat bounded vector rather than a hash map: the table's only traversal pattern is
//! "scan and act" (role-filtered iteration for multicast fan-out, staleness sweep for eviction),
//! which an index scan over a flat array serves just as well as a hash map, without needing an
//! allocator.

use heapless::Vec;

use crate::{NodeId, RoleType, TimeMs, MAX_ROUTING_ENTRIES, TIMEOUT_CHILDREN_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingEntry {
    pub destination: NodeId,
    pub next_hop: NodeId,
    pub role: RoleType,
    pub last_heard: TimeMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PutOutcome {
    New,
    Update,
    Full,
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: Vec<RoutingEntry, MAX_ROUTING_ENTRIES>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or refresh a route to `destination`. Returns `New` for a fresh key, `Update` when
    /// the key already existed (next hop/role refreshed, `last_heard` bumped), `Full` when the
    /// table has no room and `destination` was not already known.
    pub fn put(
        &mut self,
        destination: NodeId,
        role: RoleType,
        next_hop: NodeId,
        now: TimeMs,
    ) -> PutOutcome {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.destination == destination) {
            entry.next_hop = next_hop;
            entry.role = role;
            entry.last_heard = now;
            return PutOutcome::Update;
        }
        match self.entries.push(RoutingEntry {
            destination,
            next_hop,
            role,
            last_heard: now,
        }) {
            Ok(()) => PutOutcome::New,
            Err(_) => PutOutcome::Full,
        }
    }

    pub fn get(&self, destination: NodeId) -> Option<RoutingEntry> {
        self.entries
            .iter()
            .find(|e| e.destination == destination)
            .copied()
    }

    pub fn delete(&mut self, destination: NodeId) -> bool {
        if let Some(index) = self.entries.iter().position(|e| e.destination == destination) {
            self.entries.swap_remove(index);
            true
        } else {
            false
        }
    }

    /// Entries whose role matches `role`, for multicast-by-role fan-out.
    pub fn iter_role(&self, role: RoleType) -> impl Iterator<Item = &RoutingEntry> {
        self.entries.iter().filter(move |e| e.role == role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutingEntry> {
        self.entries.iter()
    }

    /// Remove every entry not heard from within `TIMEOUT_CHILDREN_MS`. Returns true if anything
    /// was removed.
    pub fn evict_stale(&mut self, now: TimeMs) -> bool {
        let before = self.entries.len();
        let threshold = TIMEOUT_CHILDREN_MS;
        let mut i = 0;
        while i < self.entries.len() {
            if now.saturating_sub(self.entries[i].last_heard) > threshold {
                self.entries.swap_remove(i);
            } else {
                i += 1;
            }
        }
        self.entries.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_reports_new_then_update() {
        let mut table = RoutingTable::new();
        assert_eq!(table.put(2, RoleType::Forwarder, 2, 0), PutOutcome::New);
        assert_eq!(table.put(2, RoleType::Forwarder, 2, 10), PutOutcome::Update);
        assert_eq!(table.get(2).unwrap().last_heard, 10);
    }

    #[test]
    fn put_reports_full_once_at_capacity() {
        let mut table = RoutingTable::new();
        for id in 0..MAX_ROUTING_ENTRIES as NodeId {
            assert_eq!(table.put(id, RoleType::Forwarder, id, 0), PutOutcome::New);
        }
        assert_eq!(
            table.put(MAX_ROUTING_ENTRIES as NodeId, RoleType::Forwarder, 0, 0),
            PutOutcome::Full
        );
        // an existing key can still be refreshed once full
        assert_eq!(table.put(0, RoleType::Forwarder, 0, 5), PutOutcome::Update);
    }

    #[test]
    fn evict_stale_removes_only_expired_entries() {
        let mut table = RoutingTable::new();
        table.put(2, RoleType::ActuatorSprinkler, 2, 0);
        table.put(3, RoleType::ActuatorSprinkler, 2, 100);
        assert!(table.evict_stale(TIMEOUT_CHILDREN_MS + 1));
        assert!(table.get(2).is_none());
        assert!(table.get(3).is_some());
    }

    #[test]
    fn iter_role_filters_by_role() {
        let mut table = RoutingTable::new();
        table.put(2, RoleType::ActuatorSprinkler, 2, 0);
        table.put(3, RoleType::ActuatorLight, 2, 0);
        table.put(4, RoleType::ActuatorSprinkler, 5, 0);
        let sprinklers: heapless::Vec<NodeId, 4> = table
            .iter_role(RoleType::ActuatorSprinkler)
            .map(|e| e.destination)
            .collect();
        assert_eq!(sprinklers.len(), 2);
        assert!(sprinklers.contains(&2));
        assert!(sprinklers.contains(&4));
    }
}
