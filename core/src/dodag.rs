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

//! Parent selection: eligibility, the better-parent predicate, and `ParentInfo` itself.
//!
//! `choose_parent`/`update_parent`/`detach` (the operations that mutate a mote's rank and parent)
//! live on `MoteState` in `context.rs`, since they also touch rank and in_dodag; this module holds
//! the pure, independently testable decision functions they call.

use crate::{Rank, RoleType, RSS_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParentInfo {
    pub addr: crate::NodeId,
    pub rank: Rank,
    pub rss: i8,
    pub role: RoleType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChooseOutcome {
    New,
    Changed,
    Unchanged,
}

/// Role-constrained topology: FORWARDER only ever attaches to ROOT; leaves/actuators/mobile
/// terminals attach to any non-ROOT role; ROOT never attaches to anything.
pub fn is_eligible_parent(self_role: RoleType, candidate_role: RoleType) -> bool {
    match self_role {
        RoleType::Root => false,
        RoleType::Forwarder => candidate_role == RoleType::Root,
        _ => candidate_role != RoleType::Root,
    }
}

/// Whether `candidate` should replace `current` as parent. Only meaningful once a parent is
/// already held and the candidate has passed [`is_eligible_parent`].
///
/// Resolution of the cross-role tie (source ambiguity): when the candidate's role differs from
/// the current parent's role, the candidate wins exactly when its role tag is numerically greater
/// than the current parent's, mirroring the routing layer's own `parent->role > role` test.
pub fn is_better_parent(
    current: &ParentInfo,
    candidate_rank: Rank,
    candidate_rss: i8,
    candidate_role: RoleType,
) -> bool {
    if candidate_role == current.role {
        candidate_rank < current.rank
            || (candidate_rank == current.rank
                && candidate_rss as i16 > current.rss as i16 + RSS_THRESHOLD as i16)
    } else {
        candidate_role.as_u8() > current.role.as_u8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarder_only_attaches_to_root() {
        assert!(is_eligible_parent(RoleType::Forwarder, RoleType::Root));
        assert!(!is_eligible_parent(RoleType::Forwarder, RoleType::Forwarder));
    }

    #[test]
    fn leaf_refuses_root_directly() {
        assert!(!is_eligible_parent(RoleType::LightSensor, RoleType::Root));
        assert!(is_eligible_parent(RoleType::LightSensor, RoleType::Forwarder));
        assert!(is_eligible_parent(
            RoleType::MobileOperator,
            RoleType::ActuatorSprinkler
        ));
    }

    #[test]
    fn root_never_attaches() {
        assert!(!is_eligible_parent(RoleType::Root, RoleType::Forwarder));
    }

    /// S5 — better parent by RSS among same-role candidates.
    #[test]
    fn same_role_better_parent_needs_rank_or_rss_improvement() {
        let current = ParentInfo {
            addr: 1,
            rank: 0,
            rss: -80,
            role: RoleType::Root,
        };
        assert!(is_better_parent(&current, 0, -70, RoleType::Root));
        assert!(!is_better_parent(&current, 0, -79, RoleType::Root));
        assert!(is_better_parent(&current, 0, -82, RoleType::Root) == false);
        assert!(is_better_parent(&current, 0, 0, RoleType::Root));
    }

    #[test]
    fn same_role_lower_rank_always_wins() {
        let current = ParentInfo {
            addr: 1,
            rank: 2,
            rss: -50,
            role: RoleType::Forwarder,
        };
        assert!(is_better_parent(&current, 1, -90, RoleType::Forwarder));
    }

    #[test]
    fn cross_role_prefers_higher_role_integer() {
        let current = ParentInfo {
            addr: 1,
            rank: 1,
            rss: -40,
            role: RoleType::Forwarder,
        };
        assert!(is_better_parent(&current, 5, -90, RoleType::LightSensor));
        assert!(!is_better_parent(&current, 0, 0, RoleType::Root));
    }
}
