//! Replica-set quorum arithmetic.
//!
//! A replica set can elect a primary only while a strict majority of its
//! voting members are reachable. Two voting members that lose one have no
//! majority; three that lose one still do.

use serde::Serialize;

use crate::registry::Member;

/// Vote tally of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuorumState {
    pub voting_members: usize,
    pub healthy_votes: usize,
}

impl QuorumState {
    /// Count votes among `members`. Non-voting members are ignored.
    pub fn compute(members: &[Member]) -> Self {
        let voters = members.iter().filter(|m| m.voting);
        let (voting_members, healthy_votes) = voters.fold((0, 0), |(total, healthy), m| {
            (total + 1, healthy + usize::from(m.has_vote()))
        });
        Self {
            voting_members,
            healthy_votes,
        }
    }

    /// Strict majority of voting members.
    pub fn held(&self) -> bool {
        2 * self.healthy_votes > self.voting_members
    }
}

/// Quorum bookkeeping across recomputations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuorumTracker {
    held: bool,
    degraded: bool,
}

/// What a recomputation means for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumChange {
    Unchanged,
    Lost,
    Restored,
    /// Held for the first time since startup.
    Established,
}

impl QuorumTracker {
    pub fn held(&self) -> bool {
        self.held
    }

    /// `DegradedNoQuorum`: quorum was held and then lost.
    pub fn degraded(&self) -> bool {
        self.degraded
    }

    pub fn observe(&mut self, state: QuorumState) -> QuorumChange {
        let now = state.held();
        let change = match (self.held, now) {
            (true, false) => {
                self.degraded = true;
                QuorumChange::Lost
            }
            (false, true) if self.degraded => {
                self.degraded = false;
                QuorumChange::Restored
            }
            (false, true) => QuorumChange::Established,
            _ => QuorumChange::Unchanged,
        };
        self.held = now;
        change
    }
}
