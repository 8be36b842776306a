//! The member store.
//!
//! # Design Decisions
//! - Membership is fixed at construction; the key set never changes, so the
//!   map itself needs no lock
//! - Each record lives behind an `ArcSwap`; updates publish a whole new record
//! - All writes take one mutex, which is never held across an `.await`

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::{MemberConfig, TiersConfig};
use crate::health::event::{ProbeSummary, StateTransitionEvent};
use crate::registry::member::{Endpoint, Member, MemberId, Role, Tier};

/// Errors raised by the registry. All of them indicate a topology mismatch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown member '{0}'")]
    NotFound(MemberId),

    #[error("member '{0}' is registered more than once")]
    DuplicateMember(MemberId),

    #[error("member '{id}' is invalid: {reason}")]
    InvalidMember { id: MemberId, reason: String },

    #[error("member '{0}' is not part of a replica set")]
    NotReplicaMember(MemberId),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Authoritative store of member health.
#[derive(Debug)]
pub struct MemberRegistry {
    members: HashMap<MemberId, ArcSwap<Member>>,
    /// Registration order, used for stable snapshots.
    order: Vec<MemberId>,
    write_lock: Mutex<()>,
}

impl MemberRegistry {
    /// Register a fixed set of members.
    pub fn new(members: Vec<Member>) -> RegistryResult<Self> {
        let mut map = HashMap::with_capacity(members.len());
        let mut order = Vec::with_capacity(members.len());

        for member in members {
            if member.id.as_str().trim().is_empty() {
                return Err(RegistryError::InvalidMember {
                    id: member.id.clone(),
                    reason: "id must not be empty".to_string(),
                });
            }
            if map.contains_key(&member.id) {
                return Err(RegistryError::DuplicateMember(member.id));
            }
            order.push(member.id.clone());
            map.insert(member.id.clone(), ArcSwap::from_pointee(member));
        }

        Ok(Self {
            members: map,
            order,
            write_lock: Mutex::new(()),
        })
    }

    /// Build the registry from static topology configuration.
    pub fn from_config(members: &[MemberConfig], tiers: &TiersConfig) -> RegistryResult<Self> {
        let mut records = Vec::with_capacity(members.len());
        for cfg in members {
            let id = MemberId::new(cfg.id.trim());
            if cfg.address.trim().is_empty() {
                return Err(RegistryError::InvalidMember {
                    id,
                    reason: "address must not be empty".to_string(),
                });
            }
            let policy = tiers.policy(cfg.tier);
            let endpoint = Endpoint::resolve(&cfg.address, policy.default_port);
            let member = Member::new(id, cfg.tier, endpoint, cfg.zone.clone())
                .with_voting(cfg.voting.unwrap_or(true));
            records.push(member);
        }

        let registry = Self::new(records)?;
        tracing::info!(
            members = registry.len(),
            web = registry.count(Tier::Web),
            app = registry.count(Tier::App),
            db = registry.count(Tier::Db),
            "Member registry initialized"
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn slot(&self, id: &MemberId) -> RegistryResult<&ArcSwap<Member>> {
        self.members
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Current record for `id`.
    pub fn get(&self, id: &MemberId) -> RegistryResult<Member> {
        Ok(self.get_shared(id)?.as_ref().clone())
    }

    /// Current record for `id` without copying it.
    pub fn get_shared(&self, id: &MemberId) -> RegistryResult<Arc<Member>> {
        Ok(self.slot(id)?.load_full())
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.members.contains_key(id)
    }

    /// Members of one tier, in registration order.
    pub fn snapshot(&self, tier: Tier) -> Vec<Member> {
        self.iter()
            .filter(|m| m.tier == tier)
            .map(|m| m.as_ref().clone())
            .collect()
    }

    /// Ids of one tier's members, in registration order.
    pub fn members_in(&self, tier: Tier) -> Vec<MemberId> {
        self.iter().filter(|m| m.tier == tier).map(|m| m.id.clone()).collect()
    }

    /// All members, in registration order.
    pub fn all(&self) -> Vec<Member> {
        self.iter().map(|m| m.as_ref().clone()).collect()
    }

    /// Tiers that have at least one registered member.
    pub fn tiers(&self) -> Vec<Tier> {
        Tier::ALL
            .into_iter()
            .filter(|t| self.count(*t) > 0)
            .collect()
    }

    pub fn count(&self, tier: Tier) -> usize {
        self.iter().filter(|m| m.tier == tier).count()
    }

    fn iter(&self) -> impl Iterator<Item = Arc<Member>> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.members.get(id))
            .map(|slot| slot.load_full())
    }

    /// Serialize a read-modify-write of one record.
    ///
    /// `f` returns `None` to leave the record untouched.
    fn update<F>(&self, id: &MemberId, f: F) -> RegistryResult<Member>
    where
        F: FnOnce(&Member) -> RegistryResult<Option<Member>>,
    {
        let slot = self.slot(id)?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = slot.load_full();
        match f(&current)? {
            Some(next) => {
                slot.store(Arc::new(next.clone()));
                Ok(next)
            }
            None => Ok(current.as_ref().clone()),
        }
    }

    /// Apply a health transition.
    ///
    /// Re-applying a transition to a member already in the target state is a
    /// no-op that returns the unchanged record.
    pub fn apply_transition(&self, event: &StateTransitionEvent) -> RegistryResult<Member> {
        self.update(&event.member_id, |current| {
            if current.health == event.to {
                return Ok(None);
            }
            if current.health != event.from {
                tracing::debug!(
                    member = %event.member_id,
                    recorded = ?current.health,
                    from = ?event.from,
                    to = ?event.to,
                    "Transition source differs from recorded state"
                );
            }
            let mut next = current.clone();
            next.health = event.to;
            next.phase = event.to;
            next.last_transition_at = Some(event.timestamp);
            Ok(Some(next))
        })
    }

    /// Record hysteresis counters and phase reported by the monitor.
    pub fn record_probe(&self, summary: &ProbeSummary) -> RegistryResult<Member> {
        self.update(&summary.member_id, |current| {
            if current.last_probe_at.is_some_and(|at| at > summary.timestamp) {
                return Ok(None);
            }
            let mut next = current.clone();
            next.phase = summary.phase;
            next.consecutive_failures = summary.consecutive_failures;
            next.consecutive_successes = summary.consecutive_successes;
            next.last_probe_at = Some(summary.timestamp);
            Ok(Some(next))
        })
    }

    /// Set the replica-set role of a db member.
    pub fn set_role(&self, id: &MemberId, role: Role) -> RegistryResult<Member> {
        self.update(id, |current| {
            if !current.tier.quorum_required() {
                return Err(RegistryError::NotReplicaMember(id.clone()));
            }
            if current.role == Some(role) {
                return Ok(None);
            }
            let mut next = current.clone();
            next.role = Some(role);
            Ok(Some(next))
        })
    }
}
