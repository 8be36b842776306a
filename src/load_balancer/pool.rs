//! In-process backend pool.
//!
//! # Responsibilities
//! - Track which load-balanced members are in rotation, per tier
//! - Answer rotation queries for the operator surface and tests

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::load_balancer::{Ack, RoutingError, TrafficRouter};
use crate::registry::{Member, MemberId, MemberRegistry, Tier};

#[derive(Debug)]
struct PoolSlot {
    tier: Tier,
    active: bool,
}

/// Backend pools held in memory.
#[derive(Debug, Default)]
pub struct BackendPool {
    slots: DashMap<MemberId, PoolSlot>,
    updates: AtomicU64,
}

impl BackendPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool containing every load-balanced member of `registry`, all active.
    pub fn from_registry(registry: &MemberRegistry) -> Self {
        let pool = Self::new();
        for member in registry.all() {
            pool.add(&member);
        }
        pool
    }

    /// Register a load-balanced member as active. Db members are ignored.
    pub fn add(&self, member: &Member) {
        if !member.tier.is_load_balanced() {
            return;
        }
        self.slots.insert(
            member.id.clone(),
            PoolSlot {
                tier: member.tier,
                active: true,
            },
        );
    }

    pub fn is_active(&self, member_id: &MemberId) -> bool {
        self.slots.get(member_id).is_some_and(|slot| slot.active)
    }

    /// Active members of `tier`, sorted by id.
    pub fn active_members(&self, tier: Tier) -> Vec<MemberId> {
        let mut ids: Vec<_> = self
            .slots
            .iter()
            .filter(|entry| entry.tier == tier && entry.active)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of updates that changed rotation.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TrafficRouter for BackendPool {
    async fn set_member_active(&self, member: &Member, active: bool) -> Result<Ack, RoutingError> {
        let mut slot = self
            .slots
            .get_mut(&member.id)
            .ok_or_else(|| RoutingError::UnknownMember(member.id.clone()))?;

        if slot.active == active {
            return Ok(Ack { changed: false });
        }
        slot.active = active;
        self.updates.fetch_add(1, Ordering::Relaxed);

        tracing::info!(member = %member.id, tier = %slot.tier, active, "Backend pool updated");
        Ok(Ack { changed: true })
    }
}
