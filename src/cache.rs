// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-group cache of verified members.
//!
//! Only positive verification results are cached. A negative result is always recomputed since
//! records arriving later (for example a missing parent invite) can turn it positive.
use std::collections::HashMap;

use crate::group::GroupId;
use crate::identity::PublicKey;

#[derive(Clone, Debug, Default)]
pub struct MembershipCache {
    groups: HashMap<GroupId, HashMap<PublicKey, u32>>,
}

impl MembershipCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verified depth of an identity, `None` on a cache miss.
    pub fn get(&self, group_id: &GroupId, identity: &PublicKey) -> Option<u32> {
        self.groups
            .get(group_id)
            .and_then(|members| members.get(identity))
            .copied()
    }

    pub fn insert(&mut self, group_id: GroupId, identity: PublicKey, depth: u32) {
        self.groups
            .entry(group_id)
            .or_default()
            .insert(identity, depth);
    }

    /// Marks the creator as member at depth 0, the creator needs no chain.
    pub fn seed_creator(&mut self, group_id: GroupId, creator: PublicKey) {
        self.insert(group_id, creator, 0);
    }

    /// Drops every cached member of a group and re-seeds its creator.
    pub fn invalidate(&mut self, group_id: GroupId, creator: PublicKey) {
        self.groups.remove(&group_id);
        self.seed_creator(group_id, creator);
    }

    /// Number of cached members of a group.
    pub fn len(&self, group_id: &GroupId) -> usize {
        self.groups.get(group_id).map_or(0, HashMap::len)
    }
}
