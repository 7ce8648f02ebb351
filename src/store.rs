// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only record collections per group.
//!
//! Records are never removed or rewritten. Revoking an identity does not delete the invites below
//! it, revocation is layered on top of the unchanged history.
use std::collections::{HashMap, HashSet};

use petgraph::prelude::DiGraphMap;
use petgraph::visit::Bfs;

use crate::group::Group;
use crate::identity::PublicKey;
use crate::invite::Invite;
use crate::record::RecordId;
use crate::revocation::Revocation;

/// Flat invite list of one group with lookup indices.
#[derive(Clone, Debug, Default)]
pub struct InviteSet {
    invites: Vec<Invite>,
    by_id: HashMap<RecordId, usize>,
    by_invitee: HashMap<PublicKey, Vec<usize>>,
}

impl InviteSet {
    /// Appends an invite, returns false if it was already known.
    pub fn insert(&mut self, invite: Invite) -> bool {
        if self.by_id.contains_key(&invite.id()) {
            return false;
        }

        let index = self.invites.len();
        self.by_id.insert(invite.id(), index);
        self.by_invitee
            .entry(invite.invitee())
            .or_default()
            .push(index);
        self.invites.push(invite);
        true
    }

    pub fn get(&self, id: &RecordId) -> Option<&Invite> {
        self.by_id.get(id).map(|index| &self.invites[*index])
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.by_id.contains_key(id)
    }

    /// All invites naming the identity as invitee, in arrival order.
    pub fn naming<'a>(
        &'a self,
        invitee: &PublicKey,
    ) -> impl Iterator<Item = &'a Invite> + use<'a> {
        self.by_invitee
            .get(invitee)
            .into_iter()
            .flatten()
            .map(|index| &self.invites[*index])
    }

    /// Every identity which was invited at least once, in order of first appearance.
    pub fn invitees(&self) -> Vec<PublicKey> {
        let mut seen = HashSet::new();
        self.invites
            .iter()
            .map(|invite| invite.invitee())
            .filter(|invitee| seen.insert(*invitee))
            .collect()
    }

    /// Returns true if the invite links back to the group creator through its parents.
    ///
    /// Every step needs the parent to be known, to name the inviter as its invitee and to sit
    /// exactly one level higher. The walk ends at a depth 1 invite signed by the creator.
    /// Revocations are not considered, the answer only ever flips from false to true as invites
    /// arrive.
    pub fn is_rooted(&self, invite: &Invite, group: &Group) -> bool {
        let mut current = invite;
        loop {
            if current.group_id() != group.id() || current.depth() > group.max_depth() {
                return false;
            }

            let Some(parent_id) = current.parent() else {
                return current.inviter() == group.creator() && current.depth() == 1;
            };
            let Some(parent) = self.get(&parent_id) else {
                return false;
            };
            // Depth strictly decreases along the walk, so it terminates.
            if parent.invitee() != current.inviter()
                || parent.depth().checked_add(1) != Some(current.depth())
            {
                return false;
            }
            current = parent;
        }
    }

    /// Delegation edges inviter -> invitee of every invite rooted at the creator.
    fn authority_graph(&self, group: &Group) -> DiGraphMap<PublicKey, ()> {
        let mut graph = DiGraphMap::new();
        for invite in self.invites.iter().filter(|invite| self.is_rooted(invite, group)) {
            graph.add_edge(invite.inviter(), invite.invitee(), ());
        }
        graph
    }

    /// Returns true if `to` can be reached from `from` by following rooted inviter -> invitee
    /// edges.
    ///
    /// Invites signed by identities without a link to the creator never make their signer
    /// upstream of anyone. An identity is never upstream of itself.
    pub fn is_upstream(&self, group: &Group, from: &PublicKey, to: &PublicKey) -> bool {
        if from == to {
            return false;
        }

        let graph = self.authority_graph(group);
        if !graph.contains_node(*from) {
            return false;
        }

        let mut bfs = Bfs::new(&graph, *from);
        while let Some(node) = bfs.next(&graph) {
            if &node == to {
                return true;
            }
        }
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &Invite> {
        self.invites.iter()
    }

    pub fn len(&self) -> usize {
        self.invites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }
}

/// Accepted revocations of one group.
#[derive(Clone, Debug, Default)]
pub struct RevocationSet {
    revocations: Vec<Revocation>,
    ids: HashSet<RecordId>,
    revoked: HashSet<PublicKey>,
}

impl RevocationSet {
    /// Appends a revocation, returns false if it was already known.
    pub fn insert(&mut self, revocation: Revocation) -> bool {
        if !self.ids.insert(revocation.id()) {
            return false;
        }
        self.revoked.insert(revocation.revoked());
        self.revocations.push(revocation);
        true
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.ids.contains(id)
    }

    pub fn is_revoked(&self, identity: &PublicKey) -> bool {
        self.revoked.contains(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Revocation> {
        self.revocations.iter()
    }

    pub fn len(&self) -> usize {
        self.revocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revocations.is_empty()
    }
}

/// Revocations kept waiting per revoker and group.
pub const MAX_PENDING_PER_REVOKER: usize = 8;

/// Revocations kept waiting per group.
pub const MAX_PENDING_PER_GROUP: usize = 64;

/// Everything known about one group apart from its definition.
///
/// Records can arrive before the group itself, they are kept here until it does.
#[derive(Clone, Debug, Default)]
pub struct GroupRecords {
    pub invites: InviteSet,
    pub revocations: RevocationSet,

    /// Revocations received with a valid signature whose author was not (yet) provably allowed
    /// to issue them.
    pub pending_revocations: Vec<Revocation>,

    /// Ids of processed channel messages.
    pub messages: HashSet<RecordId>,
}

impl GroupRecords {
    /// Parks a revocation until its revoker's authority can be shown.
    ///
    /// Returns false if the revoker or the group already has as many parked revocations as
    /// allowed, the revocation is not kept then.
    pub fn park_revocation(&mut self, revocation: Revocation) -> bool {
        if self.pending_revocations.len() >= MAX_PENDING_PER_GROUP {
            return false;
        }

        let revoker = revocation.revoker();
        let by_revoker = self
            .pending_revocations
            .iter()
            .filter(|pending| pending.revoker() == revoker)
            .count();
        if by_revoker >= MAX_PENDING_PER_REVOKER {
            return false;
        }

        self.pending_revocations.push(revocation);
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::group::{Group, GroupId, GroupParams};
    use crate::identity::PrivateKey;
    use crate::invite::Invite;
    use crate::revocation::Revocation;

    use super::{
        GroupRecords, InviteSet, MAX_PENDING_PER_GROUP, MAX_PENDING_PER_REVOKER, RevocationSet,
    };

    #[test]
    fn deduplicates_invites() {
        let creator = PrivateKey::from_bytes(&[1; 32]);
        let a = PrivateKey::from_bytes(&[2; 32]).public_key();
        let group_id = GroupId::derive(&creator.public_key(), 1);
        let invite = Invite::new(&creator, group_id, a, 2, 1, None);

        let mut set = InviteSet::default();
        assert!(set.insert(invite.clone()));
        assert!(!set.insert(invite.clone()));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&invite.id()));
        assert_eq!(set.get(&invite.id()), Some(&invite));
        assert_eq!(set.naming(&a).count(), 1);
        assert_eq!(set.naming(&creator.public_key()).count(), 0);
    }

    #[test]
    fn upstream_follows_edges_forward() {
        let creator = PrivateKey::from_bytes(&[1; 32]);
        let a = PrivateKey::from_bytes(&[2; 32]);
        let b = PrivateKey::from_bytes(&[3; 32]);
        let c = PrivateKey::from_bytes(&[4; 32]);
        let group = Group::new(&creator, 1, 3, true, GroupParams::new("Camp"));

        let invite_a = Invite::new(&creator, group.id(), a.public_key(), 2, 1, None);
        let mut set = InviteSet::default();
        set.insert(invite_a.clone());
        set.insert(Invite::new(&a, group.id(), b.public_key(), 3, 2, Some(invite_a.id())));
        set.insert(Invite::new(&creator, group.id(), c.public_key(), 4, 1, None));

        assert!(set.is_upstream(&group, &creator.public_key(), &b.public_key()));
        assert!(set.is_upstream(&group, &a.public_key(), &b.public_key()));
        assert!(!set.is_upstream(&group, &b.public_key(), &a.public_key()));
        assert!(!set.is_upstream(&group, &a.public_key(), &c.public_key()));
        assert!(!set.is_upstream(&group, &a.public_key(), &a.public_key()));
        assert!(!set.is_upstream(&group, &c.public_key(), &b.public_key()));

        assert_eq!(
            set.invitees(),
            vec![a.public_key(), b.public_key(), c.public_key()]
        );
    }

    #[test]
    fn unrooted_invites_grant_no_authority() {
        let creator = PrivateKey::from_bytes(&[1; 32]);
        let a = PrivateKey::from_bytes(&[2; 32]);
        let eve = PrivateKey::from_bytes(&[66; 32]);
        let mallory = PrivateKey::from_bytes(&[67; 32]);
        let group = Group::new(&creator, 1, 3, true, GroupParams::new("Camp"));

        let invite_a = Invite::new(&creator, group.id(), a.public_key(), 2, 1, None);
        let mut set = InviteSet::default();
        set.insert(invite_a.clone());

        // Eve has no chain and claims to sit right below the creator.
        let stranger = Invite::new(&eve, group.id(), a.public_key(), 3, 1, None);
        set.insert(stranger.clone());
        assert!(!set.is_rooted(&stranger, &group));
        assert!(!set.is_upstream(&group, &eve.public_key(), &a.public_key()));

        // Mallory points at a parent which does not name her.
        let wrong_parent = Invite::new(
            &mallory,
            group.id(),
            eve.public_key(),
            4,
            2,
            Some(invite_a.id()),
        );
        set.insert(wrong_parent.clone());
        assert!(!set.is_rooted(&wrong_parent, &group));

        // Depth has to follow the parent's.
        let skipped = Invite::new(&a, group.id(), eve.public_key(), 5, 3, Some(invite_a.id()));
        set.insert(skipped.clone());
        assert!(!set.is_rooted(&skipped, &group));

        // Built on top of an unrooted invite.
        let on_stranger = Invite::new(
            &a,
            group.id(),
            mallory.public_key(),
            6,
            2,
            Some(stranger.id()),
        );
        set.insert(on_stranger.clone());
        assert!(!set.is_rooted(&on_stranger, &group));
        assert!(!set.is_upstream(&group, &a.public_key(), &mallory.public_key()));

        // A missing parent links up once it arrives.
        let invite_eve = Invite::new(&creator, group.id(), eve.public_key(), 7, 1, None);
        let below_eve = Invite::new(
            &eve,
            group.id(),
            mallory.public_key(),
            8,
            2,
            Some(invite_eve.id()),
        );
        set.insert(below_eve.clone());
        assert!(!set.is_rooted(&below_eve, &group));
        set.insert(invite_eve);
        assert!(set.is_rooted(&below_eve, &group));
        assert!(set.is_upstream(&group, &eve.public_key(), &mallory.public_key()));
        assert!(set.is_upstream(&group, &creator.public_key(), &mallory.public_key()));
    }

    #[test]
    fn tracks_revoked_identities() {
        let creator = PrivateKey::from_bytes(&[1; 32]);
        let a = PrivateKey::from_bytes(&[2; 32]).public_key();
        let group_id = GroupId::derive(&creator.public_key(), 1);
        let revocation = Revocation::new(&creator, group_id, a, 3, None);

        let mut set = RevocationSet::default();
        assert!(!set.is_revoked(&a));
        assert!(set.insert(revocation.clone()));
        assert!(!set.insert(revocation));
        assert!(set.is_revoked(&a));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn parked_revocations_are_bounded() {
        let creator = PrivateKey::from_bytes(&[1; 32]);
        let group_id = GroupId::derive(&creator.public_key(), 1);
        let target = PrivateKey::from_bytes(&[2; 32]).public_key();
        let mut records = GroupRecords::default();

        let eve = PrivateKey::from_bytes(&[66; 32]);
        for created_at in 0..MAX_PENDING_PER_REVOKER as u64 {
            let revocation = Revocation::new(&eve, group_id, target, created_at, None);
            assert!(records.park_revocation(revocation));
        }
        assert!(!records.park_revocation(Revocation::new(&eve, group_id, target, 100, None)));
        assert_eq!(records.pending_revocations.len(), MAX_PENDING_PER_REVOKER);

        // Other revokers have their own allowance until the group is full.
        let mut seed = 100;
        while records.pending_revocations.len() < MAX_PENDING_PER_GROUP {
            let revoker = PrivateKey::from_bytes(&[seed; 32]);
            assert!(records.park_revocation(Revocation::new(&revoker, group_id, target, 1, None)));
            seed += 1;
        }
        let late = PrivateKey::from_bytes(&[seed; 32]);
        assert!(!records.park_revocation(Revocation::new(&late, group_id, target, 1, None)));
        assert_eq!(records.pending_revocations.len(), MAX_PENDING_PER_GROUP);
    }
}
