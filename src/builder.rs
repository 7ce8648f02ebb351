// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconstructs invite chains from a group's flat invite set.
//!
//! Starting at an invite naming the target identity, parent pointers are followed backwards
//! until an invite without parent is reached. A parent which is not known yet (for example
//! because it did not arrive over the network so far) fails closed: a missing link cannot be
//! told apart from no authorization at all.
use std::collections::HashSet;

use tracing::trace;

use crate::chain::{Chain, ChainError};
use crate::group::GroupId;
use crate::identity::PublicKey;
use crate::invite::Invite;
use crate::store::InviteSet;

/// Builds one candidate chain per invite naming `target`, skipping candidates with unresolved
/// parents or parent cycles.
///
/// More than one candidate exists when several invites name the same identity, for example a
/// forged one next to the genuine one. Candidates are returned in arrival order of their last
/// invite and still need to be verified.
pub fn build_chains(invites: &InviteSet, group_id: GroupId, target: &PublicKey) -> Vec<Chain> {
    invites
        .naming(target)
        .filter_map(|leaf| walk_back(invites, leaf))
        .map(|path| Chain::new(group_id, *target, path))
        .collect()
}

/// Builds the first resolvable chain for `target`.
pub fn build_chain(
    invites: &InviteSet,
    group_id: GroupId,
    target: &PublicKey,
) -> Result<Chain, ChainError> {
    build_chains(invites, group_id, target)
        .into_iter()
        .next()
        .ok_or(ChainError::NotFound(*target))
}

/// Builds the chain ending in `leaf`, which does not need to be part of `invites` itself.
///
/// Used to check an invite before it is stored.
pub fn build_chain_to(invites: &InviteSet, leaf: &Invite) -> Result<Chain, ChainError> {
    walk_back(invites, leaf)
        .map(|path| Chain::new(leaf.group_id(), leaf.invitee(), path))
        .ok_or(ChainError::NotFound(leaf.invitee()))
}

fn walk_back(invites: &InviteSet, leaf: &Invite) -> Option<Vec<Invite>> {
    let mut path = vec![leaf.clone()];
    let mut visited = HashSet::from([leaf.id()]);
    let mut current = leaf;

    while let Some(parent_id) = current.parent() {
        if !visited.insert(parent_id) {
            trace!(invite = %leaf.id(), "parent cycle in invite chain");
            return None;
        }

        let Some(parent) = invites.get(&parent_id) else {
            trace!(invite = %leaf.id(), parent = %parent_id, "unresolved parent invite");
            return None;
        };

        path.push(parent.clone());
        current = parent;
    }

    path.reverse();
    Some(path)
}

#[cfg(test)]
mod tests {
    use crate::chain::{ChainError, verify};
    use crate::group::{Group, GroupParams};
    use crate::identity::{Ed25519Verifier, PrivateKey};
    use crate::invite::Invite;
    use crate::revocation::Revocation;
    use crate::store::InviteSet;

    use super::{build_chain, build_chain_to, build_chains};

    const NONE: &[Revocation] = &[];

    #[test]
    fn walks_parents_back_to_root() {
        let creator = PrivateKey::from_bytes(&[1; 32]);
        let a = PrivateKey::from_bytes(&[2; 32]);
        let b = PrivateKey::from_bytes(&[3; 32]);
        let group = Group::new(&creator, 1, 3, true, GroupParams::new("Camp"));

        let invite_a = Invite::new(&creator, group.id(), a.public_key(), 2, 1, None);
        let invite_b = Invite::new(&a, group.id(), b.public_key(), 3, 2, Some(invite_a.id()));

        // Out of causal order, child first.
        let mut invites = InviteSet::default();
        invites.insert(invite_b.clone());
        invites.insert(invite_a.clone());

        let chain = build_chain(&invites, group.id(), &b.public_key()).unwrap();
        assert_eq!(chain.invites(), &[invite_a, invite_b]);
        assert_eq!(chain.member(), b.public_key());
        assert_eq!(verify(&chain, &group, NONE, &Ed25519Verifier), Ok(2));
    }

    #[test]
    fn missing_parent_fails_closed() {
        let creator = PrivateKey::from_bytes(&[1; 32]);
        let a = PrivateKey::from_bytes(&[2; 32]);
        let b = PrivateKey::from_bytes(&[3; 32]);
        let group = Group::new(&creator, 1, 3, true, GroupParams::new("Camp"));

        let invite_a = Invite::new(&creator, group.id(), a.public_key(), 2, 1, None);
        let invite_b = Invite::new(&a, group.id(), b.public_key(), 3, 2, Some(invite_a.id()));

        let mut invites = InviteSet::default();
        invites.insert(invite_b);
        assert_eq!(
            build_chain(&invites, group.id(), &b.public_key()),
            Err(ChainError::NotFound(b.public_key()))
        );

        // Parent arrives later, the chain resolves now.
        invites.insert(invite_a);
        assert!(build_chain(&invites, group.id(), &b.public_key()).is_ok());
    }

    #[test]
    fn chain_to_invite_not_yet_stored() {
        let creator = PrivateKey::from_bytes(&[1; 32]);
        let a = PrivateKey::from_bytes(&[2; 32]);
        let b = PrivateKey::from_bytes(&[3; 32]);
        let group = Group::new(&creator, 1, 3, true, GroupParams::new("Camp"));

        let invite_a = Invite::new(&creator, group.id(), a.public_key(), 2, 1, None);
        let invite_b = Invite::new(&a, group.id(), b.public_key(), 3, 2, Some(invite_a.id()));

        let mut invites = InviteSet::default();
        assert_eq!(
            build_chain_to(&invites, &invite_b),
            Err(ChainError::NotFound(b.public_key()))
        );

        invites.insert(invite_a.clone());
        let chain = build_chain_to(&invites, &invite_b).unwrap();
        assert_eq!(chain.invites(), &[invite_a, invite_b.clone()]);
        assert!(!invites.contains(&invite_b.id()));
    }

    #[test]
    fn unknown_identity_has_no_chain() {
        let creator = PrivateKey::from_bytes(&[1; 32]);
        let stranger = PrivateKey::from_bytes(&[9; 32]).public_key();
        let group = Group::new(&creator, 1, 3, true, GroupParams::new("Camp"));

        let invites = InviteSet::default();
        assert_eq!(
            build_chain(&invites, group.id(), &stranger),
            Err(ChainError::NotFound(stranger))
        );
    }

    #[test]
    fn parent_cycle_fails_closed() {
        let creator = PrivateKey::from_bytes(&[1; 32]);
        let a = PrivateKey::from_bytes(&[2; 32]);
        let b = PrivateKey::from_bytes(&[3; 32]);
        let group = Group::new(&creator, 1, 3, true, GroupParams::new("Camp"));

        // Parent pointers are not signed, a peer can point two invites at each other.
        let mut invite_a = Invite::new(&b, group.id(), a.public_key(), 2, 1, None);
        let mut invite_b = Invite::new(&a, group.id(), b.public_key(), 3, 2, None);
        invite_a.parent = Some(invite_b.id());
        invite_b.parent = Some(invite_a.id());

        let mut invites = InviteSet::default();
        invites.insert(invite_a);
        invites.insert(invite_b);
        assert!(build_chains(&invites, group.id(), &b.public_key()).is_empty());
    }

    #[test]
    fn forged_invite_does_not_mask_genuine_one() {
        let creator = PrivateKey::from_bytes(&[1; 32]);
        let eve = PrivateKey::from_bytes(&[66; 32]);
        let b = PrivateKey::from_bytes(&[3; 32]);
        let group = Group::new(&creator, 1, 3, true, GroupParams::new("Camp"));

        let forged = Invite::new(&eve, group.id(), b.public_key(), 2, 1, None);
        let genuine = Invite::new(&creator, group.id(), b.public_key(), 3, 1, None);

        let mut invites = InviteSet::default();
        invites.insert(forged);
        invites.insert(genuine);

        let results: Vec<_> = build_chains(&invites, group.id(), &b.public_key())
            .iter()
            .map(|chain| verify(chain, &group, NONE, &Ed25519Verifier))
            .collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(ChainError::BrokenChain { .. })));
        assert_eq!(results[1], Ok(1));
    }
}
