// SPDX-License-Identifier: MIT OR Apache-2.0

//! Invite chains and their verification.
//!
//! A chain is the ordered path of invites from a group's creator down to a candidate member.
//! Verification is a pure function of the chain, the group and the set of revocations: the same
//! inputs always produce the same verdict, which is what makes caching its results safe.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::group::{Group, GroupId};
use crate::identity::PublicKey;
use crate::invite::Invite;
use crate::revocation::Revocation;
use crate::traits::Verifier;

/// Ordered path of invites from the group root to `member`.
///
/// Chains are reconstructed on demand from the flat invite set of a group, they are never the
/// source of truth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub(crate) group_id: GroupId,
    pub(crate) member: PublicKey,
    pub(crate) invites: Vec<Invite>,
}

impl Chain {
    pub fn new(group_id: GroupId, member: PublicKey, invites: Vec<Invite>) -> Self {
        Self {
            group_id,
            member,
            invites,
        }
    }

    /// Chain of the group creator, it contains no invites.
    pub fn root(group: &Group) -> Self {
        Self::new(group.id(), group.creator(), Vec::new())
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn member(&self) -> PublicKey {
        self.member
    }

    pub fn invites(&self) -> &[Invite] {
        &self.invites
    }

    pub fn len(&self) -> usize {
        self.invites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }

    /// Last link of the chain, the invite which admitted `member`.
    pub fn last(&self) -> Option<&Invite> {
        self.invites.last()
    }
}

/// Verifies a chain against its group and the group's revocations.
///
/// Returns the verified depth of the chain's member, `0` for the creator. Any failed check
/// rejects the whole chain.
pub fn verify<'a, V, I>(
    chain: &Chain,
    group: &Group,
    revocations: I,
    verifier: &V,
) -> Result<u32, ChainError>
where
    V: Verifier,
    I: IntoIterator<Item = &'a Revocation>,
{
    if chain.invites.is_empty() {
        return if chain.member == group.creator {
            Ok(0)
        } else {
            Err(ChainError::NotCreator(chain.member))
        };
    }

    if chain.invites.len() > group.max_depth as usize {
        return Err(ChainError::TooLong(chain.invites.len(), group.max_depth));
    }

    // Any revocation naming an identity revokes it here, who may author one is decided
    // elsewhere.
    let revoked: HashSet<PublicKey> = revocations
        .into_iter()
        .map(|revocation| revocation.revoked)
        .collect();

    let mut expected_inviter = group.creator;

    for (index, invite) in chain.invites.iter().enumerate() {
        if invite.group_id != group.id {
            return Err(ChainError::GroupMismatch(index, invite.group_id));
        }

        if invite.inviter != expected_inviter {
            return Err(ChainError::BrokenChain {
                index,
                expected: expected_inviter,
                found: invite.inviter,
            });
        }

        if revoked.contains(&expected_inviter) {
            return Err(ChainError::Revoked(expected_inviter));
        }

        if !invite.verify_signature(verifier) {
            return Err(ChainError::InvalidSignature(index));
        }

        let position = index as u32 + 1;
        if invite.depth != position || invite.depth > group.max_depth {
            return Err(ChainError::DepthMismatch {
                index,
                expected: position,
                found: invite.depth,
            });
        }

        expected_inviter = invite.invitee;
    }

    if expected_inviter != chain.member {
        return Err(ChainError::MemberMismatch(chain.member, expected_inviter));
    }

    if revoked.contains(&chain.member) {
        return Err(ChainError::Revoked(chain.member));
    }

    Ok(chain.invites.len() as u32)
}

/// Reasons for rejecting a chain.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("empty chain of {0} who is not the group creator")]
    NotCreator(PublicKey),

    #[error("chain of length {0} exceeds maximum depth {1}")]
    TooLong(usize, u32),

    #[error("invite {0} belongs to different group {1}")]
    GroupMismatch(usize, GroupId),

    #[error("broken chain at invite {index}: expected inviter {expected}, found {found}")]
    BrokenChain {
        index: usize,
        expected: PublicKey,
        found: PublicKey,
    },

    #[error("{0} was revoked")]
    Revoked(PublicKey),

    #[error("invalid signature on invite {0}")]
    InvalidSignature(usize),

    #[error("invite {index} states depth {found}, expected {expected}")]
    DepthMismatch {
        index: usize,
        expected: u32,
        found: u32,
    },

    #[error("chain ends at {1} instead of {0}")]
    MemberMismatch(PublicKey, PublicKey),

    #[error("no invite found for {0}")]
    NotFound(PublicKey),
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::group::{Group, GroupId, GroupParams};
    use crate::identity::{Ed25519Verifier, PrivateKey, PublicKey};
    use crate::invite::Invite;
    use crate::revocation::Revocation;

    use super::{Chain, ChainError, verify};

    const NONE: &[Revocation] = &[];

    fn key(seed: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[seed; 32])
    }

    fn group(creator: &PrivateKey, max_depth: u32) -> Group {
        Group::new(
            creator,
            1,
            max_depth,
            true,
            GroupParams::new("Festival"),
        )
    }

    /// Builds a correctly signed chain creator -> keys[0] -> keys[1] -> ...
    fn delegate(group: &Group, creator: &PrivateKey, keys: &[&PrivateKey]) -> Chain {
        let mut invites: Vec<Invite> = Vec::new();
        let mut inviter = creator;
        for (index, invitee) in keys.iter().enumerate() {
            let parent = invites.last().map(|invite| invite.id());
            invites.push(Invite::new(
                inviter,
                group.id(),
                invitee.public_key(),
                10 + index as u64,
                index as u32 + 1,
                parent,
            ));
            inviter = *invitee;
        }
        let member = keys
            .last()
            .map(|key| key.public_key())
            .unwrap_or(creator.public_key());
        Chain::new(group.id(), member, invites)
    }

    fn revoke(revoker: &PrivateKey, group: &Group, revoked: PublicKey) -> Revocation {
        Revocation::new(revoker, group.id(), revoked, 100, None)
    }

    #[test]
    fn empty_chain_only_for_creator() {
        let creator = key(1);
        let group = group(&creator, 3);

        let chain = Chain::root(&group);
        assert_eq!(verify(&chain, &group, NONE, &Ed25519Verifier), Ok(0));

        let other = key(2).public_key();
        let chain = Chain::new(group.id(), other, Vec::new());
        assert_eq!(
            verify(&chain, &group, NONE, &Ed25519Verifier),
            Err(ChainError::NotCreator(other))
        );
    }

    #[test]
    fn valid_chains_verify_to_their_length() {
        let creator = key(1);
        let (a, b, c) = (key(2), key(3), key(4));
        let group = group(&creator, 3);

        for (keys, depth) in [
            (vec![&a], 1),
            (vec![&a, &b], 2),
            (vec![&a, &b, &c], 3),
        ] {
            let chain = delegate(&group, &creator, &keys);
            assert_eq!(verify(&chain, &group, NONE, &Ed25519Verifier), Ok(depth));
        }
    }

    #[test]
    fn chain_longer_than_max_depth_rejects() {
        let creator = key(1);
        let (a, b, c) = (key(2), key(3), key(4));
        let group = group(&creator, 2);

        let chain = delegate(&group, &creator, &[&a, &b, &c]);
        assert_eq!(
            verify(&chain, &group, NONE, &Ed25519Verifier),
            Err(ChainError::TooLong(3, 2))
        );
    }

    #[test]
    fn revocation_invalidates_downstream_only() {
        let creator = key(1);
        let (a, b, c, d) = (key(2), key(3), key(4), key(5));
        let group = group(&creator, 3);

        // creator -> a -> b -> c and creator -> d
        let chain_a = delegate(&group, &creator, &[&a]);
        let chain_b = delegate(&group, &creator, &[&a, &b]);
        let chain_c = delegate(&group, &creator, &[&a, &b, &c]);
        let chain_d = delegate(&group, &creator, &[&d]);

        let revocations = [revoke(&creator, &group, a.public_key())];

        assert_eq!(
            verify(&chain_a, &group, &revocations, &Ed25519Verifier),
            Err(ChainError::Revoked(a.public_key()))
        );
        assert_eq!(
            verify(&chain_b, &group, &revocations, &Ed25519Verifier),
            Err(ChainError::Revoked(a.public_key()))
        );
        assert_eq!(
            verify(&chain_c, &group, &revocations, &Ed25519Verifier),
            Err(ChainError::Revoked(a.public_key()))
        );
        assert_eq!(
            verify(&chain_d, &group, &revocations, &Ed25519Verifier),
            Ok(1)
        );
        assert_eq!(
            verify(&Chain::root(&group), &group, &revocations, &Ed25519Verifier),
            Ok(0)
        );

        // Revoking the leaf keeps everyone above valid.
        let revocations = [revoke(&b, &group, c.public_key())];
        assert_eq!(
            verify(&chain_b, &group, &revocations, &Ed25519Verifier),
            Ok(2)
        );
        assert_eq!(
            verify(&chain_c, &group, &revocations, &Ed25519Verifier),
            Err(ChainError::Revoked(c.public_key()))
        );
    }

    #[test]
    fn tampered_payload_rejects() {
        let creator = key(1);
        let (a, b) = (key(2), key(3));
        let group = group(&creator, 3);
        let chain = delegate(&group, &creator, &[&a, &b]);

        let mut tampered = chain.clone();
        tampered.invites[0].created_at += 1;
        assert_eq!(
            verify(&tampered, &group, NONE, &Ed25519Verifier),
            Err(ChainError::InvalidSignature(0))
        );

        // Flipping a single bit of the signature.
        let mut tampered = chain.clone();
        let mut signature = tampered.invites[1].signature.to_bytes();
        signature[17] ^= 1;
        tampered.invites[1].signature = crate::identity::Signature::from_bytes(&signature);
        assert_eq!(
            verify(&tampered, &group, NONE, &Ed25519Verifier),
            Err(ChainError::InvalidSignature(1))
        );

        // Depth is signed, changing it breaks the signature first.
        let mut tampered = chain;
        tampered.invites[1].depth = 1;
        assert_eq!(
            verify(&tampered, &group, NONE, &Ed25519Verifier),
            Err(ChainError::InvalidSignature(1))
        );
    }

    #[test]
    fn substituted_inviter_rejects() {
        let creator = key(1);
        let (a, b, eve) = (key(2), key(3), key(66));
        let group = group(&creator, 3);
        let chain = delegate(&group, &creator, &[&a]);

        // Eve signs an invite for b and claims it follows a's invite.
        let forged = Invite::new(
            &eve,
            group.id(),
            b.public_key(),
            20,
            2,
            Some(chain.invites[0].id()),
        );
        let mut invites = chain.invites.clone();
        invites.push(forged);
        let chain = Chain::new(group.id(), b.public_key(), invites);

        assert_matches!(
            verify(&chain, &group, NONE, &Ed25519Verifier),
            Err(ChainError::BrokenChain { index: 1, found, .. }) if found == eve.public_key()
        );
    }

    #[test]
    fn self_signed_depth_must_match_position() {
        let creator = key(1);
        let a = key(2);
        let group = group(&creator, 3);

        // Correctly signed but claiming depth 2 at the first position.
        let invite = Invite::new(&creator, group.id(), a.public_key(), 10, 2, None);
        let chain = Chain::new(group.id(), a.public_key(), vec![invite]);
        assert_matches!(
            verify(&chain, &group, NONE, &Ed25519Verifier),
            Err(ChainError::DepthMismatch {
                index: 0,
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn wrong_group_rejects() {
        let creator = key(1);
        let a = key(2);
        let group = group(&creator, 3);
        let other_group = Group::new(&creator, 2, 3, true, GroupParams::new("Other"));

        let chain = delegate(&other_group, &creator, &[&a]);
        assert_matches!(
            verify(&chain, &group, NONE, &Ed25519Verifier),
            Err(ChainError::GroupMismatch(0, id)) if id == other_group.id()
        );
        assert_ne!(group.id(), GroupId::derive(&creator.public_key(), 2));
    }

    #[test]
    fn member_must_be_last_invitee() {
        let creator = key(1);
        let (a, b) = (key(2), key(3));
        let group = group(&creator, 3);
        let mut chain = delegate(&group, &creator, &[&a]);
        chain.member = b.public_key();

        assert_eq!(
            verify(&chain, &group, NONE, &Ed25519Verifier),
            Err(ChainError::MemberMismatch(b.public_key(), a.public_key()))
        );
    }
}
