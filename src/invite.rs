// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::group::GroupId;
use crate::identity::{PublicKey, Signature};
use crate::record::RecordId;
use crate::traits::{Signer, Verifier};

/// Signed delegation of group membership from an inviter to an invitee.
///
/// An invite only verifies its own signature in isolation, whether the inviter was authorized to
/// issue it is decided by verifying the whole chain it is part of.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub(crate) id: RecordId,
    pub(crate) group_id: GroupId,
    pub(crate) inviter: PublicKey,
    pub(crate) invitee: PublicKey,
    pub(crate) created_at: Timestamp,

    /// Position in the chain, the creator's direct invites have depth 1.
    pub(crate) depth: u32,

    /// Invite which authorized the inviter, `None` if the inviter is the group creator.
    pub(crate) parent: Option<RecordId>,

    pub(crate) signature: Signature,
}

impl Invite {
    pub(crate) fn new<S: Signer>(
        signer: &S,
        group_id: GroupId,
        invitee: PublicKey,
        created_at: Timestamp,
        depth: u32,
        parent: Option<RecordId>,
    ) -> Self {
        let inviter = signer.public_key();
        let bytes = Self::signable_bytes(&group_id, &inviter, &invitee, created_at, depth);
        Self {
            id: RecordId::derive(&group_id, &inviter, &invitee, created_at),
            group_id,
            inviter,
            invitee,
            created_at,
            depth,
            parent,
            signature: signer.sign(&bytes),
        }
    }

    /// Canonical byte encoding covered by the inviter's signature.
    ///
    /// The parent pointer is not part of it, the verifier checks chain continuity on its own.
    pub fn signable_bytes(
        group_id: &GroupId,
        inviter: &PublicKey,
        invitee: &PublicKey,
        created_at: Timestamp,
        depth: u32,
    ) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32 * 3 + 8 + 4);
        bytes.extend_from_slice(group_id.as_bytes());
        bytes.extend_from_slice(inviter.as_bytes());
        bytes.extend_from_slice(invitee.as_bytes());
        bytes.extend_from_slice(&created_at.to_be_bytes());
        bytes.extend_from_slice(&depth.to_be_bytes());
        bytes
    }

    pub fn to_signable_bytes(&self) -> Vec<u8> {
        Self::signable_bytes(
            &self.group_id,
            &self.inviter,
            &self.invitee,
            self.created_at,
            self.depth,
        )
    }

    pub fn verify_signature<V: Verifier>(&self, verifier: &V) -> bool {
        verifier.verify(&self.inviter, &self.to_signable_bytes(), &self.signature)
    }

    /// Checks everything which can be checked without knowing the rest of the group: id
    /// derivation, depth and signature.
    pub fn validate<V: Verifier>(&self, verifier: &V) -> bool {
        self.id == RecordId::derive(&self.group_id, &self.inviter, &self.invitee, self.created_at)
            && self.depth >= 1
            && self.verify_signature(verifier)
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn inviter(&self) -> PublicKey {
        self.inviter
    }

    pub fn invitee(&self) -> PublicKey {
        self.invitee
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn parent(&self) -> Option<RecordId> {
        self.parent
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }
}
