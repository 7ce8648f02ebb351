// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::group::GroupId;
use crate::identity::{PublicKey, Signature};
use crate::record::RecordId;
use crate::traits::{Signer, Verifier};

/// Signed record terminating an identity's membership in a group, including everyone who was
/// delegated through it.
///
/// Revocation is terminal, there is no way to re-admit a revoked identity into the same group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub(crate) id: RecordId,
    pub(crate) group_id: GroupId,
    pub(crate) revoker: PublicKey,
    pub(crate) revoked: PublicKey,
    pub(crate) created_at: Timestamp,
    pub(crate) signature: Signature,

    /// Human-readable reason, not covered by the signature.
    pub(crate) reason: Option<String>,
}

impl Revocation {
    pub(crate) fn new<S: Signer>(
        signer: &S,
        group_id: GroupId,
        revoked: PublicKey,
        created_at: Timestamp,
        reason: Option<String>,
    ) -> Self {
        let revoker = signer.public_key();
        let bytes = Self::signable_bytes(&group_id, &revoker, &revoked, created_at);
        Self {
            id: RecordId::derive(&group_id, &revoker, &revoked, created_at),
            group_id,
            revoker,
            revoked,
            created_at,
            signature: signer.sign(&bytes),
            reason,
        }
    }

    pub fn signable_bytes(
        group_id: &GroupId,
        revoker: &PublicKey,
        revoked: &PublicKey,
        created_at: Timestamp,
    ) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32 * 3 + 8);
        bytes.extend_from_slice(group_id.as_bytes());
        bytes.extend_from_slice(revoker.as_bytes());
        bytes.extend_from_slice(revoked.as_bytes());
        bytes.extend_from_slice(&created_at.to_be_bytes());
        bytes
    }

    pub fn to_signable_bytes(&self) -> Vec<u8> {
        Self::signable_bytes(&self.group_id, &self.revoker, &self.revoked, self.created_at)
    }

    pub fn verify_signature<V: Verifier>(&self, verifier: &V) -> bool {
        verifier.verify(&self.revoker, &self.to_signable_bytes(), &self.signature)
    }

    /// Checks id derivation and signature. Whether the revoker was allowed to author this
    /// revocation depends on the group's invite set and is checked by the manager.
    pub fn validate<V: Verifier>(&self, verifier: &V) -> bool {
        self.id == RecordId::derive(&self.group_id, &self.revoker, &self.revoked, self.created_at)
            && self.verify_signature(verifier)
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn revoker(&self) -> PublicKey {
        self.revoker
    }

    pub fn revoked(&self) -> PublicKey {
        self.revoked
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}
