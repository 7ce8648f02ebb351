// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::hash::Hash;
use crate::identity::{PublicKey, Signature};
use crate::traits::{Signer, Verifier};

/// Identifier of a group, derived from its creator and creation time.
///
/// Derivation is deterministic so the same inputs always yield the same id. This is used to
/// re-derive and check ids of received groups, it is not a security boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(Hash);

impl GroupId {
    pub fn derive(creator: &PublicKey, created_at: Timestamp) -> Self {
        Self(Hash::from_parts(&[
            creator.as_bytes(),
            &created_at.to_be_bytes(),
        ]))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Hash> for GroupId {
    fn from(value: Hash) -> Self {
        Self(value)
    }
}

/// Private group space whose members are authorized through invite chains.
///
/// Immutable once created. Only `creator`, `created_at` and `max_depth` carry authorization
/// semantics, all other fields are descriptive. The creator signs every field so no peer can hand
/// out a copy with the same id but different settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub(crate) id: GroupId,
    pub(crate) creator: PublicKey,
    pub(crate) created_at: Timestamp,
    pub(crate) max_depth: u32,
    pub(crate) is_private: bool,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) schedule: Option<String>,
    pub(crate) channels: Vec<String>,
    pub(crate) signature: Signature,
}

impl Group {
    pub(crate) fn new<S: Signer>(
        signer: &S,
        created_at: Timestamp,
        max_depth: u32,
        is_private: bool,
        params: GroupParams,
    ) -> Self {
        let creator = signer.public_key();
        let id = GroupId::derive(&creator, created_at);
        let bytes = Self::signable_bytes(
            &id,
            &creator,
            created_at,
            max_depth,
            is_private,
            &params.name,
            params.description.as_deref(),
            params.schedule.as_deref(),
            &params.channels,
        );
        Self {
            id,
            creator,
            created_at,
            max_depth,
            is_private,
            name: params.name,
            description: params.description,
            schedule: params.schedule,
            channels: params.channels,
            signature: signer.sign(&bytes),
        }
    }

    /// Canonical byte encoding covered by the creator's signature.
    ///
    /// Strings are prefixed with their length, optional ones with a presence byte, so no two
    /// different groups share an encoding.
    #[allow(clippy::too_many_arguments)]
    pub fn signable_bytes(
        id: &GroupId,
        creator: &PublicKey,
        created_at: Timestamp,
        max_depth: u32,
        is_private: bool,
        name: &str,
        description: Option<&str>,
        schedule: Option<&str>,
        channels: &[String],
    ) -> Vec<u8> {
        fn put_str(bytes: &mut Vec<u8>, value: &str) {
            bytes.extend_from_slice(&(value.len() as u64).to_be_bytes());
            bytes.extend_from_slice(value.as_bytes());
        }

        fn put_optional(bytes: &mut Vec<u8>, value: Option<&str>) {
            match value {
                Some(value) => {
                    bytes.push(1);
                    put_str(bytes, value);
                }
                None => bytes.push(0),
            }
        }

        let mut bytes = Vec::with_capacity(32 * 2 + 8 + 4 + 1 + name.len() + 64);
        bytes.extend_from_slice(id.as_bytes());
        bytes.extend_from_slice(creator.as_bytes());
        bytes.extend_from_slice(&created_at.to_be_bytes());
        bytes.extend_from_slice(&max_depth.to_be_bytes());
        bytes.push(u8::from(is_private));
        put_str(&mut bytes, name);
        put_optional(&mut bytes, description);
        put_optional(&mut bytes, schedule);
        bytes.extend_from_slice(&(channels.len() as u64).to_be_bytes());
        for channel in channels {
            put_str(&mut bytes, channel);
        }
        bytes
    }

    pub fn to_signable_bytes(&self) -> Vec<u8> {
        Self::signable_bytes(
            &self.id,
            &self.creator,
            self.created_at,
            self.max_depth,
            self.is_private,
            &self.name,
            self.description.as_deref(),
            self.schedule.as_deref(),
            &self.channels,
        )
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn creator(&self) -> PublicKey {
        self.creator
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Maximum length of any invite chain in this group.
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn is_private(&self) -> bool {
        self.is_private
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn schedule(&self) -> Option<&str> {
        self.schedule.as_deref()
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.iter().any(|name| name == channel)
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Returns true if the id matches the one derived from creator and creation time, the depth
    /// ceiling is positive and the creator signed exactly these settings.
    pub fn validate<V: Verifier>(&self, verifier: &V) -> bool {
        self.id == GroupId::derive(&self.creator, self.created_at)
            && self.max_depth >= 1
            && verifier.verify(&self.creator, &self.to_signable_bytes(), &self.signature)
    }
}

/// Parameters for creating a new group.
///
/// Depth ceiling and privacy flag fall back to the manager's configuration when not set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupParams {
    pub name: String,
    pub description: Option<String>,
    pub schedule: Option<String>,
    pub channels: Vec<String>,
    pub max_depth: Option<u32>,
    pub is_private: Option<bool>,
}

impl GroupParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.push(channel.into());
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_private(mut self, is_private: bool) -> Self {
        self.is_private = Some(is_private);
        self
    }
}
