// SPDX-License-Identifier: MIT OR Apache-2.0

//! Records exchanged between peers and the filters used to subscribe to them.
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Timestamp;
use crate::group::{Group, GroupId};
use crate::hash::Hash;
use crate::identity::PublicKey;
use crate::invite::Invite;
use crate::message::ChannelMessage;
use crate::revocation::Revocation;

/// Identifier of an invite, revocation or channel message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(Hash);

impl RecordId {
    /// Derives the id of a record issued by `from` about `to` in a group.
    pub fn derive(
        group_id: &GroupId,
        from: &PublicKey,
        to: &PublicKey,
        created_at: Timestamp,
    ) -> Self {
        Self(Hash::from_parts(&[
            group_id.as_bytes(),
            from.as_bytes(),
            to.as_bytes(),
            &created_at.to_be_bytes(),
        ]))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Hash> for RecordId {
    fn from(value: Hash) -> Self {
        Self(value)
    }
}

/// Any immutable record travelling over the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Record {
    Group(Group),
    Invite(Invite),
    Revocation(Revocation),
    Message(ChannelMessage),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Group(_) => RecordKind::Group,
            Record::Invite(_) => RecordKind::Invite,
            Record::Revocation(_) => RecordKind::Revocation,
            Record::Message(_) => RecordKind::Message,
        }
    }

    pub fn group_id(&self) -> GroupId {
        match self {
            Record::Group(group) => group.id(),
            Record::Invite(invite) => invite.group_id(),
            Record::Revocation(revocation) => revocation.group_id(),
            Record::Message(message) => message.group_id(),
        }
    }

    /// Identity this record is about: the creator of a group, the invitee of an invite, the
    /// revoked identity of a revocation or the author of a message.
    pub fn subject(&self) -> PublicKey {
        match self {
            Record::Group(group) => group.creator(),
            Record::Invite(invite) => invite.invitee(),
            Record::Revocation(revocation) => revocation.revoked(),
            Record::Message(message) => message.author(),
        }
    }

    /// Encodes the record in CBOR for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| CodecError::Encode(err.to_string()))?;
        Ok(bytes)
    }

    /// Decodes a record from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        ciborium::de::from_reader(bytes).map_err(|err| CodecError::Decode(err.to_string()))
    }
}

impl From<Group> for Record {
    fn from(value: Group) -> Self {
        Record::Group(value)
    }
}

impl From<Invite> for Record {
    fn from(value: Invite) -> Self {
        Record::Invite(value)
    }
}

impl From<Revocation> for Record {
    fn from(value: Revocation) -> Self {
        Record::Revocation(value)
    }
}

impl From<ChannelMessage> for Record {
    fn from(value: ChannelMessage) -> Self {
        Record::Message(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Group,
    Invite,
    Revocation,
    Message,
}

/// Tag narrowing a subscription to one group or to records about one identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tag {
    Group(GroupId),
    Identity(PublicKey),
}

/// Selects records by kind and tag. Empty kinds match every kind, a missing tag matches every
/// record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub kinds: Vec<RecordKind>,
    pub tag: Option<Tag>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Everything happening inside one group.
    pub fn group(group_id: GroupId) -> Self {
        Self {
            kinds: Vec::new(),
            tag: Some(Tag::Group(group_id)),
        }
    }

    /// Invites addressed to an identity.
    pub fn invites_for(identity: PublicKey) -> Self {
        Self {
            kinds: vec![RecordKind::Invite],
            tag: Some(Tag::Identity(identity)),
        }
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&record.kind()) {
            return false;
        }

        match self.tag {
            None => true,
            Some(Tag::Group(group_id)) => record.group_id() == group_id,
            Some(Tag::Identity(identity)) => record.subject() == identity,
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("could not encode record: {0}")]
    Encode(String),

    #[error("could not decode record: {0}")]
    Decode(String),
}
