// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::clock::Timestamp;
use crate::group::{Group, GroupId};
use crate::identity::PublicKey;
use crate::invite::Invite;
use crate::revocation::Revocation;

/// Outcome of processing a received record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A group definition became known.
    GroupReceived(Group),

    /// An invite was added to a group.
    InviteReceived {
        invite: Invite,

        /// Invite names the local identity.
        for_us: bool,
    },

    /// A revocation was accepted, its target and everyone below it lost membership.
    Revoked(Revocation),

    /// Our own chain stopped verifying, we are no longer a member of the group.
    Left(GroupId),

    /// Decrypted content of a channel message by a member.
    Message {
        group_id: GroupId,
        channel: String,
        author: PublicKey,
        created_at: Timestamp,
        content: Vec<u8>,
    },
}
