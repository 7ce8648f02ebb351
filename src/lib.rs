// SPDX-License-Identifier: MIT OR Apache-2.0

//! Invite-chain authorization for private groups.
//!
//! Members of a group recruit new members by signing invites. Every invite extends a delegation
//! tree rooted at the group's creator, an identity is a member as long as an unbroken chain of
//! correctly signed invites leads from the creator to it, no link is revoked and the chain stays
//! within the group's maximum depth.
//!
//! [`Manager`] is the entry point: it authors groups, invites and revocations, ingests the
//! records of other peers and answers membership queries through a cache of verified members.
pub mod builder;
pub mod cache;
pub mod chain;
mod clock;
pub mod config;
pub mod encryption;
pub mod event;
pub mod group;
pub mod hash;
pub mod identity;
pub mod invite;
pub mod manager;
pub mod message;
pub mod node;
pub mod record;
pub mod revocation;
pub mod store;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod traits;

pub use chain::{Chain, ChainError};
pub use clock::Timestamp;
pub use config::Config;
pub use event::Event;
pub use group::{Group, GroupId, GroupParams};
pub use hash::{Hash, HashError};
pub use identity::{Ed25519Verifier, IdentityError, PrivateKey, PublicKey, Signature};
pub use invite::Invite;
pub use manager::{Manager, ManagerError};
pub use message::ChannelMessage;
pub use node::{Node, NodeError};
pub use record::{Filter, Record, RecordId, RecordKind, Tag};
pub use revocation::Revocation;
