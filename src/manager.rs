// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group authority manager.
//!
//! Single entry point for creating groups, issuing, accepting and revoking invites, answering
//! membership queries and ingesting records received from other peers.
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::builder::{build_chain_to, build_chains};
use crate::cache::MembershipCache;
use crate::chain::{Chain, ChainError, verify};
use crate::clock::Clock;
use crate::config::Config;
use crate::encryption::Passthrough;
use crate::event::Event;
use crate::group::{Group, GroupId, GroupParams};
use crate::identity::{Ed25519Verifier, PrivateKey, PublicKey};
use crate::invite::Invite;
use crate::message::ChannelMessage;
use crate::record::Record;
use crate::revocation::Revocation;
use crate::store::GroupRecords;
use crate::traits::{Encryptor, Signer, Verifier};

/// Create and manage private groups and their members.
///
/// Holds every group definition, invite and revocation known to the local peer together with the
/// membership cache. All state sits behind one lock, every operation runs to completion before
/// the next one observes the state. Cloning a manager hands out another handle to the same state.
///
/// Records produced by local operations are returned to the caller for publication, records from
/// other peers are handed in through [`Manager::process`].
pub struct Manager<S = PrivateKey, V = Ed25519Verifier, E = Passthrough> {
    inner: Arc<RwLock<ManagerInner<S, V, E>>>,
}

struct ManagerInner<S, V, E> {
    signer: Option<S>,
    verifier: V,
    encryptor: E,
    config: Config,
    clock: Clock,
    groups: HashMap<GroupId, Group>,
    records: HashMap<GroupId, GroupRecords>,

    /// Our own verified chain per joined group.
    chains: HashMap<GroupId, Chain>,

    cache: MembershipCache,
}

impl<S, V, E> Clone for Manager<S, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Manager {
    /// Manager for an Ed25519 identity with default configuration and no content encryption.
    pub fn from_private_key(private_key: PrivateKey) -> Self {
        Self::new(private_key, Ed25519Verifier, Passthrough)
    }
}

impl<S, V, E> Manager<S, V, E>
where
    S: Signer,
    V: Verifier,
    E: Encryptor,
{
    pub fn new(signer: S, verifier: V, encryptor: E) -> Self {
        Self::new_with_config(Some(signer), &Config::default(), verifier, encryptor)
    }

    /// Manager with custom configuration.
    ///
    /// Without signer all write operations fail until [`Manager::set_signer`] was called.
    pub fn new_with_config(
        signer: Option<S>,
        config: &Config,
        verifier: V,
        encryptor: E,
    ) -> Self {
        let inner = ManagerInner {
            signer,
            verifier,
            encryptor,
            config: config.clone(),
            clock: Clock::default(),
            groups: HashMap::new(),
            records: HashMap::new(),
            chains: HashMap::new(),
            cache: MembershipCache::new(),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Configures the local signing identity.
    ///
    /// Membership of groups joined under a previous identity is dropped.
    pub async fn set_signer(&self, signer: S) {
        let mut inner = self.inner.write().await;
        if inner.me() != Some(signer.public_key()) {
            inner.chains.clear();
            let creator_chains: Vec<Chain> = inner
                .groups
                .values()
                .filter(|group| group.creator() == signer.public_key())
                .map(Chain::root)
                .collect();
            for chain in creator_chains {
                inner.chains.insert(chain.group_id(), chain);
            }
        }
        inner.signer = Some(signer);
    }

    /// Public key of the local identity, if configured.
    pub async fn id(&self) -> Option<PublicKey> {
        self.inner.read().await.me()
    }

    pub async fn config(&self) -> Config {
        self.inner.read().await.config.clone()
    }

    pub async fn group(&self, group_id: &GroupId) -> Option<Group> {
        self.inner.read().await.groups.get(group_id).cloned()
    }

    /// Returns true if we hold a verifying chain for the group.
    pub async fn is_joined(&self, group_id: &GroupId) -> bool {
        self.inner.read().await.chains.contains_key(group_id)
    }

    /// Our own chain in a joined group.
    pub async fn chain(&self, group_id: &GroupId) -> Option<Chain> {
        self.inner.read().await.chains.get(group_id).cloned()
    }

    /// Creates a new group with the local identity as its creator.
    ///
    /// The returned record needs to be published for other peers to learn about the group.
    pub async fn create_group(&self, params: GroupParams) -> Result<Group, ManagerError> {
        let mut inner = self.inner.write().await;
        inner.create_group(params)
    }

    /// Invites an identity into a group we are a member of.
    pub async fn issue_invite(
        &self,
        group_id: GroupId,
        invitee: PublicKey,
    ) -> Result<Invite, ManagerError> {
        let mut inner = self.inner.write().await;
        inner.issue_invite(group_id, invitee)
    }

    /// Joins a group through an invite addressed to us.
    ///
    /// The invite's chain must resolve and verify with the records known so far, otherwise
    /// nothing is joined and the invite is not stored.
    pub async fn accept_invite(&self, invite: &Invite) -> Result<(), ManagerError> {
        let mut inner = self.inner.write().await;
        inner.accept_invite(invite)
    }

    /// Revokes an identity and, with it, every chain passing through it.
    pub async fn revoke(
        &self,
        group_id: GroupId,
        target: PublicKey,
        reason: Option<String>,
    ) -> Result<Revocation, ManagerError> {
        let mut inner = self.inner.write().await;
        inner.revoke(group_id, target, reason)
    }

    /// Returns true if the identity holds a verifying chain in the group.
    ///
    /// Positive answers are cached until the next revocation in the group.
    pub async fn is_member(&self, identity: &PublicKey, group_id: &GroupId) -> bool {
        let mut inner = self.inner.write().await;
        inner.check_member(group_id, identity).is_some()
    }

    /// Creator and every invitee which is currently a member, in order of first invitation.
    pub async fn members(&self, group_id: &GroupId) -> Vec<PublicKey> {
        let mut inner = self.inner.write().await;
        inner.members(group_id)
    }

    /// Invites addressed to us for groups we have not joined yet.
    pub async fn pending_invites(&self) -> Vec<Invite> {
        let inner = self.inner.read().await;
        inner.pending_invites()
    }

    /// Encrypts and signs content for a channel of a group we are a member of.
    pub async fn send_message(
        &self,
        group_id: GroupId,
        channel: &str,
        content: &[u8],
    ) -> Result<ChannelMessage, ManagerError> {
        let mut inner = self.inner.write().await;
        inner.send_message(group_id, channel, content)
    }

    /// Ingests a record received from another peer.
    ///
    /// Invalid records are dropped, duplicates are ignored.
    pub async fn process(&self, record: &Record) -> Vec<Event> {
        let mut inner = self.inner.write().await;
        match record {
            Record::Group(group) => inner.on_group(group),
            Record::Invite(invite) => inner.on_invite(invite),
            Record::Revocation(revocation) => inner.on_revocation(revocation),
            Record::Message(message) => inner.on_message(message),
        }
    }

    /// Decodes and ingests a record in its wire encoding.
    pub async fn process_bytes(&self, bytes: &[u8]) -> Vec<Event> {
        match Record::from_bytes(bytes) {
            Ok(record) => self.process(&record).await,
            Err(err) => {
                warn!(%err, "dropping undecodable record");
                Vec::new()
            }
        }
    }
}

impl<S, V, E> ManagerInner<S, V, E>
where
    S: Signer,
    V: Verifier,
    E: Encryptor,
{
    fn me(&self) -> Option<PublicKey> {
        self.signer.as_ref().map(Signer::public_key)
    }

    fn signer(&self) -> Result<&S, ManagerError> {
        self.signer.as_ref().ok_or(ManagerError::SigningNotConfigured)
    }

    fn create_group(&mut self, params: GroupParams) -> Result<Group, ManagerError> {
        let creator = self.signer()?.public_key();
        let max_depth = params.max_depth.unwrap_or(self.config.default_max_depth);
        if max_depth == 0 {
            return Err(ManagerError::InvalidMaxDepth);
        }
        let is_private = params.is_private.unwrap_or(self.config.default_private);

        let created_at = self.clock.now();
        let group = Group::new(self.signer()?, created_at, max_depth, is_private, params);
        let group_id = group.id();

        self.records.entry(group_id).or_default();
        self.cache.seed_creator(group_id, creator);
        self.chains.insert(group_id, Chain::root(&group));
        self.groups.insert(group_id, group.clone());

        debug!(%group_id, max_depth, "created group");
        Ok(group)
    }

    fn issue_invite(
        &mut self,
        group_id: GroupId,
        invitee: PublicKey,
    ) -> Result<Invite, ManagerError> {
        self.signer()?;
        let max_depth = self
            .groups
            .get(&group_id)
            .map(Group::max_depth)
            .ok_or(ManagerError::GroupNotFound(group_id))?;

        let depth = self
            .refresh_own_chain(&group_id)
            .ok_or(ManagerError::NotAuthorizedToInvite(group_id))?;

        let new_depth = depth + 1;
        if new_depth > max_depth {
            return Err(ManagerError::ChainTooDeep(max_depth));
        }

        if self.is_revoked(&group_id, &invitee) {
            return Err(ManagerError::AlreadyRevoked(invitee));
        }

        let parent = self
            .chains
            .get(&group_id)
            .and_then(Chain::last)
            .map(Invite::id);
        let created_at = self.clock.now();
        let invite = Invite::new(
            self.signer()?,
            group_id,
            invitee,
            created_at,
            new_depth,
            parent,
        );

        self.add_invite(invite.clone());
        debug!(%group_id, %invitee, depth = new_depth, "issued invite");
        Ok(invite)
    }

    fn accept_invite(&mut self, invite: &Invite) -> Result<(), ManagerError> {
        let me = self.signer()?.public_key();
        if invite.invitee() != me {
            return Err(ManagerError::NotAuthorized(invite.invitee()));
        }

        if !invite.validate(&self.verifier) {
            return Err(ManagerError::InvalidSignature);
        }

        let group_id = invite.group_id();
        if !self.groups.contains_key(&group_id) {
            return Err(ManagerError::GroupNotFound(group_id));
        }

        // Nothing is stored unless the chain through this invite verifies.
        let (chain, depth) = {
            let (Some(group), Some(records)) =
                (self.groups.get(&group_id), self.records.get(&group_id))
            else {
                return Err(ManagerError::GroupNotFound(group_id));
            };

            let chain = build_chain_to(&records.invites, invite)?;
            let depth = verify(&chain, group, records.revocations.iter(), &self.verifier)?;
            (chain, depth)
        };

        self.add_invite(invite.clone());
        self.chains.insert(group_id, chain);
        self.cache.insert(group_id, me, depth);
        debug!(%group_id, depth, "accepted invite");
        Ok(())
    }

    fn revoke(
        &mut self,
        group_id: GroupId,
        target: PublicKey,
        reason: Option<String>,
    ) -> Result<Revocation, ManagerError> {
        let me = self.signer()?.public_key();
        if !self.groups.contains_key(&group_id) {
            return Err(ManagerError::GroupNotFound(group_id));
        }

        if self.is_revoked(&group_id, &target) {
            return Err(ManagerError::AlreadyRevoked(target));
        }

        if !self.may_revoke(&group_id, &me, &target) {
            return Err(ManagerError::NotAuthorizedToRevoke(target));
        }

        let created_at = self.clock.now();
        let revocation = Revocation::new(self.signer()?, group_id, target, created_at, reason);
        self.apply_revocation(revocation.clone());
        Ok(revocation)
    }

    fn members(&mut self, group_id: &GroupId) -> Vec<PublicKey> {
        let Some(creator) = self.groups.get(group_id).map(Group::creator) else {
            return Vec::new();
        };

        let invitees = self
            .records
            .get(group_id)
            .map(|records| records.invites.invitees())
            .unwrap_or_default();

        let mut members = vec![creator];
        for invitee in invitees {
            if invitee != creator && self.check_member(group_id, &invitee).is_some() {
                members.push(invitee);
            }
        }
        members
    }

    fn pending_invites(&self) -> Vec<Invite> {
        let Some(me) = self.me() else {
            return Vec::new();
        };

        let mut invites: Vec<Invite> = self
            .records
            .iter()
            .filter(|(group_id, _)| {
                self.groups.contains_key(group_id) && !self.chains.contains_key(group_id)
            })
            .filter(|(_, records)| !records.revocations.is_revoked(&me))
            .flat_map(|(_, records)| records.invites.naming(&me).cloned())
            .collect();
        invites.sort_by_key(Invite::created_at);
        invites
    }

    fn send_message(
        &mut self,
        group_id: GroupId,
        channel: &str,
        content: &[u8],
    ) -> Result<ChannelMessage, ManagerError> {
        self.signer()?;
        let group = self
            .groups
            .get(&group_id)
            .ok_or(ManagerError::GroupNotFound(group_id))?;
        if !group.has_channel(channel) {
            return Err(ManagerError::ChannelNotFound(channel.to_string()));
        }

        self.refresh_own_chain(&group_id)
            .ok_or(ManagerError::NotAMember(group_id))?;
        let chain = self
            .chains
            .get(&group_id)
            .ok_or(ManagerError::NotAMember(group_id))?;

        let ciphertext = self
            .encryptor
            .encrypt(content, &group_id, chain)
            .map_err(|err| ManagerError::Encryption(Box::new(err)))?;

        let created_at = self.clock.now();
        let message = ChannelMessage::new(
            self.signer()?,
            group_id,
            channel.to_string(),
            created_at,
            ciphertext,
        );
        self.records
            .entry(group_id)
            .or_default()
            .messages
            .insert(message.id());
        Ok(message)
    }

    fn on_group(&mut self, group: &Group) -> Vec<Event> {
        if !group.validate(&self.verifier) {
            warn!(group_id = %group.id(), "dropping invalid group");
            return Vec::new();
        }

        let group_id = group.id();
        if self.groups.contains_key(&group_id) {
            return Vec::new();
        }

        self.groups.insert(group_id, group.clone());
        self.records.entry(group_id).or_default();
        self.cache.seed_creator(group_id, group.creator());
        if self.me() == Some(group.creator()) {
            self.chains.insert(group_id, Chain::root(group));
        }
        debug!(%group_id, creator = %group.creator(), "received group");

        let mut events = vec![Event::GroupReceived(group.clone())];
        events.extend(self.retry_pending(&group_id));
        events
    }

    fn on_invite(&mut self, invite: &Invite) -> Vec<Event> {
        if !invite.validate(&self.verifier) {
            warn!(invite = %invite.id(), "dropping invalid invite");
            return Vec::new();
        }

        let Some(mut events) = self.add_invite(invite.clone()) else {
            return Vec::new();
        };

        trace!(invite = %invite.id(), invitee = %invite.invitee(), "received invite");
        events.insert(
            0,
            Event::InviteReceived {
                invite: invite.clone(),
                for_us: self.me() == Some(invite.invitee()),
            },
        );
        events
    }

    fn on_revocation(&mut self, revocation: &Revocation) -> Vec<Event> {
        if !revocation.validate(&self.verifier) {
            warn!(revocation = %revocation.id(), "dropping invalid revocation");
            return Vec::new();
        }

        let group_id = revocation.group_id();
        let id = revocation.id();
        if self.records.get(&group_id).is_some_and(|records| {
            records.revocations.contains(&id)
                || records
                    .pending_revocations
                    .iter()
                    .any(|pending| pending.id() == id)
        }) {
            return Vec::new();
        }

        if self.may_revoke(&group_id, &revocation.revoker(), &revocation.revoked()) {
            return self.apply_revocation(revocation.clone());
        }

        let parked = self
            .records
            .entry(group_id)
            .or_default()
            .park_revocation(revocation.clone());
        if parked {
            debug!(
                %group_id,
                revoker = %revocation.revoker(),
                revoked = %revocation.revoked(),
                "parking revocation without provable authority"
            );
        } else {
            warn!(
                %group_id,
                revoker = %revocation.revoker(),
                "dropping revocation, too many parked ones"
            );
        }
        Vec::new()
    }

    fn on_message(&mut self, message: &ChannelMessage) -> Vec<Event> {
        if !message.validate(&self.verifier) {
            warn!(message = %message.id(), "dropping invalid message");
            return Vec::new();
        }

        let group_id = message.group_id();
        let Some(group) = self.groups.get(&group_id) else {
            debug!(%group_id, "dropping message of unknown group");
            return Vec::new();
        };

        if !group.has_channel(message.channel()) {
            warn!(%group_id, channel = message.channel(), "dropping message of unknown channel");
            return Vec::new();
        }

        if self
            .records
            .get(&group_id)
            .is_some_and(|records| records.messages.contains(&message.id()))
        {
            return Vec::new();
        }

        if self.check_member(&group_id, &message.author()).is_none() {
            warn!(%group_id, author = %message.author(), "dropping message of non-member");
            return Vec::new();
        }

        let content =
            match self
                .encryptor
                .decrypt(message.ciphertext(), &group_id, &message.author())
            {
                Ok(content) => content,
                Err(err) => {
                    warn!(%group_id, %err, "could not decrypt message");
                    return Vec::new();
                }
            };

        self.records
            .entry(group_id)
            .or_default()
            .messages
            .insert(message.id());

        vec![Event::Message {
            group_id,
            channel: message.channel().to_string(),
            author: message.author(),
            created_at: message.created_at(),
            content,
        }]
    }

    /// Appends an invite and re-checks parked revocations of its group. Returns `None` if the
    /// invite was known already.
    fn add_invite(&mut self, invite: Invite) -> Option<Vec<Event>> {
        let group_id = invite.group_id();
        if !self.records.entry(group_id).or_default().invites.insert(invite) {
            return None;
        }
        Some(self.retry_pending(&group_id))
    }

    fn apply_revocation(&mut self, revocation: Revocation) -> Vec<Event> {
        let group_id = revocation.group_id();
        let Some(creator) = self.groups.get(&group_id).map(Group::creator) else {
            return Vec::new();
        };

        if !self
            .records
            .entry(group_id)
            .or_default()
            .revocations
            .insert(revocation.clone())
        {
            return Vec::new();
        }

        self.cache.invalidate(group_id, creator);
        debug!(%group_id, revoked = %revocation.revoked(), "applied revocation");

        let mut events = vec![Event::Revoked(revocation)];
        if self.chains.contains_key(&group_id) && self.refresh_own_chain(&group_id).is_none() {
            debug!(%group_id, "own chain no longer verifies, left group");
            events.push(Event::Left(group_id));
        }
        events
    }

    fn retry_pending(&mut self, group_id: &GroupId) -> Vec<Event> {
        let Some(records) = self.records.get_mut(group_id) else {
            return Vec::new();
        };
        if records.pending_revocations.is_empty() {
            return Vec::new();
        }

        let pending = std::mem::take(&mut records.pending_revocations);
        let mut events = Vec::new();
        for revocation in pending {
            if self.may_revoke(group_id, &revocation.revoker(), &revocation.revoked()) {
                events.extend(self.apply_revocation(revocation));
            } else {
                self.records
                    .entry(*group_id)
                    .or_default()
                    .pending_revocations
                    .push(revocation);
            }
        }
        events
    }

    /// The creator may revoke anyone but themselves, every other identity only those it is
    /// upstream of.
    fn may_revoke(&self, group_id: &GroupId, revoker: &PublicKey, revoked: &PublicKey) -> bool {
        let Some(group) = self.groups.get(group_id) else {
            return false;
        };

        if revoked == &group.creator() || revoker == revoked {
            return false;
        }

        revoker == &group.creator()
            || self
                .records
                .get(group_id)
                .is_some_and(|records| records.invites.is_upstream(group, revoker, revoked))
    }

    fn is_revoked(&self, group_id: &GroupId, identity: &PublicKey) -> bool {
        self.records
            .get(group_id)
            .is_some_and(|records| records.revocations.is_revoked(identity))
    }

    /// Verified depth of an identity, served from the cache or computed and cached on a miss.
    fn check_member(&mut self, group_id: &GroupId, identity: &PublicKey) -> Option<u32> {
        if let Some(depth) = self.cache.get(group_id, identity) {
            return Some(depth);
        }

        let (_, depth) = self.find_chain(group_id, identity)?;
        self.cache.insert(*group_id, *identity, depth);
        Some(depth)
    }

    /// First candidate chain of the identity which verifies.
    fn find_chain(&self, group_id: &GroupId, identity: &PublicKey) -> Option<(Chain, u32)> {
        let group = self.groups.get(group_id)?;
        if identity == &group.creator() {
            return Some((Chain::root(group), 0));
        }

        let records = self.records.get(group_id)?;
        build_chains(&records.invites, *group_id, identity)
            .into_iter()
            .find_map(
                |chain| match verify(&chain, group, records.revocations.iter(), &self.verifier) {
                    Ok(depth) => Some((chain, depth)),
                    Err(err) => {
                        trace!(%group_id, %identity, %err, "rejected candidate chain");
                        None
                    }
                },
            )
    }

    /// Re-verifies our own chain of a joined group and switches to another verifying chain if it
    /// broke. Returns our depth, `None` if we are not (or no longer) a member.
    fn refresh_own_chain(&mut self, group_id: &GroupId) -> Option<u32> {
        let me = self.me()?;
        {
            let chain = self.chains.get(group_id)?;
            let group = self.groups.get(group_id)?;
            let records = self.records.get(group_id)?;
            if let Ok(depth) = verify(chain, group, records.revocations.iter(), &self.verifier) {
                return Some(depth);
            }
        }

        match self.find_chain(group_id, &me) {
            Some((chain, depth)) => {
                self.chains.insert(*group_id, chain);
                Some(depth)
            }
            None => {
                self.chains.remove(group_id);
                None
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no signing identity configured")]
    SigningNotConfigured,

    #[error("unknown group {0}")]
    GroupNotFound(GroupId),

    #[error("invite would exceed maximum chain depth {0}")]
    ChainTooDeep(u32),

    #[error("not authorized to invite into group {0}")]
    NotAuthorizedToInvite(GroupId),

    #[error("invite is addressed to {0}")]
    NotAuthorized(PublicKey),

    #[error("not authorized to revoke {0}")]
    NotAuthorizedToRevoke(PublicKey),

    #[error("{0} was already revoked")]
    AlreadyRevoked(PublicKey),

    #[error("invalid invite chain: {0}")]
    InvalidChain(#[from] ChainError),

    #[error("invalid invite signature")]
    InvalidSignature,

    #[error("maximum chain depth needs to be at least 1")]
    InvalidMaxDepth,

    #[error("not a member of group {0}")]
    NotAMember(GroupId),

    #[error("group has no channel named {0}")]
    ChannelNotFound(String),

    #[error("could not encrypt message: {0}")]
    Encryption(Box<dyn std::error::Error + Send + Sync>),
}
