// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manager coupled with a transport.
//!
//! Every local action publishes the record it produced. Received records are pulled from
//! subscriptions and handed to the manager with [`Node::sync`].
use std::fmt::Debug;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::encryption::Passthrough;
use crate::event::Event;
use crate::group::{Group, GroupId, GroupParams};
use crate::identity::{Ed25519Verifier, PrivateKey, PublicKey};
use crate::invite::Invite;
use crate::manager::{Manager, ManagerError};
use crate::message::ChannelMessage;
use crate::record::{Filter, Record};
use crate::revocation::Revocation;
use crate::traits::{Encryptor, Signer, Transport, Verifier};

pub type Subscription = mpsc::UnboundedReceiver<Record>;

pub struct Node<T, S = PrivateKey, V = Ed25519Verifier, E = Passthrough> {
    manager: Manager<S, V, E>,
    transport: T,
}

impl<T, S, V, E> Node<T, S, V, E>
where
    T: Transport,
    S: Signer,
    V: Verifier,
    E: Encryptor,
{
    pub fn new(manager: Manager<S, V, E>, transport: T) -> Self {
        Self { manager, transport }
    }

    pub fn manager(&self) -> &Manager<S, V, E> {
        &self.manager
    }

    pub async fn create_group(&self, params: GroupParams) -> Result<Group, NodeError> {
        let group = self.manager.create_group(params).await?;
        self.publish(group.clone().into()).await?;
        Ok(group)
    }

    pub async fn issue_invite(
        &self,
        group_id: GroupId,
        invitee: PublicKey,
    ) -> Result<Invite, NodeError> {
        let invite = self.manager.issue_invite(group_id, invitee).await?;
        self.publish(invite.clone().into()).await?;
        Ok(invite)
    }

    /// Accepts an invite, nothing is published since the inviter did so already.
    pub async fn accept_invite(&self, invite: &Invite) -> Result<(), NodeError> {
        Ok(self.manager.accept_invite(invite).await?)
    }

    pub async fn revoke(
        &self,
        group_id: GroupId,
        target: PublicKey,
        reason: Option<String>,
    ) -> Result<Revocation, NodeError> {
        let revocation = self.manager.revoke(group_id, target, reason).await?;
        self.publish(revocation.clone().into()).await?;
        Ok(revocation)
    }

    pub async fn send_message(
        &self,
        group_id: GroupId,
        channel: &str,
        content: &[u8],
    ) -> Result<ChannelMessage, NodeError> {
        let message = self
            .manager
            .send_message(group_id, channel, content)
            .await?;
        self.publish(message.clone().into()).await?;
        Ok(message)
    }

    /// Subscribes to all records of a group.
    pub async fn subscribe_group(&self, group_id: GroupId) -> Result<Subscription, NodeError> {
        self.subscribe(Filter::group(group_id)).await
    }

    /// Subscribes to invites addressed to the local identity.
    pub async fn subscribe_invites(&self) -> Result<Subscription, NodeError> {
        let me = self
            .manager
            .id()
            .await
            .ok_or(ManagerError::SigningNotConfigured)?;
        self.subscribe(Filter::invites_for(me)).await
    }

    pub async fn subscribe(&self, filter: Filter) -> Result<Subscription, NodeError> {
        self.transport
            .subscribe(filter)
            .await
            .map_err(|err| NodeError::Transport(format!("{err:?}")))
    }

    /// Processes every record currently waiting in the subscription.
    pub async fn sync(&self, subscription: &mut Subscription) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(record) = subscription.try_recv() {
            events.extend(self.manager.process(&record).await);
        }
        events
    }

    async fn publish(&self, record: Record) -> Result<(), NodeError> {
        debug!(kind = ?record.kind(), group_id = %record.group_id(), "publish record");
        self.transport
            .publish(&record)
            .await
            .map_err(|err| NodeError::Transport(format!("{err:?}")))
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error("transport error: {0}")]
    Transport(String),
}
