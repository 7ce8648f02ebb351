// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::group::GroupId;
use crate::hash::Hash;
use crate::identity::{PublicKey, Signature};
use crate::record::RecordId;
use crate::traits::{Signer, Verifier};

/// Application message posted into a named channel of a group.
///
/// Content is encrypted by the configured encryptor before it is signed, receivers only decrypt
/// messages of authors which are members at the time of processing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub(crate) id: RecordId,
    pub(crate) group_id: GroupId,
    pub(crate) channel: String,
    pub(crate) author: PublicKey,
    pub(crate) created_at: Timestamp,
    #[serde(with = "serde_bytes")]
    pub(crate) ciphertext: Vec<u8>,
    pub(crate) signature: Signature,
}

impl ChannelMessage {
    pub(crate) fn new<S: Signer>(
        signer: &S,
        group_id: GroupId,
        channel: String,
        created_at: Timestamp,
        ciphertext: Vec<u8>,
    ) -> Self {
        let author = signer.public_key();
        let id = Self::derive_id(&group_id, &channel, &author, created_at);
        let bytes = Self::signable_bytes(&group_id, &channel, &author, created_at, &ciphertext);
        Self {
            id,
            group_id,
            channel,
            author,
            created_at,
            ciphertext,
            signature: signer.sign(&bytes),
        }
    }

    fn derive_id(
        group_id: &GroupId,
        channel: &str,
        author: &PublicKey,
        created_at: Timestamp,
    ) -> RecordId {
        Hash::from_parts(&[
            group_id.as_bytes(),
            author.as_bytes(),
            &created_at.to_be_bytes(),
            channel.as_bytes(),
        ])
        .into()
    }

    fn signable_bytes(
        group_id: &GroupId,
        channel: &str,
        author: &PublicKey,
        created_at: Timestamp,
        ciphertext: &[u8],
    ) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32 * 2 + 8 + 8 + channel.len() + ciphertext.len());
        bytes.extend_from_slice(group_id.as_bytes());
        bytes.extend_from_slice(author.as_bytes());
        bytes.extend_from_slice(&created_at.to_be_bytes());
        // Length prefix keeps channel name and ciphertext apart.
        bytes.extend_from_slice(&(channel.len() as u64).to_be_bytes());
        bytes.extend_from_slice(channel.as_bytes());
        bytes.extend_from_slice(ciphertext);
        bytes
    }

    pub fn validate<V: Verifier>(&self, verifier: &V) -> bool {
        let bytes = Self::signable_bytes(
            &self.group_id,
            &self.channel,
            &self.author,
            self.created_at,
            &self.ciphertext,
        );
        self.id == Self::derive_id(&self.group_id, &self.channel, &self.author, self.created_at)
            && verifier.verify(&self.author, &bytes, &self.signature)
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn author(&self) -> PublicKey {
        self.author
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

#[cfg(test)]
mod tests {
    use crate::group::GroupId;
    use crate::identity::{Ed25519Verifier, PrivateKey};

    use super::ChannelMessage;

    #[test]
    fn tampering_breaks_signature() {
        let author = PrivateKey::from_bytes(&[4; 32]);
        let group_id = GroupId::derive(&author.public_key(), 1);
        let message =
            ChannelMessage::new(&author, group_id, "stage".into(), 10, b"lineup".to_vec());
        assert!(message.validate(&Ed25519Verifier));

        let mut tampered = message.clone();
        tampered.ciphertext = b"lineups".to_vec();
        assert!(!tampered.validate(&Ed25519Verifier));

        let mut moved = message;
        moved.channel = "backstage".into();
        assert!(!moved.validate(&Ed25519Verifier));
    }
}
