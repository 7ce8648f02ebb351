// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces to the capabilities this crate consumes but does not implement itself: signing,
//! signature verification, content encryption and record transport.
use std::error::Error;
use std::fmt::Debug;

use tokio::sync::mpsc;

use crate::chain::Chain;
use crate::group::GroupId;
use crate::identity::{PublicKey, Signature};
use crate::record::{Filter, Record};

/// Local signing identity.
pub trait Signer {
    /// Public key of the local peer.
    fn public_key(&self) -> PublicKey;

    fn sign(&self, bytes: &[u8]) -> Signature;
}

/// Checks signatures of remote peers.
pub trait Verifier {
    fn verify(&self, public_key: &PublicKey, bytes: &[u8], signature: &Signature) -> bool;
}

/// Encrypts and decrypts channel message content of a group.
///
/// The sender's chain is handed in on encryption so schemes can derive key material from the
/// sender's position in the delegation tree.
pub trait Encryptor {
    type Error: Error + Send + Sync + 'static;

    fn encrypt(
        &self,
        content: &[u8],
        group_id: &GroupId,
        sender_chain: &Chain,
    ) -> Result<Vec<u8>, Self::Error>;

    fn decrypt(
        &self,
        ciphertext: &[u8],
        group_id: &GroupId,
        sender: &PublicKey,
    ) -> Result<Vec<u8>, Self::Error>;
}

/// Publish / subscribe delivery of records between peers.
///
/// Delivery is at-least-once and unordered, receivers deduplicate by record id.
pub trait Transport {
    type Error: Debug;

    fn publish(&self, record: &Record) -> impl Future<Output = Result<(), Self::Error>>;

    fn subscribe(
        &self,
        filter: Filter,
    ) -> impl Future<Output = Result<mpsc::UnboundedReceiver<Record>, Self::Error>>;
}
