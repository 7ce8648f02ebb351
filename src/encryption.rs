// SPDX-License-Identifier: MIT OR Apache-2.0

use std::convert::Infallible;

use crate::chain::Chain;
use crate::group::GroupId;
use crate::identity::PublicKey;
use crate::traits::Encryptor;

/// Encryptor which leaves content untouched.
///
/// Channel messages are still signed and membership gated, but readable by anyone receiving
/// them.
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

impl Encryptor for Passthrough {
    type Error = Infallible;

    fn encrypt(
        &self,
        content: &[u8],
        _group_id: &GroupId,
        _sender_chain: &Chain,
    ) -> Result<Vec<u8>, Self::Error> {
        Ok(content.to_vec())
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        _group_id: &GroupId,
        _sender: &PublicKey,
    ) -> Result<Vec<u8>, Self::Error> {
        Ok(ciphertext.to_vec())
    }
}
