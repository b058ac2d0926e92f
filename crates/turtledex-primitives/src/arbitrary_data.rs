//! Recognized payloads inside a transaction's arbitrary data.

use crate::encoding::{EncodingError, deserialize, serialize};
use crate::hash::UnlockHash;
use crate::impl_consensus_encoding;
use crate::specifier::{SPECIFIER_FOUNDATION, SPECIFIER_LEN};

/// Rotates the addresses that receive the Foundation subsidy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundationUnlockHashUpdate {
    pub new_primary: UnlockHash,
    pub new_failsafe: UnlockHash,
}

impl_consensus_encoding!(FoundationUnlockHashUpdate, new_primary, new_failsafe);

const FOUNDATION_UPDATE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbitraryData {
    /// Data without a recognized specifier, inert as far as consensus is concerned.
    Unknown,
    FoundationUpdate(FoundationUnlockHashUpdate),
}

impl ArbitraryData {
    /// Classifies one arbitrary data item by its specifier prefix.
    ///
    /// A Foundation-prefixed item must carry exactly one encoded update.
    pub fn decode(data: &[u8]) -> Result<Self, EncodingError> {
        let Some(payload) = data.strip_prefix(SPECIFIER_FOUNDATION.as_bytes().as_slice()) else {
            return Ok(Self::Unknown);
        };
        if payload.len() != FOUNDATION_UPDATE_LEN {
            return Err(EncodingError::InvalidArbitraryData(
                "foundation update payload must be exactly two unlock hashes",
            ));
        }
        Ok(Self::FoundationUpdate(deserialize(payload)?))
    }

    pub fn encode_foundation_update(update: &FoundationUnlockHashUpdate) -> Vec<u8> {
        let mut data = Vec::with_capacity(SPECIFIER_LEN + FOUNDATION_UPDATE_LEN);
        data.extend_from_slice(SPECIFIER_FOUNDATION.as_bytes());
        data.extend(serialize(update));
        data
    }
}
