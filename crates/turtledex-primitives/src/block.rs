use crate::currency::Currency;
use crate::encoding::{Decodable, Encodable, EncodingError, read_array, serialize};
use crate::hash::{BlockId, Hash256, hash_encodable};
use crate::impl_consensus_encoding;
use crate::merkle::merkle_root;
use crate::transaction::{CoinOutput, Transaction};
use primitive_types::U256;
use std::fmt;
use std::io::{self, Read, Write};

/// Accumulated proof of work.
pub type Work = U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub parent_id: BlockId,
    pub nonce: [u8; 8],
    pub timestamp: u64,
    pub merkle_root: Hash256,
}

impl_consensus_encoding!(BlockHeader, parent_id, nonce, timestamp, merkle_root);

impl BlockHeader {
    pub fn id(&self) -> BlockId {
        hash_encodable(self).into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub parent_id: BlockId,
    pub nonce: [u8; 8],
    pub timestamp: u64,
    pub miner_payouts: Vec<CoinOutput>,
    pub transactions: Vec<Transaction>,
}

impl_consensus_encoding!(
    Block,
    parent_id,
    nonce,
    timestamp,
    miner_payouts,
    transactions
);

impl Block {
    /// Merkle root committing to the miner payouts followed by the transactions.
    pub fn merkle_root(&self) -> Hash256 {
        let leaves: Vec<Vec<u8>> = self
            .miner_payouts
            .iter()
            .map(serialize)
            .chain(self.transactions.iter().map(serialize))
            .collect();
        merkle_root(&leaves)
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            parent_id: self.parent_id,
            nonce: self.nonce,
            timestamp: self.timestamp,
            merkle_root: self.merkle_root(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.header().id()
    }

    pub fn miner_payout_sum(&self) -> Option<Currency> {
        Currency::checked_sum(self.miner_payouts.iter().map(|payout| payout.value))
    }

    /// Sum of the miner fees of every transaction in the block.
    pub fn miner_fee_sum(&self) -> Option<Currency> {
        self.transactions
            .iter()
            .try_fold(Currency::ZERO, |acc, tx| acc.checked_add(tx.miner_fee_sum()?))
    }
}

/// Proof-of-work target. A block ID meets the target when it is numerically no
/// greater than it, comparing both as big-endian integers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target(pub [u8; 32]);

impl Target {
    pub fn is_met_by(&self, id: &BlockId) -> bool {
        id.0 <= self.0
    }

    /// Expected number of hashes needed to find a block meeting this target.
    pub fn work(&self) -> Work {
        let target = U256::from_big_endian(&self.0);
        if target.is_zero() {
            return U256::MAX;
        }
        U256::MAX / target
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({})", hex::encode(self.0))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl serde::Serialize for Target {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Encodable for Target {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        self.0.consensus_encode(writer)
    }
}

impl Decodable for Target {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        Ok(Self(read_array(reader)?))
    }
}

impl Encodable for U256 {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        let mut bytes = [0u8; 32];
        self.to_big_endian(&mut bytes);
        bytes.consensus_encode(writer)
    }
}

impl Decodable for U256 {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        let bytes: [u8; 32] = read_array(reader)?;
        Ok(U256::from_big_endian(&bytes))
    }
}
