//! Consensus primitives of the TurtleDex ledger.
//!
//! Everything here is pure data: the transaction and block types, their
//! deterministic encoding, object ID derivation, Merkle trees, the diff records
//! produced by block processing and the chain parameters. Storage and validation
//! live in `turtledex-state` and `turtledex-consensus`.

pub mod arbitrary_data;
pub mod block;
pub mod chain_params;
pub mod currency;
pub mod diff;
pub mod encoding;
pub mod hash;
pub mod merkle;
pub mod specifier;
pub mod transaction;

pub use arbitrary_data::{ArbitraryData, FoundationUnlockHashUpdate};
pub use block::{Block, BlockHeader, Target, Work};
pub use chain_params::{ChainParams, MEDIAN_TIMESTAMP_WINDOW, testing_unlock_conditions};
pub use currency::Currency;
pub use diff::{
    CoinOutputDiff, DelayedOutputDiff, DiffDirection, DiffSet, FileContractDiff, FundOutputDiff,
    FundPoolDiff,
};
pub use encoding::{Decodable, Encodable, EncodingError};
pub use hash::{
    BlockId, ChangeId, CoinOutputId, FileContractId, FundOutputId, Hash256, TransactionId, UnlockHash,
};
pub use transaction::{
    CoinInput, CoinOutput, FileContract, FileContractRevision, FundInput, FundOutput,
    StorageProof, Transaction, TransactionSignature, UnlockConditions, UnlockKey,
};

/// A block together with its height on the chain it was processed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedBlock {
    pub height: u64,
    pub id: BlockId,
}

impl std::fmt::Display for IndexedBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{},{}", self.height, self.id)
    }
}
