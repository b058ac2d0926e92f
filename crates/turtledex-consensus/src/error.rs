use crate::verification::{HeaderError, TxError};
use turtledex_primitives::{BlockId, ChangeId, TransactionId};

/// Why a block failed validation.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("Transaction #{index} ({txid}) is invalid: {source}")]
    Transaction {
        index: usize,
        txid: TransactionId,
        source: TxError,
    },
}

/// Consensus error type.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Block {0} is already known")]
    BlockKnown(BlockId),
    #[error("Block {0} or one of its ancestors is known to be invalid")]
    KnownBad(BlockId),
    #[error("Block {0} has an unknown parent")]
    Orphan(BlockId),
    #[error("Block {block} is invalid: {source}")]
    InvalidBlock {
        block: BlockId,
        #[source]
        source: BlockError,
    },
    #[error("Change {0} is not in the changelog")]
    UnknownChange(ChangeId),
    #[error("Consensus set has shut down")]
    Shutdown,
    #[error("Storage error: {0}")]
    Storage(#[source] turtledex_state::Error),
    /// The ledger is corrupted or the consensus code is broken. The process must
    /// stop.
    #[error("Fatal consensus error: {0}")]
    Fatal(#[source] turtledex_state::Error),
}

impl ConsensusError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Whether the error condemns the block itself, as opposed to our knowledge of it.
    pub fn is_invalid_block(&self) -> bool {
        matches!(self, Self::InvalidBlock { .. })
    }
}

impl From<turtledex_state::Error> for ConsensusError {
    fn from(err: turtledex_state::Error) -> Self {
        if err.is_fatal() {
            Self::Fatal(err)
        } else {
            Self::Storage(err)
        }
    }
}
