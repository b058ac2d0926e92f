//! Error types for the ledger store.

use std::fmt;
use turtledex_primitives::{BlockId, Currency, EncodingError, Hash256};

/// Errors that can occur during ledger storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// RocksDB error.
    #[error("RocksDB error: {0}")]
    Rocksdb(#[from] rocksdb::Error),

    /// A stored value could not be decoded.
    #[error("Failed to decode value in column {column}: {source}")]
    Decode {
        column: &'static str,
        source: EncodingError,
    },

    /// Column family missing from the opened database.
    #[error("Column family {0} not found")]
    MissingColumnFamily(&'static str),

    /// A ledger invariant does not hold.
    #[error(transparent)]
    Fatal(#[from] FatalError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the store can no longer be trusted. A corrupt value counts as fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::Decode { .. })
    }
}

/// Kind of ledger object named in a [`FatalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    CoinOutput,
    FundOutput,
    FileContract,
    DelayedOutput,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CoinOutput => "coin output",
            Self::FundOutput => "fund output",
            Self::FileContract => "file contract",
            Self::DelayedOutput => "delayed output",
        };
        f.write_str(name)
    }
}

/// Violation of a ledger invariant.
///
/// These indicate a bug or a corrupted store rather than a bad block. Continuing
/// would desynchronize the node from the network, so the process must halt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalError {
    #[error("{kind} {id} already exists")]
    DuplicateObject { kind: ObjectKind, id: Hash256 },

    #[error("{kind} {id} does not exist")]
    MissingObject { kind: ObjectKind, id: Hash256 },

    #[error("{kind} {id} does not match the value recorded in its diff")]
    MismatchedObject { kind: ObjectKind, id: Hash256 },

    #[error("Fund pool is {actual}, diff expects {expected}")]
    FundPoolMismatch { expected: Currency, actual: Currency },

    #[error("Fund pool diff shrinks the pool from {previous} to {adjusted}")]
    NegativeFundPool {
        previous: Currency,
        adjusted: Currency,
    },

    #[error("Delayed output bucket at height {0} does not exist")]
    MissingBucket(u64),

    #[error("Delayed output bucket at height {0} already exists")]
    BucketExists(u64),

    #[error("Delayed output bucket at height {0} still holds outputs")]
    NonEmptyBucket(u64),

    #[error("Block {block} at height {height} is not a valid successor of tip {tip}")]
    InvalidSuccessor {
        block: BlockId,
        height: u64,
        tip: BlockId,
    },

    #[error("Block {0} is committed without generated diffs")]
    DiffsNotGenerated(BlockId),

    #[error("Foundation archive entry at height {0} already exists")]
    ArchiveExists(u64),

    #[error("Foundation archive entry at height {0} does not exist")]
    MissingArchive(u64),

    #[error("Block {0} is missing from the block index")]
    MissingBlock(BlockId),

    #[error("Consistency check failed: {0}")]
    Inconsistent(String),
}
