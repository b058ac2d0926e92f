use turtledex_consensus::{BlockImportError, ConsensusError};
use turtledex_primitives::{BlockId, EncodingError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Node CLI error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error(transparent)]
    Import(#[from] BlockImportError),
    #[error("Failed to decode block #{index} of the input: {source}")]
    Decode {
        index: usize,
        #[source]
        source: EncodingError,
    },
    #[error("Block {block} was rejected: {source}")]
    Rejected {
        block: BlockId,
        #[source]
        source: BlockImportError,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid range: --from {from} is above --to {to}")]
    InvalidRange { from: u64, to: u64 },
    #[error("Ledger is inconsistent: {0}")]
    Inconsistent(String),
    #[error("Block import worker stopped unexpectedly")]
    ImportWorkerStopped,
}

impl Error {
    /// Whether the ledger may be corrupted and the process must not continue.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Consensus(err) => err.is_fatal(),
            Self::Import(err) | Self::Rejected { source: err, .. } => err.is_fatal(),
            _ => false,
        }
    }
}
