use crate::error::ConsensusError;
use turtledex_primitives::{Block, ChangeId, IndexedBlock};

/// Outcome of a successful block import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    /// The block is now the tip of the canonical chain.
    Imported {
        block: IndexedBlock,
        /// Changelog entry recording the move.
        change: ChangeId,
        /// Number of blocks removed from the canonical chain.
        reverted: usize,
        /// Number of blocks added to the canonical chain, this one included.
        applied: usize,
    },
    /// The block was stored on a fork that carries no more work than the canonical
    /// chain.
    SideChain(IndexedBlock),
}

impl ImportStatus {
    pub fn block(&self) -> IndexedBlock {
        match self {
            Self::Imported { block, .. } | Self::SideChain(block) => *block,
        }
    }

    pub fn is_reorg(&self) -> bool {
        matches!(self, Self::Imported { reverted, .. } if *reverted > 0)
    }
}

/// Something blocks can be imported into.
pub trait BlockImport: Send + Sync + 'static {
    fn import_block(&self, block: Block) -> Result<ImportStatus, ConsensusError>;
}
