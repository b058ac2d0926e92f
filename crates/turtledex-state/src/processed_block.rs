use turtledex_primitives::{Block, BlockId, DiffSet, Target, Work, impl_consensus_encoding};

/// A block as tracked by the block index, together with the diffs it produced.
///
/// Stored as soon as the block is accepted into the index. `diffs` is filled in
/// exactly once, the first time the block is applied to the canonical chain, and
/// replayed verbatim on every later revert or re-apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedBlock {
    pub block: Block,
    pub height: u64,
    /// Cumulative work of the chain ending in this block.
    pub depth: Work,
    /// Target the next block must meet.
    pub child_target: Target,
    pub diffs_generated: bool,
    pub diffs: DiffSet,
}

impl_consensus_encoding!(
    ProcessedBlock,
    block,
    height,
    depth,
    child_target,
    diffs_generated,
    diffs
);

impl ProcessedBlock {
    pub fn id(&self) -> BlockId {
        self.block.id()
    }

    pub fn parent_id(&self) -> BlockId {
        self.block.parent_id
    }

    /// Whether the chain ending in this block carries more work than `other`.
    pub fn heavier_than(&self, other: &ProcessedBlock) -> bool {
        self.depth > other.depth
    }
}
