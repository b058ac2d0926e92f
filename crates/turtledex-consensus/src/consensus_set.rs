//! Fork Resolver.
//!
//! [`ConsensusSet`] owns the ledger and is its only writer. Every accepted block is
//! stored in the block index; a block whose chain carries more work than the
//! canonical one moves the tip, reverting to the common ancestor and applying the
//! new branch inside a single [`StateTransaction`]. Either the whole move lands or,
//! on an invalid block, none of it does.

use crate::block_import::{BlockImport, ImportStatus};
use crate::diff_generator::generate_and_apply_diff;
use crate::error::{BlockError, ConsensusError};
use crate::notifier::{ChangeNotifier, ConsensusChange, ResumePoint, SubscriptionId};
use crate::verification::{HeaderError, HeaderVerifier, TxError, storage_proof_segment};
use futures::channel::mpsc::UnboundedReceiver;
use parking_lot::Mutex;
use schnellru::{ByLength, LruMap};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use turtledex_primitives::{
    Block, BlockId, ChainParams, CoinOutput, CoinOutputId, Currency, DiffDirection, FileContract,
    FileContractId, FundOutput, FundOutputId, Hash256, IndexedBlock, MEDIAN_TIMESTAMP_WINDOW,
    Target,
};
use turtledex_state::{
    Column, FatalError, FoundationAddresses, LedgerRead, LedgerStore, ProcessedBlock,
    StateTransaction, consistency,
};

/// Maximum number of invalid blocks remembered by the writer lane.
const BAD_BLOCK_CACHE_SIZE: u32 = 4096;

/// State guarded by the writer lane.
struct WriterLane {
    /// Recently seen blocks known to be invalid, together with the blocks built on
    /// them. Invalid blocks are never stored, so a forgotten one is simply verified
    /// again.
    bad_blocks: LruMap<BlockId, (), ByLength>,
}

impl WriterLane {
    fn new(bad_block_capacity: u32) -> Self {
        Self {
            bad_blocks: LruMap::new(ByLength::new(bad_block_capacity)),
        }
    }

    fn is_bad(&mut self, id: &BlockId) -> bool {
        self.bad_blocks.get(id).is_some()
    }

    fn mark_bad(&mut self, id: BlockId) {
        self.bad_blocks.insert(id, ());
    }
}

/// The consensus set: block index, canonical chain and ledger.
pub struct ConsensusSet {
    store: LedgerStore,
    header_verifier: HeaderVerifier,
    writer: Mutex<WriterLane>,
    notifier: ChangeNotifier,
}

impl ConsensusSet {
    /// Opens the ledger at `path`, seeding the genesis block if it is empty.
    pub fn new(path: &Path, params: ChainParams) -> Result<Self, ConsensusError> {
        let header_verifier = HeaderVerifier::new(params.clone());
        let store = LedgerStore::open(path, params)?;
        Ok(Self {
            store,
            header_verifier,
            writer: Mutex::new(WriterLane::new(BAD_BLOCK_CACHE_SIZE)),
            notifier: ChangeNotifier::default(),
        })
    }

    pub fn params(&self) -> &ChainParams {
        self.store.params()
    }

    /// Read access to the committed ledger.
    pub fn ledger(&self) -> &LedgerStore {
        &self.store
    }

    /// Validates `block` and adds it to the block index, moving the canonical chain
    /// if the block extends the heaviest known chain.
    pub fn accept_block(&self, block: Block) -> Result<ImportStatus, ConsensusError> {
        let mut lane = self.writer.lock();
        let result = self.accept_block_inner(&mut lane, block);

        if let Err(err) = &result {
            if err.is_fatal() {
                tracing::error!("{err}");
            } else if err.is_invalid_block() {
                tracing::warn!("{err}");
            }
        }

        result
    }

    fn accept_block_inner(
        &self,
        lane: &mut WriterLane,
        block: Block,
    ) -> Result<ImportStatus, ConsensusError> {
        let id = block.id();

        if self.store.processed_block(&id)?.is_some() {
            return Err(ConsensusError::BlockKnown(id));
        }
        if lane.is_bad(&id) {
            return Err(ConsensusError::KnownBad(id));
        }
        if lane.is_bad(&block.parent_id) {
            lane.mark_bad(id);
            return Err(ConsensusError::KnownBad(id));
        }
        let parent = self
            .store
            .processed_block(&block.parent_id)?
            .ok_or(ConsensusError::Orphan(id))?;

        let prev_timestamps = self.prev_timestamps(&parent)?;
        if let Err(err) =
            self.header_verifier
                .verify_header(&block, &parent, &prev_timestamps, unix_time())
        {
            // A block from the future may become valid later.
            if !matches!(err, HeaderError::TooFarInFuture { .. }) {
                lane.mark_bad(id);
            }
            return Err(ConsensusError::InvalidBlock {
                block: id,
                source: BlockError::Header(err),
            });
        }

        let processed = ProcessedBlock {
            block,
            height: parent.height + 1,
            depth: parent.depth.saturating_add(parent.child_target.work()),
            // Difficulty does not adjust.
            child_target: self.params().root_target,
            diffs_generated: false,
            diffs: Default::default(),
        };
        let indexed = IndexedBlock {
            height: processed.height,
            id,
        };

        let mut txn = self.store.begin();
        txn.put_processed_block(&processed);

        let tip = self.current_processed_block()?;
        if !processed.heavier_than(&tip) {
            txn.commit()?;
            tracing::debug!("Stored side chain block {indexed}");
            return Ok(ImportStatus::SideChain(indexed));
        }

        let (reverted, applied) = match reorg(&mut txn, processed) {
            Ok(moved) => moved,
            Err(ReorgError { error, bad_blocks }) => {
                for bad in bad_blocks {
                    lane.mark_bad(bad);
                }
                return Err(error);
            }
        };

        let reverted_count = reverted.len();
        let applied_count = applied.len();
        let (seq, entry) = txn.append_change(reverted, applied)?;
        let change_id = entry.id();

        // Debug builds audit every transition before it lands.
        if cfg!(debug_assertions) {
            consistency::check_all(&txn)?;
        }
        let new_tip = txn.commit()?;

        if reverted_count > 0 {
            tracing::info!(
                "Reorganized to #{},{} (reverted {reverted_count}, applied {applied_count})",
                new_tip.height,
                new_tip.id
            );
        } else {
            tracing::info!(
                "Imported #{},{}, fund pool: {}",
                new_tip.height,
                new_tip.id,
                new_tip.fund_pool
            );
        }

        let change = ConsensusChange::from_entry(&self.store, seq, entry)?;
        self.notifier.notify(&change);

        Ok(ImportStatus::Imported {
            block: indexed,
            change: change_id,
            reverted: reverted_count,
            applied: applied_count,
        })
    }

    /// Timestamps of `parent` and its ancestors, most recent first.
    fn prev_timestamps(&self, parent: &ProcessedBlock) -> Result<Vec<u64>, ConsensusError> {
        let mut timestamps = Vec::with_capacity(MEDIAN_TIMESTAMP_WINDOW);
        timestamps.push(parent.block.timestamp);

        let mut current = parent.parent_id();
        while timestamps.len() < MEDIAN_TIMESTAMP_WINDOW {
            let Some(ancestor) = self.store.processed_block(&current)? else {
                break;
            };
            timestamps.push(ancestor.block.timestamp);
            if ancestor.height == 0 {
                break;
            }
            current = ancestor.parent_id();
        }

        Ok(timestamps)
    }

    fn current_processed_block(&self) -> Result<ProcessedBlock, ConsensusError> {
        let tip = self.store.chain_tip().id;
        Ok(self
            .store
            .processed_block(&tip)?
            .ok_or_else(|| turtledex_state::Error::from(FatalError::MissingBlock(tip)))?)
    }

    /// Subscribes to consensus changes, replaying the backlog selected by `resume`.
    pub fn subscribe(
        &self,
        resume: ResumePoint,
    ) -> Result<(SubscriptionId, UnboundedReceiver<ConsensusChange>), ConsensusError> {
        // Hold the writer lane so no change lands between replay and registration.
        let _lane = self.writer.lock();
        self.notifier.subscribe(&self.store, resume)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.notifier.unsubscribe(id);
    }

    pub fn set_synced(&self, synced: bool) -> Result<(), ConsensusError> {
        let _lane = self.writer.lock();
        let mut txn = self.store.begin();
        txn.set_synced(synced);
        txn.commit()?;
        Ok(())
    }

    pub fn synced(&self) -> Result<bool, ConsensusError> {
        Ok(self.store.synced()?)
    }

    pub fn height(&self) -> u64 {
        self.store.height()
    }

    pub fn tip(&self) -> IndexedBlock {
        let tip = self.store.chain_tip();
        IndexedBlock {
            height: tip.height,
            id: tip.id,
        }
    }

    /// The canonical block at `height`, if the chain is that long.
    pub fn block_at_height(&self, height: u64) -> Result<Option<Block>, ConsensusError> {
        let Some(id) = self.store.block_id_at(height)? else {
            return Ok(None);
        };
        let block = self
            .store
            .processed_block(&id)?
            .ok_or_else(|| turtledex_state::Error::from(FatalError::MissingBlock(id)))?;
        Ok(Some(block.block))
    }

    pub fn current_block(&self) -> Result<Block, ConsensusError> {
        Ok(self.current_processed_block()?.block)
    }

    /// Target a child of `parent` must meet, if `parent` is known.
    pub fn child_target(&self, parent: &BlockId) -> Result<Option<Target>, ConsensusError> {
        Ok(self
            .store
            .processed_block(parent)?
            .map(|block| block.child_target))
    }

    /// Whether `id` is in the block index, on the canonical chain or not.
    pub fn contains_block(&self, id: &BlockId) -> Result<bool, ConsensusError> {
        Ok(self.store.get_raw(Column::Blocks, id.as_bytes())?.is_some())
    }

    pub fn coin_output(&self, id: &CoinOutputId) -> Result<Option<CoinOutput>, ConsensusError> {
        Ok(self.store.coin_output(id)?)
    }

    pub fn fund_output(&self, id: &FundOutputId) -> Result<Option<FundOutput>, ConsensusError> {
        Ok(self.store.fund_output(id)?)
    }

    pub fn file_contract(
        &self,
        id: &FileContractId,
    ) -> Result<Option<FileContract>, ConsensusError> {
        Ok(self.store.file_contract(id)?)
    }

    pub fn fund_pool(&self) -> Currency {
        self.store.fund_pool()
    }

    pub fn foundation_unlock_hashes(&self) -> Result<FoundationAddresses, ConsensusError> {
        Ok(self.store.foundation_unlock_hashes()?)
    }

    /// Segment index a storage proof for contract `id` must prove.
    pub fn storage_proof_segment(&self, id: &FileContractId) -> Result<u64, TxError> {
        storage_proof_segment(&self.store, id)
    }

    pub fn coin_output_count(&self) -> Result<u64, ConsensusError> {
        Ok(self.store.count(Column::CoinOutputs)?)
    }

    pub fn fund_output_count(&self) -> Result<u64, ConsensusError> {
        Ok(self.store.count(Column::FundOutputs)?)
    }

    pub fn file_contract_count(&self) -> Result<u64, ConsensusError> {
        Ok(self.store.count(Column::FileContracts)?)
    }

    pub fn change_count(&self) -> Result<u64, ConsensusError> {
        Ok(self.store.change_count()?)
    }

    /// Runs every ledger consistency check against the committed state.
    pub fn check_consistency(&self) -> Result<(), ConsensusError> {
        let _lane = self.writer.lock();
        Ok(consistency::check_all(&self.store)?)
    }

    /// Digest of the committed consensus state.
    pub fn state_checksum(&self) -> Result<Hash256, ConsensusError> {
        let _lane = self.writer.lock();
        Ok(consistency::state_checksum(&self.store)?)
    }
}

impl BlockImport for ConsensusSet {
    fn import_block(&self, block: Block) -> Result<ImportStatus, ConsensusError> {
        self.accept_block(block)
    }
}

struct ReorgError {
    error: ConsensusError,
    /// Blocks condemned by the failure: the invalid block and its descendants on
    /// the branch being applied.
    bad_blocks: Vec<BlockId>,
}

impl From<ConsensusError> for ReorgError {
    fn from(error: ConsensusError) -> Self {
        Self {
            error,
            bad_blocks: Vec::new(),
        }
    }
}

impl From<turtledex_state::Error> for ReorgError {
    fn from(error: turtledex_state::Error) -> Self {
        ConsensusError::from(error).into()
    }
}

/// Moves the tip of `txn` to `new_tip`.
///
/// Returns the reverted block IDs, highest first, and the applied ones, lowest
/// first.
fn reorg(
    txn: &mut StateTransaction<'_>,
    new_tip: ProcessedBlock,
) -> Result<(Vec<BlockId>, Vec<BlockId>), ReorgError> {
    // Walk back from the new tip until we meet the canonical chain.
    let mut branch = Vec::new();
    let mut current = new_tip;
    while txn.block_id_at(current.height)? != Some(current.id()) {
        let parent_id = current.parent_id();
        let parent = txn
            .processed_block(&parent_id)?
            .ok_or_else(|| turtledex_state::Error::from(FatalError::MissingBlock(parent_id)))?;
        branch.push(current);
        current = parent;
    }
    let fork_height = current.height;
    branch.reverse();

    let mut reverted = Vec::new();
    while txn.height() > fork_height {
        let tip_id = txn.chain_tip().id;
        let block = txn
            .processed_block(&tip_id)?
            .ok_or_else(|| turtledex_state::Error::from(FatalError::MissingBlock(tip_id)))?;
        txn.commit_diff_set(&block, DiffDirection::Revert)?;
        reverted.push(tip_id);
    }

    let mut applied = Vec::with_capacity(branch.len());
    for index in 0..branch.len() {
        let block = &mut branch[index];
        let result = if block.diffs_generated {
            txn.commit_diff_set(block, DiffDirection::Apply)
                .map_err(ConsensusError::from)
        } else {
            generate_and_apply_diff(txn, block).map(|()| txn.put_processed_block(block))
        };

        if let Err(error) = result {
            let bad_blocks = if error.is_invalid_block() {
                branch[index..].iter().map(ProcessedBlock::id).collect()
            } else {
                Vec::new()
            };
            return Err(ReorgError { error, bad_blocks });
        }
        applied.push(branch[index].id());
    }

    Ok((reverted, applied))
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_id(byte: u8) -> BlockId {
        BlockId::from_byte_array([byte; 32])
    }

    #[test]
    fn test_bad_blocks_are_bounded() {
        let mut lane = WriterLane::new(2);
        lane.mark_bad(block_id(1));
        lane.mark_bad(block_id(2));

        // A lookup refreshes the entry, so the next insertion evicts block 2.
        assert!(lane.is_bad(&block_id(1)));
        lane.mark_bad(block_id(3));

        assert_eq!(lane.bad_blocks.len(), 2);
        assert!(lane.is_bad(&block_id(1)));
        assert!(!lane.is_bad(&block_id(2)));
        assert!(lane.is_bad(&block_id(3)));
    }
}
