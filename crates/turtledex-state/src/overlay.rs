use crate::processed_block::ProcessedBlock;
use crate::read::ChainTip;
use crate::{Column, FatalError, LedgerRead, LedgerStore, Result, height_key};
use std::collections::BTreeMap;
use std::ops::Bound;
use turtledex_primitives::encoding::{Encodable, serialize};
use turtledex_primitives::{BlockId, ChainParams, Currency};

/// Staged mutations of the ledger, layered over the committed store.
///
/// All block processing runs against a `StateTransaction`. Nothing reaches the
/// database until [`StateTransaction::commit`], which writes every staged change in
/// one batch. Dropping the transaction discards the changes.
pub struct StateTransaction<'a> {
    store: &'a LedgerStore,
    changes: BTreeMap<(Column, Vec<u8>), Option<Vec<u8>>>,
    tip: ChainTip,
}

impl<'a> StateTransaction<'a> {
    pub(crate) fn new(store: &'a LedgerStore) -> Self {
        Self {
            store,
            changes: BTreeMap::new(),
            tip: store.chain_tip(),
        }
    }

    /// Number of staged key writes.
    pub fn pending_writes(&self) -> usize {
        self.changes.len()
    }

    pub(crate) fn put_raw(&mut self, column: Column, key: Vec<u8>, value: Vec<u8>) {
        self.changes.insert((column, key), Some(value));
    }

    pub(crate) fn put<T: Encodable + ?Sized>(&mut self, column: Column, key: Vec<u8>, value: &T) {
        self.put_raw(column, key, serialize(value));
    }

    pub(crate) fn delete_raw(&mut self, column: Column, key: Vec<u8>) {
        self.changes.insert((column, key), None);
    }

    pub(crate) fn set_fund_pool(&mut self, fund_pool: Currency) {
        self.tip.fund_pool = fund_pool;
    }

    /// Stores `block` in the block index, replacing any earlier copy.
    pub fn put_processed_block(&mut self, block: &ProcessedBlock) {
        self.put(Column::Blocks, block.id().as_bytes().to_vec(), block);
    }

    /// Extends the canonical path with `id` at `height`.
    pub fn push_path(&mut self, height: u64, id: BlockId) -> Result<()> {
        if height != self.tip.height + 1 {
            return Err(FatalError::InvalidSuccessor {
                block: id,
                height,
                tip: self.tip.id,
            }
            .into());
        }
        self.put(Column::Path, height_key(height).to_vec(), &id);
        self.tip.height = height;
        self.tip.id = id;
        Ok(())
    }

    /// Removes the tip from the canonical path.
    pub(crate) fn pop_path(&mut self) -> Result<()> {
        let height = self.tip.height;
        let parent_height = height.checked_sub(1).ok_or_else(|| {
            FatalError::Inconsistent("Attempted to revert the genesis block".to_string())
        })?;
        let parent = self.block_id_at(parent_height)?.ok_or_else(|| {
            FatalError::Inconsistent(format!("Canonical path has no entry at {parent_height}"))
        })?;
        self.delete_raw(Column::Path, height_key(height).to_vec());
        self.tip.height = parent_height;
        self.tip.id = parent;
        Ok(())
    }

    /// Seeds the path with the genesis block.
    pub(crate) fn set_genesis_path(&mut self, id: BlockId) {
        self.put(Column::Path, height_key(0).to_vec(), &id);
        self.tip = ChainTip {
            height: 0,
            id,
            fund_pool: Currency::ZERO,
        };
    }

    pub fn set_synced(&mut self, synced: bool) {
        self.put(Column::Meta, crate::meta_keys::SYNCED.to_vec(), &synced);
    }

    /// Writes all staged changes atomically and publishes the new tip.
    pub fn commit(self) -> Result<ChainTip> {
        let Self {
            store,
            changes,
            tip,
        } = self;
        store.write_changes(changes, tip)?;
        Ok(tip)
    }
}

impl LedgerRead for StateTransaction<'_> {
    fn params(&self) -> &ChainParams {
        self.store.params()
    }

    fn chain_tip(&self) -> ChainTip {
        self.tip
    }

    fn get_raw(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.changes.get(&(column, key.to_vec())) {
            Some(staged) => Ok(staged.clone()),
            None => self.store.get_raw(column, key),
        }
    }

    fn count(&self, column: Column) -> Result<u64> {
        let mut count = self.store.count(column)?;

        let start = Bound::Included((column, Vec::new()));
        let staged = self
            .changes
            .range((start, Bound::Unbounded))
            .take_while(|((col, _), _)| *col == column);

        for ((_, key), value) in staged {
            match (self.store.contains_key(column, key)?, value.is_some()) {
                (false, true) => count += 1,
                (true, false) => count -= 1,
                _ => {}
            }
        }

        Ok(count)
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.store.scan_prefix(column, prefix)?.into_iter().collect();

        let start = Bound::Included((column, prefix.to_vec()));
        let staged = self
            .changes
            .range((start, Bound::Unbounded))
            .take_while(|((col, key), _)| *col == column && key.starts_with(prefix));

        for ((_, key), value) in staged {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }
}
