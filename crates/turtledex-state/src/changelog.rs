use crate::foundation::FoundationAddresses;
use crate::{Column, LedgerRead, Result, StateTransaction, height_key, meta_keys};
use turtledex_primitives::encoding::serialize;
use turtledex_primitives::hash::HashWriter;
use turtledex_primitives::{BlockId, ChangeId, Currency, impl_consensus_encoding};

/// One persisted consensus change: the blocks a single block acceptance removed
/// from and added to the canonical chain, and the scalars it left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    /// Blocks removed from the canonical chain, highest first.
    pub reverted_blocks: Vec<BlockId>,
    /// Blocks added to the canonical chain, lowest first.
    pub applied_blocks: Vec<BlockId>,
    /// Fund pool after the change.
    pub fund_pool: Currency,
    /// Foundation addresses after the change.
    pub foundation: FoundationAddresses,
}

impl_consensus_encoding!(
    ChangeEntry,
    reverted_blocks,
    applied_blocks,
    fund_pool,
    foundation
);

impl ChangeEntry {
    /// Identifier of the change, committing to the reverted and applied blocks.
    pub fn id(&self) -> ChangeId {
        let mut writer = HashWriter::new();
        writer
            .encode(&self.reverted_blocks)
            .encode(&self.applied_blocks);
        writer.finalize().into()
    }
}

impl StateTransaction<'_> {
    /// Appends a change to the changelog, snapshotting the current fund pool and
    /// Foundation addresses. Returns the sequence number and the entry.
    pub fn append_change(
        &mut self,
        reverted_blocks: Vec<BlockId>,
        applied_blocks: Vec<BlockId>,
    ) -> Result<(u64, ChangeEntry)> {
        let entry = ChangeEntry {
            reverted_blocks,
            applied_blocks,
            fund_pool: self.fund_pool(),
            foundation: self.foundation_unlock_hashes()?,
        };
        let seq = self.change_count()?;
        self.put_raw(Column::Changelog, height_key(seq).to_vec(), serialize(&entry));
        self.put_raw(Column::ChangeIds, entry.id().as_bytes().to_vec(), serialize(&seq));
        self.put_raw(Column::Meta, meta_keys::CHANGELOG_LEN.to_vec(), serialize(&(seq + 1)));
        Ok((seq, entry))
    }
}

#[cfg(test)]
mod tests {
    use crate::{LedgerRead, LedgerStore};
    use turtledex_primitives::ChainParams;

    #[test]
    fn test_genesis_is_first_change() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let entry = store.change_entry(0).unwrap().unwrap();
        assert!(entry.reverted_blocks.is_empty());
        assert_eq!(entry.applied_blocks, vec![store.chain_tip().id]);
        assert_eq!(store.change_seq(&entry.id()).unwrap(), Some(0));
        assert_eq!(
            entry.foundation.primary,
            store.params().initial_foundation_unlock_hash
        );
    }
}
