//! RocksDB-backed ledger store.

use crate::overlay::StateTransaction;
use crate::read::{ChainTip, decode_value};
use crate::{Column, Error, LedgerRead, Result, genesis, meta_keys};
use parking_lot::RwLock;
use rocksdb::{BlockBasedOptions, ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::collections::BTreeMap;
use std::path::Path;
use turtledex_primitives::encoding::serialize;
use turtledex_primitives::{BlockId, ChainParams, Currency};

/// The committed ledger.
///
/// Owns the database handle and a cached copy of the chain tip. Readers see the
/// state as of the last [`StateTransaction::commit`]; the only writer is the
/// consensus set, which stages its changes in a [`StateTransaction`].
pub struct LedgerStore {
    db: DB,
    params: ChainParams,
    tip: RwLock<ChainTip>,
}

impl LedgerStore {
    /// Opens the ledger at `path`, seeding the genesis state if the store is new.
    pub fn open(path: &Path, params: ChainParams) -> Result<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(64 * 1024 * 1024);
        db_opts.set_max_write_buffer_number(4);
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        db_opts.set_block_based_table_factory(&block_opts);

        let cf_descriptors = Column::ALL
            .iter()
            .map(|column| ColumnFamilyDescriptor::new(column.name(), Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let tip = Self::load_tip(&db)?;
        let store = Self {
            db,
            params,
            tip: RwLock::new(tip.unwrap_or_default()),
        };

        match tip {
            Some(tip) => {
                tracing::info!(
                    "Opened {} ledger at #{},{}, fund pool: {}",
                    store.params.name,
                    tip.height,
                    tip.id,
                    tip.fund_pool
                );
            }
            None => {
                let tip = genesis::initialize(&store)?;
                tracing::info!(
                    "Initialized {} ledger with genesis block {}",
                    store.params.name,
                    tip.id
                );
            }
        }

        Ok(store)
    }

    /// Opens a store in a fresh temporary directory. The directory lives as long as
    /// the returned guard.
    #[cfg(test)]
    pub(crate) fn open_temp(params: ChainParams) -> Result<(tempfile::TempDir, Self)> {
        let temp_dir = tempfile::tempdir()?;
        let store = Self::open(temp_dir.path(), params)?;
        Ok((temp_dir, store))
    }

    /// Starts staging a batch of mutations.
    pub fn begin(&self) -> StateTransaction<'_> {
        StateTransaction::new(self)
    }

    fn load_tip(db: &DB) -> Result<Option<ChainTip>> {
        let meta = cf_handle(db, Column::Meta)?;
        let Some(height) = db.get_cf(meta, meta_keys::HEIGHT)? else {
            return Ok(None);
        };
        let height: u64 = decode_value(Column::Meta, &height)?;

        let fund_pool: Currency = match db.get_cf(meta, meta_keys::FUND_POOL)? {
            Some(bytes) => decode_value(Column::Meta, &bytes)?,
            None => Currency::ZERO,
        };

        let path = cf_handle(db, Column::Path)?;
        let id: BlockId = db
            .get_cf(path, crate::height_key(height))?
            .map(|bytes| decode_value(Column::Path, &bytes))
            .transpose()?
            .ok_or_else(|| {
                crate::FatalError::Inconsistent(format!("Canonical path has no tip at {height}"))
            })?;

        Ok(Some(ChainTip {
            height,
            id,
            fund_pool,
        }))
    }

    fn cf(&self, column: Column) -> Result<&ColumnFamily> {
        cf_handle(&self.db, column)
    }

    /// Writes staged changes and the new tip in one batch.
    pub(crate) fn write_changes(
        &self,
        changes: BTreeMap<(Column, Vec<u8>), Option<Vec<u8>>>,
        tip: ChainTip,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        let num_changes = changes.len();

        for ((column, key), value) in changes {
            let cf = self.cf(column)?;
            match value {
                Some(value) => batch.put_cf(cf, key, value),
                None => batch.delete_cf(cf, key),
            }
        }

        let meta = self.cf(Column::Meta)?;
        batch.put_cf(meta, meta_keys::HEIGHT, serialize(&tip.height));
        batch.put_cf(meta, meta_keys::FUND_POOL, serialize(&tip.fund_pool));

        // Readers must not see the new tip before the batch lands, nor the old
        // tip after it.
        let mut cached_tip = self.tip.write();
        self.db.write(batch)?;
        *cached_tip = tip;

        tracing::trace!("Committed {num_changes} changes, tip: #{},{}", tip.height, tip.id);

        Ok(())
    }
}

impl LedgerStore {
    /// Whether `key` is committed in `column`, without copying its value.
    pub(crate) fn contains_key(&self, column: Column, key: &[u8]) -> Result<bool> {
        Ok(self.db.get_pinned_cf(self.cf(column)?, key)?.is_some())
    }
}

impl LedgerRead for LedgerStore {
    fn params(&self) -> &ChainParams {
        &self.params
    }

    fn chain_tip(&self) -> ChainTip {
        *self.tip.read()
    }

    fn get_raw(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get_cf(self.cf(column)?, key)?)
    }

    fn count(&self, column: Column) -> Result<u64> {
        let mut iter = self.db.raw_iterator_cf(self.cf(column)?);
        iter.seek_to_first();

        let mut count = 0;
        while iter.valid() {
            count += 1;
            iter.next();
        }
        iter.status()?;

        Ok(count)
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut iter = self.db.raw_iterator_cf(self.cf(column)?);
        iter.seek(prefix);

        let mut entries = Vec::new();
        while iter.valid() {
            match (iter.key(), iter.value()) {
                (Some(key), Some(value)) if key.starts_with(prefix) => {
                    entries.push((key.to_vec(), value.to_vec()));
                }
                _ => break,
            }
            iter.next();
        }
        iter.status()?;

        Ok(entries)
    }
}

fn cf_handle(db: &DB, column: Column) -> Result<&ColumnFamily> {
    db.cf_handle(column.name())
        .ok_or(Error::MissingColumnFamily(column.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use turtledex_primitives::CoinOutputId;

    #[test]
    fn test_reopen_preserves_tip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let genesis = {
            let store = LedgerStore::open(temp_dir.path(), ChainParams::testing()).unwrap();
            store.chain_tip()
        };
        let store = LedgerStore::open(temp_dir.path(), ChainParams::testing()).unwrap();
        assert_eq!(store.chain_tip(), genesis);
        assert_eq!(store.height(), 0);
        assert_eq!(store.change_count().unwrap(), 1);
    }

    #[test]
    fn test_dropped_transaction_discards_changes() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let before = store.count(Column::CoinOutputs).unwrap();
        {
            let mut txn = store.begin();
            txn.put_raw(Column::CoinOutputs, vec![7; 32], vec![]);
            assert_eq!(txn.count(Column::CoinOutputs).unwrap(), before + 1);
        }
        assert_eq!(store.count(Column::CoinOutputs).unwrap(), before);
        assert!(
            store
                .coin_output(&CoinOutputId::from_byte_array([7; 32]))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_scan_prefix_merges_overlay() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let mut txn = store.begin();
        txn.put_raw(Column::DelayedOutputs, crate::height_id_key(9, &[2; 32]), vec![2]);
        txn.put_raw(Column::DelayedOutputs, crate::height_id_key(9, &[1; 32]), vec![1]);
        txn.put_raw(Column::DelayedOutputs, crate::height_id_key(10, &[0; 32]), vec![0]);
        txn.commit().unwrap();

        let mut txn = store.begin();
        txn.delete_raw(Column::DelayedOutputs, crate::height_id_key(9, &[1; 32]));
        txn.put_raw(Column::DelayedOutputs, crate::height_id_key(9, &[3; 32]), vec![3]);

        let values = txn
            .scan_prefix(Column::DelayedOutputs, &crate::height_key(9))
            .unwrap()
            .into_iter()
            .map(|(_, value)| value)
            .collect::<Vec<_>>();
        assert_eq!(values, vec![vec![2], vec![3]]);
    }

    #[test]
    fn test_count_merges_overlay() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let mut txn = store.begin();
        txn.put_raw(Column::FileContracts, vec![1; 32], vec![1]);
        txn.put_raw(Column::FileContracts, vec![2; 32], vec![2]);
        txn.commit().unwrap();
        assert_eq!(store.count(Column::FileContracts).unwrap(), 2);

        let mut txn = store.begin();
        // Overwriting a committed key does not add an entry.
        txn.put_raw(Column::FileContracts, vec![1; 32], vec![9]);
        txn.delete_raw(Column::FileContracts, vec![2; 32]);
        txn.put_raw(Column::FileContracts, vec![3; 32], vec![3]);
        txn.put_raw(Column::FileContracts, vec![4; 32], vec![4]);
        // Deleting a key that was never committed removes nothing.
        txn.delete_raw(Column::FileContracts, vec![4; 32]);
        txn.delete_raw(Column::FileContracts, vec![5; 32]);
        assert_eq!(txn.count(Column::FileContracts).unwrap(), 2);
        assert_eq!(
            txn.count(Column::FileContracts).unwrap(),
            txn.scan_prefix(Column::FileContracts, &[]).unwrap().len() as u64
        );
        assert_eq!(store.count(Column::FileContracts).unwrap(), 2);
    }
}
