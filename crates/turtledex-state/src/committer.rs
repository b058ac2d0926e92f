//! Diff Committer.
//!
//! Applies or reverts individual diffs against a [`StateTransaction`] and replays
//! the full diff set of a processed block. A diff is committed "forward" when the
//! requested direction matches its own direction and inverted otherwise, so
//! `commit(d, Apply)` followed by `commit(d, Revert)` is always a no-op.
//!
//! Every mutation is checked against the current state. Inserting an object that
//! exists, removing one that is absent or removing one that differs from the value
//! recorded in the diff yields a [`FatalError`].

use crate::processed_block::ProcessedBlock;
use crate::{
    Column, FatalError, LedgerRead, ObjectKind, Result, StateTransaction, height_id_key,
};
use turtledex_primitives::encoding::{Encodable, serialize};
use turtledex_primitives::{
    CoinOutputDiff, DelayedOutputDiff, DiffDirection, FileContractDiff, FundOutputDiff,
    FundPoolDiff, Hash256,
};

impl StateTransaction<'_> {
    fn insert_object<T: Encodable>(
        &mut self,
        column: Column,
        kind: ObjectKind,
        id: &[u8; 32],
        key: Vec<u8>,
        value: &T,
    ) -> Result<()> {
        if self.get_raw(column, &key)?.is_some() {
            return Err(FatalError::DuplicateObject {
                kind,
                id: Hash256::from_byte_array(*id),
            }
            .into());
        }
        self.put(column, key, value);
        Ok(())
    }

    fn remove_object<T: Encodable>(
        &mut self,
        column: Column,
        kind: ObjectKind,
        id: &[u8; 32],
        key: Vec<u8>,
        expected: &T,
    ) -> Result<()> {
        let id = Hash256::from_byte_array(*id);
        let stored = self
            .get_raw(column, &key)?
            .ok_or(FatalError::MissingObject { kind, id })?;
        if stored != serialize(expected) {
            return Err(FatalError::MismatchedObject { kind, id }.into());
        }
        self.delete_raw(column, key);
        Ok(())
    }

    pub fn commit_coin_output_diff(
        &mut self,
        diff: &CoinOutputDiff,
        dir: DiffDirection,
    ) -> Result<()> {
        let id = diff.id.as_bytes();
        let key = id.to_vec();
        if diff.direction == dir {
            self.insert_object(Column::CoinOutputs, ObjectKind::CoinOutput, id, key, &diff.output)
        } else {
            self.remove_object(Column::CoinOutputs, ObjectKind::CoinOutput, id, key, &diff.output)
        }
    }

    pub fn commit_fund_output_diff(
        &mut self,
        diff: &FundOutputDiff,
        dir: DiffDirection,
    ) -> Result<()> {
        let id = diff.id.as_bytes();
        let key = id.to_vec();
        if diff.direction == dir {
            self.insert_object(Column::FundOutputs, ObjectKind::FundOutput, id, key, &diff.output)
        } else {
            self.remove_object(Column::FundOutputs, ObjectKind::FundOutput, id, key, &diff.output)
        }
    }

    /// Commits a contract diff and keeps the expiration index in step with it.
    pub fn commit_file_contract_diff(
        &mut self,
        diff: &FileContractDiff,
        dir: DiffDirection,
    ) -> Result<()> {
        let id = diff.id.as_bytes();
        let key = id.to_vec();
        let expiration_key = height_id_key(diff.contract.window_end, id);
        if diff.direction == dir {
            self.insert_object(
                Column::FileContracts,
                ObjectKind::FileContract,
                id,
                key,
                &diff.contract,
            )?;
            self.put_raw(Column::ContractExpirations, expiration_key, Vec::new());
        } else {
            self.remove_object(
                Column::FileContracts,
                ObjectKind::FileContract,
                id,
                key,
                &diff.contract,
            )?;
            self.delete_raw(Column::ContractExpirations, expiration_key);
        }
        Ok(())
    }

    pub fn commit_delayed_output_diff(
        &mut self,
        diff: &DelayedOutputDiff,
        dir: DiffDirection,
    ) -> Result<()> {
        if !self.bucket_exists(diff.maturity_height)? {
            return Err(FatalError::MissingBucket(diff.maturity_height).into());
        }
        let id = diff.id.as_bytes();
        let key = height_id_key(diff.maturity_height, id);
        if diff.direction == dir {
            self.insert_object(
                Column::DelayedOutputs,
                ObjectKind::DelayedOutput,
                id,
                key,
                &diff.output,
            )
        } else {
            self.remove_object(
                Column::DelayedOutputs,
                ObjectKind::DelayedOutput,
                id,
                key,
                &diff.output,
            )
        }
    }

    pub fn commit_fund_pool_diff(&mut self, diff: &FundPoolDiff, dir: DiffDirection) -> Result<()> {
        if diff.adjusted < diff.previous {
            return Err(FatalError::NegativeFundPool {
                previous: diff.previous,
                adjusted: diff.adjusted,
            }
            .into());
        }

        let (expected, new_pool) = if diff.direction == dir {
            (diff.previous, diff.adjusted)
        } else {
            (diff.adjusted, diff.previous)
        };

        let actual = self.fund_pool();
        if actual != expected {
            return Err(FatalError::FundPoolMismatch { expected, actual }.into());
        }
        self.set_fund_pool(new_pool);
        Ok(())
    }

    /// Applies or reverts every diff of `block`, moving the tip accordingly.
    ///
    /// On apply the block must extend the current tip, on revert it must be the
    /// current tip.
    pub fn commit_diff_set(&mut self, block: &ProcessedBlock, dir: DiffDirection) -> Result<()> {
        let id = block.id();
        if !block.diffs_generated {
            return Err(FatalError::DiffsNotGenerated(id).into());
        }

        let tip = self.chain_tip();
        let is_successor = match dir {
            DiffDirection::Apply => {
                block.parent_id() == tip.id && block.height == tip.height + 1
            }
            DiffDirection::Revert => id == tip.id && block.height == tip.height,
        };
        if !is_successor {
            return Err(FatalError::InvalidSuccessor {
                block: id,
                height: block.height,
                tip: tip.id,
            }
            .into());
        }

        match dir {
            DiffDirection::Apply => self.apply_diff_set(block)?,
            DiffDirection::Revert => self.revert_diff_set(block)?,
        }

        tracing::trace!(
            "Committed {} diffs of #{},{id} ({dir:?})",
            block.diffs.len(),
            block.height
        );

        Ok(())
    }

    fn apply_diff_set(&mut self, block: &ProcessedBlock) -> Result<()> {
        let height = block.height;
        let diffs = &block.diffs;
        let dir = DiffDirection::Apply;

        self.create_upcoming_buckets(height)?;

        for diff in &diffs.coin_output_diffs {
            self.commit_coin_output_diff(diff, dir)?;
        }
        for diff in &diffs.file_contract_diffs {
            self.commit_file_contract_diff(diff, dir)?;
        }
        for diff in &diffs.fund_output_diffs {
            self.commit_fund_output_diff(diff, dir)?;
        }
        for diff in &diffs.delayed_output_diffs {
            self.commit_delayed_output_diff(diff, dir)?;
        }
        for diff in &diffs.fund_pool_diffs {
            self.commit_fund_pool_diff(diff, dir)?;
        }

        if let Some(update) = &diffs.foundation_update {
            self.apply_foundation_update(height, update)?;
        }

        self.delete_bucket(height)?;
        self.push_path(height, block.id())
    }

    fn revert_diff_set(&mut self, block: &ProcessedBlock) -> Result<()> {
        let height = block.height;
        let diffs = &block.diffs;
        let dir = DiffDirection::Revert;

        self.create_bucket(height)?;

        if diffs.foundation_update.is_some() {
            self.revert_foundation_update(height)?;
        }

        for diff in diffs.fund_pool_diffs.iter().rev() {
            self.commit_fund_pool_diff(diff, dir)?;
        }
        for diff in diffs.delayed_output_diffs.iter().rev() {
            self.commit_delayed_output_diff(diff, dir)?;
        }
        for diff in diffs.fund_output_diffs.iter().rev() {
            self.commit_fund_output_diff(diff, dir)?;
        }
        for diff in diffs.file_contract_diffs.iter().rev() {
            self.commit_file_contract_diff(diff, dir)?;
        }
        for diff in diffs.coin_output_diffs.iter().rev() {
            self.commit_coin_output_diff(diff, dir)?;
        }

        self.delete_bucket(height + self.params().maturity_delay)?;
        self.pop_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, LedgerStore};
    use turtledex_primitives::{
        ChainParams, CoinOutput, CoinOutputId, Currency, FileContract, FileContractId, UnlockHash,
    };

    fn coin_diff(seed: u8, value: u128) -> CoinOutputDiff {
        CoinOutputDiff {
            direction: DiffDirection::Apply,
            id: CoinOutputId::from_byte_array([seed; 32]),
            output: CoinOutput {
                value: Currency::new(value),
                unlock_hash: UnlockHash::from_byte_array([seed; 32]),
            },
        }
    }

    fn fatal(result: Result<()>) -> FatalError {
        match result {
            Err(Error::Fatal(err)) => err,
            other => panic!("Expected a fatal error, got {other:?}"),
        }
    }

    #[test]
    fn test_double_apply_is_fatal() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let mut txn = store.begin();
        let diff = coin_diff(9, 100);

        txn.commit_coin_output_diff(&diff, DiffDirection::Apply).unwrap();
        assert!(matches!(
            fatal(txn.commit_coin_output_diff(&diff, DiffDirection::Apply)),
            FatalError::DuplicateObject {
                kind: ObjectKind::CoinOutput,
                ..
            }
        ));
    }

    #[test]
    fn test_revert_of_missing_object_is_fatal() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let mut txn = store.begin();
        assert!(matches!(
            fatal(txn.commit_coin_output_diff(&coin_diff(9, 100), DiffDirection::Revert)),
            FatalError::MissingObject { .. }
        ));
    }

    #[test]
    fn test_revert_with_different_value_is_fatal() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let mut txn = store.begin();
        txn.commit_coin_output_diff(&coin_diff(9, 100), DiffDirection::Apply)
            .unwrap();
        assert!(matches!(
            fatal(txn.commit_coin_output_diff(&coin_diff(9, 101), DiffDirection::Revert)),
            FatalError::MismatchedObject { .. }
        ));
    }

    #[test]
    fn test_contract_diff_maintains_expiration_index() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let mut txn = store.begin();
        let diff = FileContractDiff {
            direction: DiffDirection::Apply,
            id: FileContractId::from_byte_array([4; 32]),
            contract: FileContract {
                window_start: 10,
                window_end: 20,
                ..Default::default()
            },
        };

        txn.commit_file_contract_diff(&diff, DiffDirection::Apply).unwrap();
        assert_eq!(txn.contracts_expiring_at(20).unwrap(), vec![diff.id]);

        txn.commit_file_contract_diff(&diff, DiffDirection::Revert).unwrap();
        assert!(txn.contracts_expiring_at(20).unwrap().is_empty());
        assert!(txn.file_contract(&diff.id).unwrap().is_none());
    }

    #[test]
    fn test_delayed_output_requires_bucket() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let mut txn = store.begin();
        let coin = coin_diff(3, 5);
        let diff = DelayedOutputDiff {
            direction: DiffDirection::Apply,
            id: coin.id,
            output: coin.output,
            maturity_height: 50,
        };
        assert_eq!(
            fatal(txn.commit_delayed_output_diff(&diff, DiffDirection::Apply)),
            FatalError::MissingBucket(50)
        );
    }

    #[test]
    fn test_fund_pool_diff_checks() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let mut txn = store.begin();
        let diff = FundPoolDiff {
            direction: DiffDirection::Apply,
            previous: Currency::ZERO,
            adjusted: Currency::new(10_000),
        };

        txn.commit_fund_pool_diff(&diff, DiffDirection::Apply).unwrap();
        assert_eq!(txn.fund_pool(), Currency::new(10_000));

        // Applying again finds the pool at `adjusted`, not `previous`.
        assert!(matches!(
            fatal(txn.commit_fund_pool_diff(&diff, DiffDirection::Apply)),
            FatalError::FundPoolMismatch { .. }
        ));

        txn.commit_fund_pool_diff(&diff, DiffDirection::Revert).unwrap();
        assert_eq!(txn.fund_pool(), Currency::ZERO);

        let shrinking = FundPoolDiff {
            direction: DiffDirection::Apply,
            previous: Currency::new(10_000),
            adjusted: Currency::ZERO,
        };
        assert!(matches!(
            fatal(txn.commit_fund_pool_diff(&shrinking, DiffDirection::Revert)),
            FatalError::NegativeFundPool { .. }
        ));
    }

    #[test]
    fn test_diff_set_requires_generated_diffs() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let genesis = store
            .processed_block(&store.chain_tip().id)
            .unwrap()
            .unwrap();
        let mut child = genesis.clone();
        child.block.parent_id = genesis.id();
        child.height = 1;
        child.diffs_generated = false;

        let mut txn = store.begin();
        assert!(matches!(
            fatal(txn.commit_diff_set(&child, DiffDirection::Apply)),
            FatalError::DiffsNotGenerated(_)
        ));

        // The genesis block is not a successor of itself.
        assert!(matches!(
            fatal(txn.commit_diff_set(&genesis, DiffDirection::Apply)),
            FatalError::InvalidSuccessor { .. }
        ));
    }
}
