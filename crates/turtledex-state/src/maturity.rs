//! Maturity Scheduler.
//!
//! Delayed outputs wait in one bucket per maturity height. The buckets for the
//! next `maturity_delay` heights always exist, so a diff can never target a
//! missing bucket regardless of the order diffs are applied within a block.
//! A bucket is deleted only once it is empty.

use crate::{Column, FatalError, LedgerRead, Result, StateTransaction, height_key};
use turtledex_primitives::{CoinOutputDiff, DelayedOutputDiff, DiffDirection, DiffSet};

impl StateTransaction<'_> {
    pub fn create_bucket(&mut self, height: u64) -> Result<()> {
        if self.bucket_exists(height)? {
            return Err(FatalError::BucketExists(height).into());
        }
        self.put_raw(Column::DelayedBuckets, height_key(height).to_vec(), Vec::new());
        Ok(())
    }

    pub fn delete_bucket(&mut self, height: u64) -> Result<()> {
        if !self.bucket_exists(height)? {
            return Err(FatalError::MissingBucket(height).into());
        }
        if !self.delayed_outputs_at(height)?.is_empty() {
            return Err(FatalError::NonEmptyBucket(height).into());
        }
        self.delete_raw(Column::DelayedBuckets, height_key(height).to_vec());
        Ok(())
    }

    /// Creates every missing bucket in `(height, height + maturity_delay]`.
    pub fn create_upcoming_buckets(&mut self, height: u64) -> Result<()> {
        let maturity_delay = self.params().maturity_delay;
        for bucket in height + 1..=height + maturity_delay {
            if !self.bucket_exists(bucket)? {
                self.create_bucket(bucket)?;
            }
        }
        Ok(())
    }

    /// Promotes every delayed output maturing at `height` into the coin output set.
    ///
    /// Each promotion is committed immediately and recorded in `diffs` as a coin
    /// output apply followed by a delayed output revert.
    pub fn apply_matured_outputs(&mut self, height: u64, diffs: &mut DiffSet) -> Result<()> {
        let matured = self.delayed_outputs_at(height)?;
        let count = matured.len();

        for (id, output) in matured {
            let coin_diff = CoinOutputDiff {
                direction: DiffDirection::Apply,
                id,
                output: output.clone(),
            };
            self.commit_coin_output_diff(&coin_diff, DiffDirection::Apply)?;
            diffs.coin_output_diffs.push(coin_diff);

            let delayed_diff = DelayedOutputDiff {
                direction: DiffDirection::Revert,
                id,
                output,
                maturity_height: height,
            };
            self.commit_delayed_output_diff(&delayed_diff, DiffDirection::Apply)?;
            diffs.delayed_output_diffs.push(delayed_diff);
        }

        if count > 0 {
            tracing::trace!("Matured {count} delayed outputs at height {height}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, LedgerStore};
    use turtledex_primitives::{ChainParams, CoinOutput, CoinOutputId, Currency, UnlockHash};

    fn delayed(seed: u8, maturity_height: u64) -> DelayedOutputDiff {
        DelayedOutputDiff {
            direction: DiffDirection::Apply,
            id: CoinOutputId::from_byte_array([seed; 32]),
            output: CoinOutput {
                value: Currency::new(u128::from(seed) + 1),
                unlock_hash: UnlockHash::default(),
            },
            maturity_height,
        }
    }

    #[test]
    fn test_genesis_buckets() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        assert!(!store.bucket_exists(0).unwrap());
        for height in 1..=3 {
            assert!(store.bucket_exists(height).unwrap());
        }
        assert!(!store.bucket_exists(4).unwrap());
    }

    #[test]
    fn test_bucket_lifecycle_checks() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let mut txn = store.begin();

        assert!(matches!(
            txn.create_bucket(2),
            Err(Error::Fatal(FatalError::BucketExists(2)))
        ));
        assert!(matches!(
            txn.delete_bucket(9),
            Err(Error::Fatal(FatalError::MissingBucket(9)))
        ));

        txn.commit_delayed_output_diff(&delayed(1, 2), DiffDirection::Apply)
            .unwrap();
        assert!(matches!(
            txn.delete_bucket(2),
            Err(Error::Fatal(FatalError::NonEmptyBucket(2)))
        ));
    }

    #[test]
    fn test_create_upcoming_buckets_fills_gaps() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let mut txn = store.begin();
        txn.create_upcoming_buckets(2).unwrap();
        for height in 1..=5 {
            assert!(txn.bucket_exists(height).unwrap());
        }
        assert!(!txn.bucket_exists(6).unwrap());
    }

    #[test]
    fn test_apply_matured_outputs() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let mut txn = store.begin();
        txn.commit_delayed_output_diff(&delayed(1, 3), DiffDirection::Apply)
            .unwrap();
        txn.commit_delayed_output_diff(&delayed(2, 3), DiffDirection::Apply)
            .unwrap();

        let mut diffs = DiffSet::default();
        txn.apply_matured_outputs(3, &mut diffs).unwrap();

        assert_eq!(diffs.coin_output_diffs.len(), 2);
        assert_eq!(diffs.delayed_output_diffs.len(), 2);
        assert!(txn.delayed_outputs_at(3).unwrap().is_empty());
        assert!(
            txn.coin_output(&CoinOutputId::from_byte_array([2; 32]))
                .unwrap()
                .is_some()
        );
        txn.delete_bucket(3).unwrap();
    }
}
