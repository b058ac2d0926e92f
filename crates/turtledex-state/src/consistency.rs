//! Whole-ledger consistency checks.
//!
//! These walk entire namespaces and are meant for tests, the `check` command and
//! debugging, not for the block processing hot path.

use crate::read::decode_value;
use crate::{Column, FatalError, LedgerRead, Result, meta_keys};
use turtledex_primitives::hash::HashWriter;
use turtledex_primitives::{CoinOutput, Currency, FileContract, FundOutput, Hash256};

/// Namespaces that make up the consensus state proper. The block index, the
/// changelog and the `synced` flag are bookkeeping and are left out.
const CHECKSUM_COLUMNS: [Column; 8] = [
    Column::Path,
    Column::CoinOutputs,
    Column::FundOutputs,
    Column::FileContracts,
    Column::ContractExpirations,
    Column::DelayedBuckets,
    Column::DelayedOutputs,
    Column::FoundationArchive,
];

fn inconsistent(message: String) -> crate::Error {
    FatalError::Inconsistent(message).into()
}

fn sum_values<S, T>(state: &S, column: Column, value: impl Fn(&T) -> Option<Currency>) -> Result<Currency>
where
    S: LedgerRead + ?Sized,
    T: turtledex_primitives::Decodable,
{
    let mut total = Currency::ZERO;
    for (_, bytes) in state.scan_prefix(column, &[])? {
        let item: T = decode_value(column, &bytes)?;
        total = value(&item)
            .and_then(|value| total.checked_add(value))
            .ok_or_else(|| inconsistent(format!("Overflow summing {}", column.name())))?;
    }
    Ok(total)
}

/// Outstanding claim liability of all fund outputs at the current fund pool.
pub fn claim_liability<S: LedgerRead + ?Sized>(state: &S) -> Result<Currency> {
    let pool = state.fund_pool();
    let fund_count = state.params().fund_count;
    sum_values(state, Column::FundOutputs, |output: &FundOutput| {
        pool.checked_sub(output.claim_start)?
            .checked_div(fund_count)?
            .checked_mul(output.value)
    })
}

/// Checks that every coin is accounted for.
///
/// Coin outputs, delayed outputs, the value locked in open contracts and the claim
/// liability must add up to the total supply at the current height.
pub fn check_conservation<S: LedgerRead + ?Sized>(state: &S) -> Result<()> {
    let coins = sum_values(state, Column::CoinOutputs, |output: &CoinOutput| {
        Some(output.value)
    })?;
    let delayed = sum_values(state, Column::DelayedOutputs, |output: &CoinOutput| {
        Some(output.value)
    })?;
    let contracts = sum_values(state, Column::FileContracts, FileContract::valid_proof_sum)?;
    let claims = claim_liability(state)?;

    let total = [delayed, contracts, claims]
        .into_iter()
        .try_fold(coins, Currency::checked_add)
        .ok_or_else(|| inconsistent("Overflow summing ledger value".to_string()))?;
    let expected = state.params().total_supply(state.height());

    if total != expected {
        return Err(inconsistent(format!(
            "Ledger holds {total} (coins: {coins}, delayed: {delayed}, contracts: {contracts}, \
             claims: {claims}), expected {expected} at height {}",
            state.height()
        )));
    }
    Ok(())
}

/// Checks that the fund outputs add up to the fixed fund supply.
pub fn check_fund_outputs<S: LedgerRead + ?Sized>(state: &S) -> Result<()> {
    let total = sum_values(state, Column::FundOutputs, |output: &FundOutput| {
        Some(output.value)
    })?;
    let expected = state.params().fund_count;
    if total != expected {
        return Err(inconsistent(format!(
            "Fund outputs sum to {total}, expected {expected}"
        )));
    }
    Ok(())
}

/// Checks that exactly the buckets in `(height, height + maturity_delay]` exist.
pub fn check_delayed_buckets<S: LedgerRead + ?Sized>(state: &S) -> Result<()> {
    let height = state.height();
    let expected = (height + 1..=height + state.params().maturity_delay).collect::<Vec<_>>();

    let present = state
        .scan_prefix(Column::DelayedBuckets, &[])?
        .into_iter()
        .map(|(key, _)| {
            <[u8; 8]>::try_from(key.as_slice())
                .map(u64::from_be_bytes)
                .map_err(|_| inconsistent(format!("Malformed bucket key of {} bytes", key.len())))
        })
        .collect::<Result<Vec<_>>>()?;

    if present != expected {
        return Err(inconsistent(format!(
            "Delayed buckets {present:?} at height {height}, expected {expected:?}"
        )));
    }
    Ok(())
}

/// Runs every consistency check.
pub fn check_all<S: LedgerRead + ?Sized>(state: &S) -> Result<()> {
    check_delayed_buckets(state)?;
    check_fund_outputs(state)?;
    check_conservation(state)
}

/// Digest over the consensus state.
///
/// Two ledgers have the same checksum exactly when they hold the same canonical
/// path, objects, delayed outputs, Foundation addresses and archive, height and
/// fund pool.
pub fn state_checksum<S: LedgerRead + ?Sized>(state: &S) -> Result<Hash256> {
    let mut hasher = HashWriter::new();

    for column in CHECKSUM_COLUMNS {
        hasher.encode(column.name().as_bytes());
        for (key, value) in state.scan_prefix(column, &[])? {
            hasher.encode(&key).encode(&value);
        }
    }

    let tip = state.chain_tip();
    hasher
        .encode(&tip.height)
        .encode(&tip.id)
        .encode(&tip.fund_pool)
        .encode(&state.get_raw(Column::Meta, meta_keys::FOUNDATION)?);

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LedgerStore;
    use turtledex_primitives::{ChainParams, CoinOutputDiff, CoinOutputId, DiffDirection, UnlockHash};

    #[test]
    fn test_genesis_is_consistent() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        check_all(&store).unwrap();
    }

    #[test]
    fn test_conservation_detects_minted_coins() {
        let (_dir, store) = LedgerStore::open_temp(ChainParams::testing()).unwrap();
        let before = state_checksum(&store).unwrap();

        let mut txn = store.begin();
        txn.commit_coin_output_diff(
            &CoinOutputDiff {
                direction: DiffDirection::Apply,
                id: CoinOutputId::from_byte_array([1; 32]),
                output: CoinOutput {
                    value: Currency::new(1),
                    unlock_hash: UnlockHash::default(),
                },
            },
            DiffDirection::Apply,
        )
        .unwrap();

        assert!(check_conservation(&txn).is_err());
        assert_ne!(state_checksum(&txn).unwrap(), before);
        assert_eq!(state_checksum(&store).unwrap(), before);
    }
}
