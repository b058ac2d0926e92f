//! Foundation hardfork handling.
//!
//! From the hardfork height on, a transaction may rotate the addresses that receive
//! the Foundation subsidy by carrying a Foundation-prefixed arbitrary data item. The
//! update is recorded in the block's diff set so that replays and reverts restore the
//! exact same addresses without re-reading the transaction.

use crate::diff_generator::DiffRecorder;
use crate::error::ConsensusError;
use turtledex_primitives::{
    ArbitraryData, CoinOutput, CoinOutputDiff, DiffDirection, FoundationUnlockHashUpdate, Transaction,
    UnlockHash,
};
use turtledex_state::LedgerRead;

/// Applies the Foundation update carried by `tx`, if any.
///
/// Only the first update of a block takes effect. Later ones, in the same or a later
/// transaction of the block, find the archive entry for this height and are ignored.
pub(crate) fn apply_arbitrary_data(
    recorder: &mut DiffRecorder<'_, '_>,
    tx: &Transaction,
) -> Result<(), ConsensusError> {
    let height = recorder.height;
    if height < recorder.txn.params().foundation_hardfork_height {
        return Ok(());
    }

    for data in &tx.arbitrary_data {
        // Malformed items were rejected by the sanity checks.
        let Ok(ArbitraryData::FoundationUpdate(update)) = ArbitraryData::decode(data) else {
            continue;
        };
        if recorder
            .txn
            .archived_foundation_unlock_hashes(height)?
            .is_some()
        {
            tracing::debug!(height, "Ignoring repeated Foundation update");
            continue;
        }
        apply_foundation_update(recorder, update)?;
    }

    Ok(())
}

fn apply_foundation_update(
    recorder: &mut DiffRecorder<'_, '_>,
    update: FoundationUnlockHashUpdate,
) -> Result<(), ConsensusError> {
    let height = recorder.height;
    recorder.txn.apply_foundation_update(height, &update)?;
    recorder.diffs.foundation_update = Some(update);
    transfer_foundation_outputs(recorder, update.new_primary)
}

/// Moves every unspent subsidy output issued before this height to `new_primary`.
///
/// Subsidies are looked up by their deterministic ID on the canonical path. Heights
/// without a path entry or whose subsidy has already been spent are skipped. Each
/// move is a revert of the old output and an apply of the new one under the same
/// ID, which keeps the transfer revertible through the ordinary diff machinery.
fn transfer_foundation_outputs(
    recorder: &mut DiffRecorder<'_, '_>,
    new_primary: UnlockHash,
) -> Result<(), ConsensusError> {
    let heights = recorder
        .txn
        .params()
        .foundation_subsidy_heights_before(recorder.height)
        .collect::<Vec<_>>();

    let mut transferred = 0usize;
    for subsidy_height in heights {
        let Some(block_id) = recorder.txn.block_id_at(subsidy_height)? else {
            continue;
        };
        let id = block_id.foundation_subsidy_id();
        let Some(output) = recorder.txn.coin_output(&id)? else {
            continue;
        };

        let moved = CoinOutput {
            value: output.value,
            unlock_hash: new_primary,
        };
        recorder.coin_output(CoinOutputDiff {
            direction: DiffDirection::Revert,
            id,
            output,
        })?;
        recorder.coin_output(CoinOutputDiff {
            direction: DiffDirection::Apply,
            id,
            output: moved,
        })?;
        transferred += 1;
    }

    if transferred > 0 {
        tracing::debug!(
            height = recorder.height,
            "Transferred {transferred} Foundation subsidy outputs to {new_primary}"
        );
    }

    Ok(())
}
