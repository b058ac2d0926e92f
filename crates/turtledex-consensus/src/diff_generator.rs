//! Diff Generator.
//!
//! Validates a block against the ledger one transaction at a time and records every
//! resulting mutation as a diff. Each diff is committed to the transaction overlay
//! as soon as it is produced, so later transactions of the same block see the
//! effects of earlier ones.

use crate::error::{BlockError, ConsensusError};
use crate::hardfork;
use crate::verification::{TxError, check_transaction_sanity, verify_transaction};
use turtledex_primitives::{
    BlockId, CoinOutput, CoinOutputDiff, CoinOutputId, DelayedOutputDiff,
    DiffDirection, DiffSet, FileContractDiff, FundOutput, FundOutputDiff, FundPoolDiff,
    Hash256, Transaction,
};
use turtledex_state::{FatalError, LedgerRead, ObjectKind, ProcessedBlock, StateTransaction};

const APPLY: DiffDirection = DiffDirection::Apply;
const REVERT: DiffDirection = DiffDirection::Revert;

/// Records diffs into a [`DiffSet`] while committing them to the overlay.
pub(crate) struct DiffRecorder<'t, 'a> {
    pub(crate) txn: &'t mut StateTransaction<'a>,
    pub(crate) diffs: &'t mut DiffSet,
    pub(crate) height: u64,
}

impl DiffRecorder<'_, '_> {
    pub(crate) fn coin_output(&mut self, diff: CoinOutputDiff) -> Result<(), ConsensusError> {
        self.txn.commit_coin_output_diff(&diff, APPLY)?;
        self.diffs.coin_output_diffs.push(diff);
        Ok(())
    }

    fn file_contract(&mut self, diff: FileContractDiff) -> Result<(), ConsensusError> {
        self.txn.commit_file_contract_diff(&diff, APPLY)?;
        self.diffs.file_contract_diffs.push(diff);
        Ok(())
    }

    fn fund_output(&mut self, diff: FundOutputDiff) -> Result<(), ConsensusError> {
        self.txn.commit_fund_output_diff(&diff, APPLY)?;
        self.diffs.fund_output_diffs.push(diff);
        Ok(())
    }

    fn fund_pool(&mut self, diff: FundPoolDiff) -> Result<(), ConsensusError> {
        self.txn.commit_fund_pool_diff(&diff, APPLY)?;
        self.diffs.fund_pool_diffs.push(diff);
        Ok(())
    }

    /// Schedules `output` to mature `maturity_delay` blocks from now.
    fn delay(&mut self, id: CoinOutputId, output: CoinOutput) -> Result<(), ConsensusError> {
        let diff = DelayedOutputDiff {
            direction: APPLY,
            id,
            output,
            maturity_height: self.height + self.txn.params().maturity_delay,
        };
        self.txn.commit_delayed_output_diff(&diff, APPLY)?;
        self.diffs.delayed_output_diffs.push(diff);
        Ok(())
    }
}

fn missing(kind: ObjectKind, id: [u8; 32]) -> ConsensusError {
    turtledex_state::Error::from(FatalError::MissingObject {
        kind,
        id: Hash256::from_byte_array(id),
    })
    .into()
}

fn overflow(what: &str) -> ConsensusError {
    turtledex_state::Error::from(FatalError::Inconsistent(format!("Overflow computing {what}")))
        .into()
}

/// Validates `block` on top of the current tip of `txn` and applies it, filling in
/// its diff set.
///
/// On success the block is the new tip of `txn`, `block.diffs_generated` is set
/// and the caller must store the block. On a validation failure the overlay is left
/// half-applied and must be discarded.
pub fn generate_and_apply_diff(
    txn: &mut StateTransaction<'_>,
    block: &mut ProcessedBlock,
) -> Result<(), ConsensusError> {
    let id = block.id();
    let height = block.height;
    let tip = txn.chain_tip();

    if block.diffs_generated {
        return Err(turtledex_state::Error::from(FatalError::Inconsistent(format!(
            "Diffs of block {id} were already generated"
        )))
        .into());
    }
    if block.parent_id() != tip.id || height != tip.height + 1 {
        return Err(turtledex_state::Error::from(FatalError::InvalidSuccessor {
            block: id,
            height,
            tip: tip.id,
        })
        .into());
    }

    txn.create_upcoming_buckets(height)?;

    let mut diffs = DiffSet::default();
    let mut recorder = DiffRecorder {
        txn: &mut *txn,
        diffs: &mut diffs,
        height,
    };

    for (index, tx) in block.block.transactions.iter().enumerate() {
        let invalid = |source: TxError| match source {
            TxError::State(err) => ConsensusError::from(err),
            source => ConsensusError::InvalidBlock {
                block: id,
                source: BlockError::Transaction {
                    index,
                    txid: tx.id(),
                    source,
                },
            },
        };
        check_transaction_sanity(tx, height, recorder.txn.params()).map_err(invalid)?;
        verify_transaction(&*recorder.txn, tx, height).map_err(invalid)?;
        apply_transaction(&mut recorder, tx)?;
    }

    apply_miner_payouts(&mut recorder, id, &block.block.miner_payouts)?;
    recorder.txn.apply_matured_outputs(height, recorder.diffs)?;
    apply_contract_maintenance(&mut recorder)?;
    apply_foundation_subsidy(&mut recorder, id)?;

    txn.delete_bucket(height)?;
    txn.push_path(height, id)?;

    tracing::debug!(
        "Generated {} diffs for #{height},{id} ({} transactions)",
        diffs.len(),
        block.block.transactions.len()
    );

    block.diffs = diffs;
    block.diffs_generated = true;

    Ok(())
}

fn apply_transaction(recorder: &mut DiffRecorder<'_, '_>, tx: &Transaction) -> Result<(), ConsensusError> {
    for input in &tx.coin_inputs {
        let output = recorder
            .txn
            .coin_output(&input.parent_id)?
            .ok_or_else(|| missing(ObjectKind::CoinOutput, input.parent_id.0))?;
        recorder.coin_output(CoinOutputDiff {
            direction: REVERT,
            id: input.parent_id,
            output,
        })?;
    }

    for (index, output) in tx.coin_outputs.iter().enumerate() {
        recorder.coin_output(CoinOutputDiff {
            direction: APPLY,
            id: tx.coin_output_id(index as u64),
            output: output.clone(),
        })?;
    }

    for (index, contract) in tx.file_contracts.iter().enumerate() {
        recorder.file_contract(FileContractDiff {
            direction: APPLY,
            id: tx.file_contract_id(index as u64),
            contract: contract.clone(),
        })?;

        let previous = recorder.txn.fund_pool();
        let adjusted = recorder
            .txn
            .params()
            .tax(contract.payout)
            .and_then(|tax| previous.checked_add(tax))
            .ok_or_else(|| overflow("the fund pool"))?;
        recorder.fund_pool(FundPoolDiff {
            direction: APPLY,
            previous,
            adjusted,
        })?;
    }

    for revision in &tx.file_contract_revisions {
        let id = revision.parent_id;
        let contract = recorder
            .txn
            .file_contract(&id)?
            .ok_or_else(|| missing(ObjectKind::FileContract, id.0))?;
        let revised = revision.revised(&contract);
        recorder.file_contract(FileContractDiff {
            direction: REVERT,
            id,
            contract,
        })?;
        recorder.file_contract(FileContractDiff {
            direction: APPLY,
            id,
            contract: revised,
        })?;
    }

    for proof in &tx.storage_proofs {
        let id = proof.parent_id;
        let contract = recorder
            .txn
            .file_contract(&id)?
            .ok_or_else(|| missing(ObjectKind::FileContract, id.0))?;
        for (index, output) in contract.valid_proof_outputs.iter().enumerate() {
            recorder.delay(id.storage_proof_output_id(true, index as u64), output.clone())?;
        }
        recorder.file_contract(FileContractDiff {
            direction: REVERT,
            id,
            contract,
        })?;
    }

    for input in &tx.fund_inputs {
        let id = input.parent_id;
        let output = recorder
            .txn
            .fund_output(&id)?
            .ok_or_else(|| missing(ObjectKind::FundOutput, id.0))?;
        let claim = recorder
            .txn
            .fund_pool()
            .checked_sub(output.claim_start)
            .and_then(|growth| growth.checked_div(recorder.txn.params().fund_count))
            .and_then(|per_fund| per_fund.checked_mul(output.value))
            .ok_or_else(|| overflow("a fund claim"))?;
        recorder.delay(
            id.claim_output_id(),
            CoinOutput {
                value: claim,
                unlock_hash: input.claim_unlock_hash,
            },
        )?;
        recorder.fund_output(FundOutputDiff {
            direction: REVERT,
            id,
            output,
        })?;
    }

    for (index, output) in tx.fund_outputs.iter().enumerate() {
        let claim_start = recorder.txn.fund_pool();
        recorder.fund_output(FundOutputDiff {
            direction: APPLY,
            id: tx.fund_output_id(index as u64),
            output: FundOutput {
                claim_start,
                ..output.clone()
            },
        })?;
    }

    hardfork::apply_arbitrary_data(recorder, tx)
}

fn apply_miner_payouts(
    recorder: &mut DiffRecorder<'_, '_>,
    block_id: BlockId,
    payouts: &[CoinOutput],
) -> Result<(), ConsensusError> {
    for (index, payout) in payouts.iter().enumerate() {
        recorder.delay(block_id.miner_payout_id(index as u64), payout.clone())?;
    }
    Ok(())
}

/// Resolves every contract whose proof window closes at this height without a
/// storage proof, paying out the missed proof outputs.
fn apply_contract_maintenance(recorder: &mut DiffRecorder<'_, '_>) -> Result<(), ConsensusError> {
    let expiring = recorder.txn.contracts_expiring_at(recorder.height)?;
    let count = expiring.len();

    for id in expiring {
        let contract = recorder
            .txn
            .file_contract(&id)?
            .ok_or_else(|| missing(ObjectKind::FileContract, id.0))?;
        for (index, output) in contract.missed_proof_outputs.iter().enumerate() {
            recorder.delay(id.storage_proof_output_id(false, index as u64), output.clone())?;
        }
        recorder.file_contract(FileContractDiff {
            direction: REVERT,
            id,
            contract,
        })?;
    }

    if count > 0 {
        tracing::trace!("Expired {count} file contracts at height {}", recorder.height);
    }
    Ok(())
}

fn apply_foundation_subsidy(recorder: &mut DiffRecorder<'_, '_>, block_id: BlockId) -> Result<(), ConsensusError> {
    let Some(value) = recorder.txn.params().foundation_subsidy_at(recorder.height) else {
        return Ok(());
    };
    if value.is_zero() {
        return Ok(());
    }
    let primary = recorder.txn.foundation_unlock_hashes()?.primary;
    recorder.delay(
        block_id.foundation_subsidy_id(),
        CoinOutput {
            value,
            unlock_hash: primary,
        },
    )
}
