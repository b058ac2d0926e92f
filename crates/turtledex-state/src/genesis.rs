use crate::{ChainTip, FoundationAddresses, LedgerStore, ProcessedBlock, Result};
use turtledex_primitives::{CoinOutputDiff, DiffDirection, DiffSet, FundOutputDiff};

/// Seeds an empty store with the genesis block.
///
/// Genesis outputs are inserted directly rather than derived by the diff generator,
/// there is no parent state to validate them against. They are still recorded as
/// diffs so the genesis block looks like any other processed block.
pub(crate) fn initialize(store: &LedgerStore) -> Result<ChainTip> {
    let params = crate::LedgerRead::params(store);
    let block = params.genesis_block();
    let id = block.id();
    let apply = DiffDirection::Apply;

    let mut txn = store.begin();
    let mut diffs = DiffSet::default();

    for tx in &block.transactions {
        for (index, output) in tx.coin_outputs.iter().enumerate() {
            let diff = CoinOutputDiff {
                direction: apply,
                id: tx.coin_output_id(index as u64),
                output: output.clone(),
            };
            txn.commit_coin_output_diff(&diff, apply)?;
            diffs.coin_output_diffs.push(diff);
        }
        for (index, output) in tx.fund_outputs.iter().enumerate() {
            let diff = FundOutputDiff {
                direction: apply,
                id: tx.fund_output_id(index as u64),
                output: output.clone(),
            };
            txn.commit_fund_output_diff(&diff, apply)?;
            diffs.fund_output_diffs.push(diff);
        }
    }

    for height in 1..=params.maturity_delay {
        txn.create_bucket(height)?;
    }

    txn.set_genesis_path(id);
    txn.set_foundation_unlock_hashes(&FoundationAddresses {
        primary: params.initial_foundation_unlock_hash,
        failsafe: params.initial_foundation_failsafe_unlock_hash,
    });

    let processed = ProcessedBlock {
        block,
        height: 0,
        depth: params.root_target.work(),
        child_target: params.root_target,
        diffs_generated: true,
        diffs,
    };
    txn.put_processed_block(&processed);
    txn.append_change(Vec::new(), vec![id])?;

    txn.commit()
}
