use crate::cli::CommonParams;
use crate::error::Result;
use serde::Serialize;
use turtledex_consensus::{ConsensusChange, ResumePoint};
use turtledex_primitives::{BlockId, ChangeId, Currency, UnlockHash};

/// Print the consensus changes recorded after a given change, one JSON object per
/// line.
#[derive(clap::Parser, Debug, Clone)]
pub struct TailChangesCmd {
    /// Change ID to resume after. All changes are printed if omitted.
    #[clap(long, value_name = "CHANGE_ID")]
    pub from: Option<ChangeId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiffCounts {
    coin_outputs: usize,
    file_contracts: usize,
    fund_outputs: usize,
    delayed_outputs: usize,
    fund_pool: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangeSummary {
    seq: u64,
    id: ChangeId,
    reverted_blocks: Vec<BlockId>,
    applied_blocks: Vec<BlockId>,
    block_height: u64,
    fund_pool: Currency,
    foundation_primary: UnlockHash,
    foundation_updates: usize,
    diffs: DiffCounts,
}

impl From<&ConsensusChange> for ChangeSummary {
    fn from(change: &ConsensusChange) -> Self {
        let diffs = &change.diffs;
        Self {
            seq: change.seq,
            id: change.id,
            reverted_blocks: change.reverted_blocks.clone(),
            applied_blocks: change.applied_blocks.clone(),
            block_height: change.block_height,
            fund_pool: change.fund_pool,
            foundation_primary: change.foundation.primary,
            foundation_updates: change.applied_foundation_updates.len()
                + change.reverted_foundation_updates.len(),
            diffs: DiffCounts {
                coin_outputs: diffs.coin_output_diffs.len(),
                file_contracts: diffs.file_contract_diffs.len(),
                fund_outputs: diffs.fund_output_diffs.len(),
                delayed_outputs: diffs.delayed_output_diffs.len(),
                fund_pool: diffs.fund_pool_diffs.len(),
            },
        }
    }
}

impl TailChangesCmd {
    pub fn run(&self, common_params: &CommonParams) -> Result<()> {
        let consensus_set = common_params.open_consensus_set()?;

        let resume = self.from.map_or(ResumePoint::Beginning, ResumePoint::From);
        let (subscription, mut receiver) = consensus_set.subscribe(resume)?;

        let mut printed = 0usize;
        while let Ok(Some(change)) = receiver.try_next() {
            println!("{}", serde_json::to_string(&ChangeSummary::from(&change))?);
            printed += 1;
        }

        consensus_set.unsubscribe(subscription);

        tracing::debug!("Printed {printed} changes");

        Ok(())
    }
}
