use crate::cli::CommonParams;
use crate::error::Result;
use serde::Serialize;
use turtledex_consensus::ConsensusSet;
use turtledex_primitives::{BlockId, Currency, Target, UnlockHash};

/// Print a summary of the ledger.
#[derive(clap::Parser, Debug, Clone)]
pub struct ChainInfoCmd {}

#[derive(Debug, Serialize)]
struct FoundationInfo {
    primary: UnlockHash,
    failsafe: UnlockHash,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainInfo {
    chain: &'static str,
    height: u64,
    tip: BlockId,
    child_target: Target,
    fund_pool: Currency,
    coin_outputs: u64,
    fund_outputs: u64,
    file_contracts: u64,
    changes: u64,
    synced: bool,
    foundation: FoundationInfo,
}

impl ChainInfo {
    fn collect(chain: &'static str, consensus_set: &ConsensusSet) -> Result<Self> {
        let tip = consensus_set.tip();
        let foundation = consensus_set.foundation_unlock_hashes()?;
        Ok(Self {
            chain,
            height: tip.height,
            tip: tip.id,
            child_target: consensus_set
                .child_target(&tip.id)?
                .unwrap_or(consensus_set.params().root_target),
            fund_pool: consensus_set.fund_pool(),
            coin_outputs: consensus_set.coin_output_count()?,
            fund_outputs: consensus_set.fund_output_count()?,
            file_contracts: consensus_set.file_contract_count()?,
            changes: consensus_set.change_count()?,
            synced: consensus_set.synced()?,
            foundation: FoundationInfo {
                primary: foundation.primary,
                failsafe: foundation.failsafe,
            },
        })
    }
}

impl ChainInfoCmd {
    pub fn run(&self, common_params: &CommonParams) -> Result<()> {
        let consensus_set = common_params.open_consensus_set()?;
        let info = ChainInfo::collect(common_params.chain.id(), &consensus_set)?;
        println!("{}", serde_json::to_string_pretty(&info)?);
        Ok(())
    }
}
