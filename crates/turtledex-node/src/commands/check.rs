use crate::cli::CommonParams;
use crate::error::{Error, Result};

/// Check the ledger for internal consistency.
///
/// Verifies the delayed output buckets and the fund outputs, then coin conservation.
#[derive(clap::Parser, Debug, Clone)]
pub struct CheckCmd {}

impl CheckCmd {
    pub fn run(&self, common_params: &CommonParams) -> Result<()> {
        let consensus_set = common_params.open_consensus_set()?;
        let tip = consensus_set.tip();

        if let Err(err) = consensus_set.check_consistency() {
            tracing::error!(?err, "Ledger at {tip} is inconsistent");
            return Err(Error::Inconsistent(err.to_string()));
        }

        let checksum = consensus_set.state_checksum()?;
        tracing::info!("Ledger at {tip} is consistent");
        println!("consistent at height {}, checksum {checksum}", tip.height);

        Ok(())
    }
}
