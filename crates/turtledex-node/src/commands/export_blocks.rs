use crate::cli::CommonParams;
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use turtledex_primitives::Encodable;

/// Export canonical blocks in the format `import-blocks` reads.
#[derive(clap::Parser, Debug, Clone)]
pub struct ExportBlocksCmd {
    /// Output file.
    #[clap(long, value_name = "PATH")]
    pub file: PathBuf,

    /// First block height to export.
    ///
    /// The genesis block is part of every ledger, so the default skips it.
    #[clap(long, default_value_t = 1)]
    pub from: u64,

    /// Last block height to export, defaults to the tip.
    #[clap(long)]
    pub to: Option<u64>,
}

impl ExportBlocksCmd {
    pub fn run(&self, common_params: &CommonParams) -> Result<()> {
        let consensus_set = common_params.open_consensus_set()?;

        let to = self
            .to
            .unwrap_or_else(|| consensus_set.height())
            .min(consensus_set.height());
        if self.from > to {
            return Err(Error::InvalidRange {
                from: self.from,
                to,
            });
        }

        let mut writer = BufWriter::new(File::create(&self.file)?);
        let mut exported = 0u64;

        for height in self.from..=to {
            let Some(block) = consensus_set.block_at_height(height)? else {
                break;
            };
            block.consensus_encode(&mut writer)?;
            exported += 1;
        }

        writer.flush()?;

        tracing::info!(
            "Exported {exported} blocks (#{}..=#{to}) to {}",
            self.from,
            self.file.display()
        );

        Ok(())
    }
}
