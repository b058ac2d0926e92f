use crate::cli::CommonParams;
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use turtledex_consensus::{
    BlockImportError, BlockImportQueue, ConsensusSet, ImportBlocks, ImportStatus,
    block_import_queue,
};
use turtledex_primitives::{Block, BlockId, Decodable};

/// Import blocks into the ledger.
#[derive(clap::Parser, Debug, Clone)]
pub struct ImportBlocksCmd {
    /// File holding consensus-encoded blocks back to back, parents first.
    #[clap(long, value_name = "PATH")]
    pub file: PathBuf,

    /// Number of blocks handed to the import queue at once.
    #[clap(long, default_value_t = 256)]
    pub batch_size: usize,
}

/// Tally of one import run.
#[derive(Debug, Default, PartialEq, Eq)]
struct ImportSummary {
    /// Blocks that moved the canonical chain.
    imported: usize,
    /// Blocks stored off the canonical chain.
    side_chain: usize,
    /// Blocks skipped because the ledger already had them.
    known: usize,
    /// Canonical chain moves that reverted blocks.
    reorgs: usize,
}

impl ImportBlocksCmd {
    pub fn run(&self, common_params: &CommonParams) -> Result<()> {
        let consensus_set = Arc::new(common_params.open_consensus_set()?);
        let mut queue = block_import_queue(consensus_set.clone())?;

        let mut reader = BufReader::new(File::open(&self.file)?);
        let batch_size = self.batch_size.max(1);

        tracing::info!(
            "Start to import blocks from {} on top of {}",
            self.file.display(),
            consensus_set.tip()
        );

        let mut summary = ImportSummary::default();
        let mut rejected = None;
        let mut index = 0;
        let mut last_update = Instant::now();
        let mut last_height = consensus_set.height();

        const INTERVAL: Duration = Duration::from_secs(5);

        loop {
            let mut blocks = Vec::with_capacity(batch_size);
            while blocks.len() < batch_size && !reader.fill_buf()?.is_empty() {
                let block = Block::consensus_decode(&mut reader)
                    .map_err(|source| Error::Decode { index, source })?;
                index += 1;
                if consensus_set.contains_block(&block.id())? {
                    summary.known += 1;
                } else {
                    blocks.push(block);
                }
            }

            if blocks.is_empty() {
                if reader.fill_buf()?.is_empty() {
                    break;
                }
                continue;
            }

            rejected = import_batch(&mut queue, blocks, &mut summary)?;

            if last_update.elapsed() > INTERVAL {
                let height = consensus_set.height();
                let speed = height.saturating_sub(last_height) as f64
                    / last_update.elapsed().as_secs_f64();
                tracing::info!(
                    "Imported {} blocks, {speed:.1} bps, best{}",
                    summary.imported,
                    consensus_set.tip()
                );
                last_update = Instant::now();
                last_height = height;
            }

            if rejected.is_some() {
                break;
            }
        }

        tracing::info!(
            "Imported {} blocks ({} reorgs), {} side chain, {} already known, best{}",
            summary.imported,
            summary.reorgs,
            summary.side_chain,
            summary.known,
            consensus_set.tip()
        );

        println!(
            "imported: {}, side chain: {}, known: {}, reorgs: {}, height: {}, tip: {}",
            summary.imported,
            summary.side_chain,
            summary.known,
            summary.reorgs,
            consensus_set.height(),
            consensus_set.tip().id
        );

        match rejected {
            Some((block, source)) => Err(Error::Rejected { block, source }),
            None => Ok(()),
        }
    }
}

/// Sends one batch through the queue and waits for its result.
///
/// Returns the block of the batch that was rejected, if any. A fatal error is
/// returned as an error.
fn import_batch(
    queue: &mut BlockImportQueue,
    blocks: Vec<Block>,
    summary: &mut ImportSummary,
) -> Result<Option<(BlockId, BlockImportError)>> {
    queue.import_blocks(ImportBlocks { blocks });

    let result = futures::executor::block_on(queue.block_import_results())
        .ok_or(Error::ImportWorkerStopped)?;

    let mut rejected = None;

    for (res, block_id) in result.results {
        match res {
            Ok(status) => tally(summary, &status),
            Err(BlockImportError::Cancelled) => {}
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                tracing::warn!(?err, "Stopping import at rejected block {block_id}");
                rejected = Some((block_id, err));
            }
        }
    }

    Ok(rejected)
}

fn tally(summary: &mut ImportSummary, status: &ImportStatus) {
    match status {
        ImportStatus::Imported { .. } => {
            summary.imported += 1;
            if status.is_reorg() {
                summary.reorgs += 1;
            }
        }
        ImportStatus::SideChain(_) => summary.side_chain += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Chain;
    use crate::commands::export_blocks::ExportBlocksCmd;
    use turtledex_primitives::{CoinOutput, Encodable, testing_unlock_conditions};

    fn testing_params(base_path: &std::path::Path) -> CommonParams {
        CommonParams {
            chain: Chain::Testing,
            base_path: base_path.to_path_buf(),
            log_filter: None,
        }
    }

    fn mine_empty(consensus_set: &ConsensusSet, count: usize) {
        for _ in 0..count {
            let parent = consensus_set.current_block().unwrap();
            let height = consensus_set.height() + 1;
            let block = Block {
                parent_id: parent.id(),
                nonce: [0; 8],
                timestamp: parent.timestamp + 1,
                miner_payouts: vec![CoinOutput {
                    value: consensus_set.params().coinbase(height),
                    unlock_hash: testing_unlock_conditions(200).unlock_hash(),
                }],
                transactions: Vec::new(),
            };
            consensus_set.accept_block(block).unwrap();
        }
    }

    #[test]
    fn test_exported_blocks_import_into_fresh_ledger() {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let source = testing_params(source_dir.path());
        let target = testing_params(target_dir.path());
        let file = source_dir.path().join("blocks.bin");

        let expected = {
            let consensus_set = source.open_consensus_set().unwrap();
            mine_empty(&consensus_set, 5);
            consensus_set.state_checksum().unwrap()
        };

        ExportBlocksCmd {
            file: file.clone(),
            from: 1,
            to: None,
        }
        .run(&source)
        .unwrap();

        let import = ImportBlocksCmd {
            file,
            batch_size: 2,
        };
        import.run(&target).unwrap();
        // A second run finds every block already known.
        import.run(&target).unwrap();

        let consensus_set = target.open_consensus_set().unwrap();
        assert_eq!(consensus_set.height(), 5);
        assert_eq!(consensus_set.state_checksum().unwrap(), expected);
        assert_eq!(consensus_set.change_count().unwrap(), 6);
    }

    #[test]
    fn test_rejected_block_fails_the_import() {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let source = testing_params(source_dir.path());
        let target = testing_params(target_dir.path());
        let file = source_dir.path().join("blocks.bin");

        let blocks = {
            let consensus_set = source.open_consensus_set().unwrap();
            mine_empty(&consensus_set, 3);
            (1..=3)
                .map(|height| consensus_set.block_at_height(height).unwrap().unwrap())
                .collect::<Vec<_>>()
        };
        let mut bad = blocks[1].clone();
        bad.miner_payouts[0].value = turtledex_primitives::Currency::new(1);
        let mut bytes = Vec::new();
        for block in [&blocks[0], &bad, &blocks[2]] {
            block.consensus_encode(&mut bytes).unwrap();
        }
        std::fs::write(&file, bytes).unwrap();

        let err = ImportBlocksCmd {
            file,
            batch_size: 16,
        }
        .run(&target)
        .unwrap_err();
        assert!(matches!(
            &err,
            Error::Rejected { block, source: BlockImportError::Consensus(source) }
                if *block == bad.id() && source.is_invalid_block()
        ));
        assert!(!err.is_fatal());

        let consensus_set = target.open_consensus_set().unwrap();
        assert_eq!(consensus_set.height(), 1);
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let params = testing_params(dir.path());
        let file = dir.path().join("blocks.bin");
        std::fs::write(&file, [1u8, 2, 3]).unwrap();

        let err = ImportBlocksCmd {
            file,
            batch_size: 16,
        }
        .run(&params)
        .unwrap_err();
        assert!(matches!(err, Error::Decode { index: 0, .. }));
        assert!(!err.is_fatal());
    }
}
