//! This module defines the [`BlockImportQueue`], which separates reading blocks from
//! importing them. The queue runs on a dedicated worker thread, receives batches of
//! blocks over a channel, imports them in order and sends the results back.

use crate::block_import::{BlockImport, ImportStatus};
use crate::error::ConsensusError;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::prelude::*;
use futures::task::{Context, Poll};
use std::pin::Pin;
use std::sync::Arc;
use turtledex_primitives::{Block, BlockId};

/// A batch of blocks to import, parents first.
#[derive(Debug, Clone)]
pub struct ImportBlocks {
    pub blocks: Vec<Block>,
}

/// Why a block in a batch was not imported.
#[derive(Debug, thiserror::Error)]
pub enum BlockImportError {
    /// An earlier block of the batch failed.
    #[error("Import cancelled after an earlier failure in the batch")]
    Cancelled,
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

impl BlockImportError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Consensus(err) if err.is_fatal())
    }
}

/// Import queue for blocks.
#[derive(Debug)]
pub struct BlockImportQueue {
    block_import_sender: UnboundedSender<ImportBlocks>,
    import_result_receiver: UnboundedReceiver<ImportManyBlocksResult>,
}

impl BlockImportQueue {
    /// Sends a batch of blocks to the worker for processing.
    pub fn import_blocks(&self, incoming_blocks: ImportBlocks) {
        let _ = self.block_import_sender.unbounded_send(incoming_blocks);
    }

    /// Waits for the result of the next batch.
    ///
    /// Returns `None` once the worker has stopped and every result was consumed.
    pub async fn block_import_results(&mut self) -> Option<ImportManyBlocksResult> {
        self.import_result_receiver.next().await
    }
}

/// Creates a new import queue backed by a worker thread.
///
/// The worker stops when the queue is dropped.
pub fn block_import_queue<BI: BlockImport>(block_import: Arc<BI>) -> std::io::Result<BlockImportQueue> {
    let (import_result_sender, import_result_receiver) = unbounded();
    let (block_import_sender, block_import_receiver) = unbounded();

    std::thread::Builder::new()
        .name("block-import-worker".to_string())
        .spawn(move || {
            futures::executor::block_on(block_import_process(
                &*block_import,
                import_result_sender,
                block_import_receiver,
            ));
        })?;

    Ok(BlockImportQueue {
        block_import_sender,
        import_result_receiver,
    })
}

/// The process of importing blocks.
///
/// Polls `block_import_receiver` for new batches and imports them one at a time,
/// yielding after each block. Returns when either channel is closed.
async fn block_import_process(
    block_import: &dyn BlockImport,
    result_sender: UnboundedSender<ImportManyBlocksResult>,
    mut block_import_receiver: UnboundedReceiver<ImportBlocks>,
) {
    loop {
        let Some(ImportBlocks { blocks }) = block_import_receiver.next().await else {
            tracing::debug!("Stopping block import because the import channel was closed");
            return;
        };

        let res = import_many_blocks(block_import, blocks).await;

        if result_sender.unbounded_send(res).is_err() {
            tracing::debug!("Stopping block import because the result channel was closed");
            return;
        }
    }
}

/// Result of `import_many_blocks`.
#[derive(Debug)]
pub struct ImportManyBlocksResult {
    /// The number of blocks imported successfully.
    pub imported: usize,
    /// The total number of blocks processed.
    pub block_count: usize,
    /// The import results for each block.
    pub results: Vec<(Result<ImportStatus, BlockImportError>, BlockId)>,
}

impl ImportManyBlocksResult {
    /// The first fatal error of the batch, if any.
    pub fn fatal_error(&self) -> Option<&BlockImportError> {
        self.results
            .iter()
            .filter_map(|(result, _)| result.as_ref().err())
            .find(|err| err.is_fatal())
    }
}

/// Imports several blocks in order, returning the result for each block.
///
/// Once a block fails, the remaining blocks are reported as cancelled.
async fn import_many_blocks(
    import_handle: &dyn BlockImport,
    blocks: Vec<Block>,
) -> ImportManyBlocksResult {
    tracing::trace!("[import_many_blocks] importing {} blocks", blocks.len());
    let count = blocks.len();

    let mut imported = 0;
    let mut results = Vec::with_capacity(count);
    let mut has_error = false;

    for block in blocks {
        let block_id = block.id();

        let block_import_result = if has_error {
            Err(BlockImportError::Cancelled)
        } else {
            import_handle.import_block(block).map_err(BlockImportError::from)
        };

        match &block_import_result {
            Ok(status) => {
                tracing::trace!("Block imported successfully {}", status.block());
                imported += 1;
            }
            Err(BlockImportError::Cancelled) => {}
            Err(err) => {
                tracing::debug!(?err, "Error importing block {block_id}");
                has_error = true;
            }
        }

        results.push((block_import_result, block_id));

        Yield::new().await
    }

    ImportManyBlocksResult {
        block_count: count,
        imported,
        results,
    }
}

/// A future that will always `yield` on the first call of `poll` but schedules the
/// current task for re-execution.
struct Yield(bool);

impl Yield {
    fn new() -> Self {
        Self(false)
    }
}

impl Future for Yield {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if !self.0 {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}
