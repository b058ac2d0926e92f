//! # TurtleDex consensus
//!
//! Turns blocks into ledger state.
//!
//! - [`ConsensusSet`] is the entry point. It keeps the block index, picks the chain
//!   with the most work and moves the ledger to it.
//! - The diff generator validates a block transaction by transaction and records
//!   every mutation as a diff, which the state crate commits and later replays or
//!   reverts verbatim.
//! - The Foundation hardfork handler rotates the subsidy addresses.
//! - Subscribers follow the chain through [`ConsensusChange`]s.
//! - [`BlockImportQueue`] imports batches of blocks on a worker thread.

mod block_import;
mod consensus_set;
mod diff_generator;
mod error;
mod hardfork;
mod import_queue;
mod notifier;
pub mod verification;

pub use block_import::{BlockImport, ImportStatus};
pub use consensus_set::ConsensusSet;
pub use diff_generator::generate_and_apply_diff;
pub use error::{BlockError, ConsensusError};
pub use import_queue::{
    BlockImportError, BlockImportQueue, ImportBlocks, ImportManyBlocksResult, block_import_queue,
};
pub use notifier::{ChangeNotifier, ConsensusChange, ResumePoint, SubscriptionId};
