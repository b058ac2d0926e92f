//! Persistent ledger state for TurtleDex consensus.
//!
//! The ledger lives in a single RocksDB instance with one column family per
//! namespace. Block processing stages every mutation in a [`StateTransaction`]
//! overlay and commits it as one atomic write batch, so a crash leaves the store
//! either before or after a block, never in between.
//!
//! ## Layout
//!
//! - **Block index**: processed blocks keyed by ID and the canonical path keyed by height
//! - **Objects**: coin outputs, fund outputs and file contracts keyed by ID
//! - **Delayed outputs**: one bucket per maturity height, outputs keyed by `height || id`
//! - **Foundation**: current subsidy addresses and a per-height archive of prior ones
//! - **Changelog**: the ordered sequence of consensus changes
//!
//! The Diff Committer and the Maturity Scheduler operate on a [`StateTransaction`];
//! see [`committer`] and [`maturity`].

mod changelog;
pub mod committer;
pub mod consistency;
mod error;
mod foundation;
mod genesis;
pub mod maturity;
mod overlay;
mod processed_block;
mod read;
mod storage;

pub use changelog::ChangeEntry;
pub use error::{Error, FatalError, ObjectKind};
pub use foundation::FoundationAddresses;
pub use overlay::StateTransaction;
pub use processed_block::ProcessedBlock;
pub use read::{ChainTip, LedgerRead};
pub use storage::LedgerStore;

/// Result type for ledger storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Namespaces of the ledger store, one RocksDB column family each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    /// Key: block ID. Value: [`ProcessedBlock`].
    Blocks,
    /// Key: height (u64, big-endian). Value: block ID.
    Path,
    /// Key: output ID. Value: coin output.
    CoinOutputs,
    /// Key: output ID. Value: fund output.
    FundOutputs,
    /// Key: contract ID. Value: file contract.
    FileContracts,
    /// Key: window end (u64, big-endian) || contract ID. Value: empty.
    ContractExpirations,
    /// Key: maturity height (u64, big-endian). Value: empty.
    DelayedBuckets,
    /// Key: maturity height (u64, big-endian) || output ID. Value: coin output.
    DelayedOutputs,
    /// Key: height (u64, big-endian). Value: [`FoundationAddresses`] before the update.
    FoundationArchive,
    /// Key: sequence number (u64, big-endian). Value: [`ChangeEntry`].
    Changelog,
    /// Key: change ID. Value: sequence number.
    ChangeIds,
    /// Keys: see `meta_keys`.
    Meta,
}

impl Column {
    pub const ALL: [Column; 12] = [
        Column::Blocks,
        Column::Path,
        Column::CoinOutputs,
        Column::FundOutputs,
        Column::FileContracts,
        Column::ContractExpirations,
        Column::DelayedBuckets,
        Column::DelayedOutputs,
        Column::FoundationArchive,
        Column::Changelog,
        Column::ChangeIds,
        Column::Meta,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Column::Blocks => "blocks",
            Column::Path => "path",
            Column::CoinOutputs => "coin_outputs",
            Column::FundOutputs => "fund_outputs",
            Column::FileContracts => "file_contracts",
            Column::ContractExpirations => "contract_expirations",
            Column::DelayedBuckets => "delayed_buckets",
            Column::DelayedOutputs => "delayed_outputs",
            Column::FoundationArchive => "foundation_archive",
            Column::Changelog => "changelog",
            Column::ChangeIds => "change_ids",
            Column::Meta => "meta",
        }
    }
}

/// Metadata keys.
mod meta_keys {
    pub const HEIGHT: &[u8] = b"height";
    pub const FUND_POOL: &[u8] = b"fund_pool";
    pub const FOUNDATION: &[u8] = b"foundation";
    pub const CHANGELOG_LEN: &[u8] = b"changelog_len";
    pub const SYNCED: &[u8] = b"synced";
}

/// Big-endian height key, so that iteration order follows height order.
pub(crate) fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

/// `height || id` composite key.
pub(crate) fn height_id_key(height: u64, id: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(id);
    key
}
