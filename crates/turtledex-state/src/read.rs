use crate::changelog::ChangeEntry;
use crate::foundation::FoundationAddresses;
use crate::processed_block::ProcessedBlock;
use crate::{Column, Error, Result, height_key, meta_keys};
use turtledex_primitives::encoding::{Decodable, deserialize};
use turtledex_primitives::{
    BlockId, ChainParams, ChangeId, CoinOutput, CoinOutputId, Currency, FileContract,
    FileContractId, FundOutput, FundOutputId,
};

/// The head of the canonical chain together with the scalars that change with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainTip {
    pub height: u64,
    pub id: BlockId,
    pub fund_pool: Currency,
}

/// Read access to ledger state.
///
/// Implemented by the committed store and by an in-flight [`StateTransaction`],
/// which layers its staged writes over the committed state.
///
/// [`StateTransaction`]: crate::StateTransaction
pub trait LedgerRead {
    fn params(&self) -> &ChainParams;

    fn chain_tip(&self) -> ChainTip;

    fn get_raw(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All entries of `column` whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    fn get_decoded<T: Decodable>(&self, column: Column, key: &[u8]) -> Result<Option<T>> {
        self.get_raw(column, key)?
            .map(|bytes| decode_value(column, &bytes))
            .transpose()
    }

    fn height(&self) -> u64 {
        self.chain_tip().height
    }

    fn fund_pool(&self) -> Currency {
        self.chain_tip().fund_pool
    }

    fn coin_output(&self, id: &CoinOutputId) -> Result<Option<CoinOutput>> {
        self.get_decoded(Column::CoinOutputs, id.as_bytes())
    }

    fn fund_output(&self, id: &FundOutputId) -> Result<Option<FundOutput>> {
        self.get_decoded(Column::FundOutputs, id.as_bytes())
    }

    fn file_contract(&self, id: &FileContractId) -> Result<Option<FileContract>> {
        self.get_decoded(Column::FileContracts, id.as_bytes())
    }

    fn processed_block(&self, id: &BlockId) -> Result<Option<ProcessedBlock>> {
        self.get_decoded(Column::Blocks, id.as_bytes())
    }

    /// ID of the canonical block at `height`.
    fn block_id_at(&self, height: u64) -> Result<Option<BlockId>> {
        self.get_decoded(Column::Path, &height_key(height))
    }

    fn foundation_unlock_hashes(&self) -> Result<FoundationAddresses> {
        match self.get_decoded(Column::Meta, meta_keys::FOUNDATION)? {
            Some(addresses) => Ok(addresses),
            None => Ok(FoundationAddresses {
                primary: self.params().initial_foundation_unlock_hash,
                failsafe: self.params().initial_foundation_failsafe_unlock_hash,
            }),
        }
    }

    /// Foundation addresses in effect before the update applied at `height`.
    fn archived_foundation_unlock_hashes(&self, height: u64) -> Result<Option<FoundationAddresses>> {
        self.get_decoded(Column::FoundationArchive, &height_key(height))
    }

    fn bucket_exists(&self, height: u64) -> Result<bool> {
        Ok(self
            .get_raw(Column::DelayedBuckets, &height_key(height))?
            .is_some())
    }

    /// Delayed outputs maturing at `height`, in ID order.
    fn delayed_outputs_at(&self, height: u64) -> Result<Vec<(CoinOutputId, CoinOutput)>> {
        self.scan_prefix(Column::DelayedOutputs, &height_key(height))?
            .into_iter()
            .map(|(key, value)| {
                let id = CoinOutputId::from_byte_array(id_suffix(Column::DelayedOutputs, &key)?);
                Ok((id, decode_value(Column::DelayedOutputs, &value)?))
            })
            .collect()
    }

    /// Contracts whose proof window closes at `height`, in ID order.
    fn contracts_expiring_at(&self, height: u64) -> Result<Vec<FileContractId>> {
        self.scan_prefix(Column::ContractExpirations, &height_key(height))?
            .into_iter()
            .map(|(key, _)| {
                Ok(FileContractId::from_byte_array(id_suffix(
                    Column::ContractExpirations,
                    &key,
                )?))
            })
            .collect()
    }

    fn change_count(&self) -> Result<u64> {
        Ok(self
            .get_decoded(Column::Meta, meta_keys::CHANGELOG_LEN)?
            .unwrap_or(0))
    }

    fn change_entry(&self, seq: u64) -> Result<Option<ChangeEntry>> {
        self.get_decoded(Column::Changelog, &height_key(seq))
    }

    /// Position of change `id` in the changelog.
    fn change_seq(&self, id: &ChangeId) -> Result<Option<u64>> {
        self.get_decoded(Column::ChangeIds, id.as_bytes())
    }

    fn synced(&self) -> Result<bool> {
        Ok(self
            .get_decoded(Column::Meta, meta_keys::SYNCED)?
            .unwrap_or(false))
    }

    /// Number of entries in `column`.
    fn count(&self, column: Column) -> Result<u64>;
}

pub(crate) fn decode_value<T: Decodable>(column: Column, bytes: &[u8]) -> Result<T> {
    deserialize(bytes).map_err(|source| Error::Decode {
        column: column.name(),
        source,
    })
}

/// Extracts the 32-byte ID that trails a `height || id` key.
fn id_suffix(column: Column, key: &[u8]) -> Result<[u8; 32]> {
    key.get(8..)
        .and_then(|suffix| <[u8; 32]>::try_from(suffix).ok())
        .ok_or(Error::Decode {
            column: column.name(),
            source: turtledex_primitives::EncodingError::InvalidKeyLength(key.len()),
        })
}
