//! Directional records of ledger mutations.
//!
//! A diff describes one insertion (`Apply`) or removal (`Revert`) of a ledger
//! object. Committing a diff in its own direction performs it; committing it in the
//! opposite direction undoes it. Diffs are produced once per block and replayed
//! verbatim afterwards.

use crate::arbitrary_data::FoundationUnlockHashUpdate;
use crate::currency::Currency;
use crate::encoding::{Decodable, Encodable, EncodingError};
use crate::hash::{CoinOutputId, FileContractId, FundOutputId};
use crate::impl_consensus_encoding;
use crate::transaction::{CoinOutput, FileContract, FundOutput};
use std::io::{self, Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum DiffDirection {
    Apply,
    Revert,
}

impl DiffDirection {
    pub fn inverse(self) -> Self {
        match self {
            Self::Apply => Self::Revert,
            Self::Revert => Self::Apply,
        }
    }
}

impl Encodable for DiffDirection {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        (*self == Self::Apply).consensus_encode(writer)
    }
}

impl Decodable for DiffDirection {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        if bool::consensus_decode(reader)? {
            Ok(Self::Apply)
        } else {
            Ok(Self::Revert)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinOutputDiff {
    pub direction: DiffDirection,
    pub id: CoinOutputId,
    pub output: CoinOutput,
}

impl_consensus_encoding!(CoinOutputDiff, direction, id, output);

/// Contracts are never edited in place: a revision is a `Revert` of the old record
/// followed by an `Apply` of the new one under the same ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContractDiff {
    pub direction: DiffDirection,
    pub id: FileContractId,
    pub contract: FileContract,
}

impl_consensus_encoding!(FileContractDiff, direction, id, contract);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundOutputDiff {
    pub direction: DiffDirection,
    pub id: FundOutputId,
    pub output: FundOutput,
}

impl_consensus_encoding!(FundOutputDiff, direction, id, output);

/// Insertion into or removal from the delayed bucket at `maturity_height`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedOutputDiff {
    pub direction: DiffDirection,
    pub id: CoinOutputId,
    pub output: CoinOutput,
    pub maturity_height: u64,
}

impl_consensus_encoding!(DelayedOutputDiff, direction, id, output, maturity_height);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundPoolDiff {
    pub direction: DiffDirection,
    pub previous: Currency,
    pub adjusted: Currency,
}

impl_consensus_encoding!(FundPoolDiff, direction, previous, adjusted);

macro_rules! impl_inverse {
    ($($type:ident),+) => {
        $(impl $type {
            /// The same mutation viewed from the opposite direction.
            pub fn inverse(&self) -> Self {
                let mut diff = self.clone();
                diff.direction = diff.direction.inverse();
                diff
            }
        })+
    };
}

impl_inverse!(
    CoinOutputDiff,
    FileContractDiff,
    FundOutputDiff,
    DelayedOutputDiff,
    FundPoolDiff
);

/// Every diff produced by one block, in generation order per category.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffSet {
    pub coin_output_diffs: Vec<CoinOutputDiff>,
    pub file_contract_diffs: Vec<FileContractDiff>,
    pub fund_output_diffs: Vec<FundOutputDiff>,
    pub delayed_output_diffs: Vec<DelayedOutputDiff>,
    pub fund_pool_diffs: Vec<FundPoolDiff>,
    /// The Foundation address rotation applied by the block, if any.
    pub foundation_update: Option<FoundationUnlockHashUpdate>,
}

impl_consensus_encoding!(
    DiffSet,
    coin_output_diffs,
    file_contract_diffs,
    fund_output_diffs,
    delayed_output_diffs,
    fund_pool_diffs,
    foundation_update,
);

impl DiffSet {
    pub fn len(&self) -> usize {
        self.coin_output_diffs.len()
            + self.file_contract_diffs.len()
            + self.fund_output_diffs.len()
            + self.delayed_output_diffs.len()
            + self.fund_pool_diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends the diffs needed to undo `other`, latest first.
    pub fn extend_inverted(&mut self, other: &DiffSet) {
        self.coin_output_diffs
            .extend(other.coin_output_diffs.iter().rev().map(CoinOutputDiff::inverse));
        self.file_contract_diffs
            .extend(other.file_contract_diffs.iter().rev().map(FileContractDiff::inverse));
        self.fund_output_diffs
            .extend(other.fund_output_diffs.iter().rev().map(FundOutputDiff::inverse));
        self.delayed_output_diffs
            .extend(other.delayed_output_diffs.iter().rev().map(DelayedOutputDiff::inverse));
        self.fund_pool_diffs
            .extend(other.fund_pool_diffs.iter().rev().map(FundPoolDiff::inverse));
    }

    /// Appends the diffs of `other` unchanged.
    pub fn extend_forward(&mut self, other: &DiffSet) {
        self.coin_output_diffs.extend_from_slice(&other.coin_output_diffs);
        self.file_contract_diffs.extend_from_slice(&other.file_contract_diffs);
        self.fund_output_diffs.extend_from_slice(&other.fund_output_diffs);
        self.delayed_output_diffs.extend_from_slice(&other.delayed_output_diffs);
        self.fund_pool_diffs.extend_from_slice(&other.fund_pool_diffs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{deserialize, serialize};
    use crate::hash::UnlockHash;

    fn coin_diff(direction: DiffDirection, value: u64) -> CoinOutputDiff {
        CoinOutputDiff {
            direction,
            id: CoinOutputId::default(),
            output: CoinOutput {
                value: value.into(),
                unlock_hash: UnlockHash::default(),
            },
        }
    }

    #[test]
    fn test_extend_inverted_reverses_order_and_direction() {
        let mut applied = DiffSet::default();
        applied.coin_output_diffs.push(coin_diff(DiffDirection::Revert, 1));
        applied.coin_output_diffs.push(coin_diff(DiffDirection::Apply, 2));

        let mut undo = DiffSet::default();
        undo.extend_inverted(&applied);

        assert_eq!(
            undo.coin_output_diffs,
            vec![
                coin_diff(DiffDirection::Revert, 2),
                coin_diff(DiffDirection::Apply, 1)
            ]
        );
    }

    #[test]
    fn test_diff_set_persists_foundation_update() {
        let mut set = DiffSet::default();
        set.fund_pool_diffs.push(FundPoolDiff {
            direction: DiffDirection::Apply,
            previous: Currency::ZERO,
            adjusted: Currency::new(10_000),
        });
        set.foundation_update = Some(FoundationUnlockHashUpdate {
            new_primary: UnlockHash::from_byte_array([1; 32]),
            new_failsafe: UnlockHash::from_byte_array([2; 32]),
        });
        assert_eq!(deserialize::<DiffSet>(&serialize(&set)).unwrap(), set);
        assert_eq!(set.len(), 1);
    }
}
