use crate::currency::Currency;
use crate::encoding::{Decodable, Encodable, EncodingError};
use crate::hash::{
    BlockId, CoinOutputId, FileContractId, FundOutputId, Hash256, HashWriter, TransactionId,
    UnlockHash,
};
use crate::impl_consensus_encoding;
use crate::merkle::merkle_root;
use crate::specifier::{
    SPECIFIER_CLAIM_OUTPUT, SPECIFIER_COIN_OUTPUT, SPECIFIER_FILE_CONTRACT, SPECIFIER_FOUNDATION,
    SPECIFIER_FUND_OUTPUT, SPECIFIER_STORAGE_PROOF, Specifier,
};
use std::io::{self, Read, Write};

/// A public key together with the signature algorithm it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockKey {
    pub algorithm: Specifier,
    pub key: Vec<u8>,
}

impl_consensus_encoding!(UnlockKey, algorithm, key);

/// Conditions that must be met to spend an output. Their Merkle root is the
/// output's [`UnlockHash`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnlockConditions {
    /// Height before which the output cannot be spent.
    pub timelock: u64,
    pub public_keys: Vec<UnlockKey>,
    pub signatures_required: u64,
}

impl_consensus_encoding!(UnlockConditions, timelock, public_keys, signatures_required);

impl UnlockConditions {
    pub fn unlock_hash(&self) -> UnlockHash {
        let mut leaves = Vec::with_capacity(self.public_keys.len() + 2);
        leaves.push(crate::encoding::serialize(&self.timelock));
        leaves.extend(self.public_keys.iter().map(crate::encoding::serialize));
        leaves.push(crate::encoding::serialize(&self.signatures_required));
        merkle_root(&leaves).into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinInput {
    pub parent_id: CoinOutputId,
    pub unlock_conditions: UnlockConditions,
}

impl_consensus_encoding!(CoinInput, parent_id, unlock_conditions);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinOutput {
    pub value: Currency,
    pub unlock_hash: UnlockHash,
}

impl_consensus_encoding!(CoinOutput, value, unlock_hash);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundInput {
    pub parent_id: FundOutputId,
    pub unlock_conditions: UnlockConditions,
    /// Address that receives the coin claim released by spending the fund output.
    pub claim_unlock_hash: UnlockHash,
}

impl_consensus_encoding!(FundInput, parent_id, unlock_conditions, claim_unlock_hash);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundOutput {
    pub value: Currency,
    pub unlock_hash: UnlockHash,
    /// Fund pool value at the time the output was created. Zero inside transactions,
    /// stamped by consensus when the output is applied.
    pub claim_start: Currency,
}

impl_consensus_encoding!(FundOutput, value, unlock_hash, claim_start);

/// An agreement to store a file, paid out through either the valid or the missed
/// proof outputs depending on whether a storage proof arrives inside the window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileContract {
    pub file_size: u64,
    pub merkle_root: Hash256,
    pub window_start: u64,
    pub window_end: u64,
    pub payout: Currency,
    pub valid_proof_outputs: Vec<CoinOutput>,
    pub missed_proof_outputs: Vec<CoinOutput>,
    pub unlock_hash: UnlockHash,
    pub revision_number: u64,
}

impl_consensus_encoding!(
    FileContract,
    file_size,
    merkle_root,
    window_start,
    window_end,
    payout,
    valid_proof_outputs,
    missed_proof_outputs,
    unlock_hash,
    revision_number,
);

impl FileContract {
    pub fn valid_proof_sum(&self) -> Option<Currency> {
        Currency::checked_sum(self.valid_proof_outputs.iter().map(|output| output.value))
    }

    pub fn missed_proof_sum(&self) -> Option<Currency> {
        Currency::checked_sum(self.missed_proof_outputs.iter().map(|output| output.value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContractRevision {
    pub parent_id: FileContractId,
    pub unlock_conditions: UnlockConditions,
    pub new_revision_number: u64,
    pub new_file_size: u64,
    pub new_merkle_root: Hash256,
    pub new_window_start: u64,
    pub new_window_end: u64,
    pub new_valid_proof_outputs: Vec<CoinOutput>,
    pub new_missed_proof_outputs: Vec<CoinOutput>,
    pub new_unlock_hash: UnlockHash,
}

impl_consensus_encoding!(
    FileContractRevision,
    parent_id,
    unlock_conditions,
    new_revision_number,
    new_file_size,
    new_merkle_root,
    new_window_start,
    new_window_end,
    new_valid_proof_outputs,
    new_missed_proof_outputs,
    new_unlock_hash,
);

impl FileContractRevision {
    /// The contract that results from applying this revision to `contract`. The
    /// payout never changes.
    pub fn revised(&self, contract: &FileContract) -> FileContract {
        FileContract {
            file_size: self.new_file_size,
            merkle_root: self.new_merkle_root,
            window_start: self.new_window_start,
            window_end: self.new_window_end,
            payout: contract.payout,
            valid_proof_outputs: self.new_valid_proof_outputs.clone(),
            missed_proof_outputs: self.new_missed_proof_outputs.clone(),
            unlock_hash: self.new_unlock_hash,
            revision_number: self.new_revision_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageProof {
    pub parent_id: FileContractId,
    pub segment: [u8; crate::merkle::SEGMENT_SIZE],
    pub hash_set: Vec<Hash256>,
}

impl_consensus_encoding!(StorageProof, parent_id, segment, hash_set);

/// A signature over a transaction. Signatures are carried and hashed into the block
/// but are not part of the transaction ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSignature {
    pub parent_id: Hash256,
    pub public_key_index: u64,
    pub timelock: u64,
    pub whole_transaction: bool,
    pub signature: Vec<u8>,
}

impl_consensus_encoding!(
    TransactionSignature,
    parent_id,
    public_key_index,
    timelock,
    whole_transaction,
    signature,
);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    pub coin_inputs: Vec<CoinInput>,
    pub coin_outputs: Vec<CoinOutput>,
    pub file_contracts: Vec<FileContract>,
    pub file_contract_revisions: Vec<FileContractRevision>,
    pub storage_proofs: Vec<StorageProof>,
    pub fund_inputs: Vec<FundInput>,
    pub fund_outputs: Vec<FundOutput>,
    pub miner_fees: Vec<Currency>,
    pub arbitrary_data: Vec<Vec<u8>>,
    pub signatures: Vec<TransactionSignature>,
}

impl Transaction {
    /// Encodes every field except the signatures.
    pub fn encode_no_signatures<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        Ok(self.coin_inputs.consensus_encode(writer)?
            + self.coin_outputs.consensus_encode(writer)?
            + self.file_contracts.consensus_encode(writer)?
            + self.file_contract_revisions.consensus_encode(writer)?
            + self.storage_proofs.consensus_encode(writer)?
            + self.fund_inputs.consensus_encode(writer)?
            + self.fund_outputs.consensus_encode(writer)?
            + self.miner_fees.consensus_encode(writer)?
            + self.arbitrary_data.consensus_encode(writer)?)
    }

    pub fn id(&self) -> TransactionId {
        let mut writer = HashWriter::new();
        let _ = self.encode_no_signatures(&mut writer);
        writer.finalize().into()
    }

    fn derived_id(&self, specifier: &Specifier, index: u64) -> Hash256 {
        let mut writer = HashWriter::new();
        writer.encode(specifier);
        let _ = self.encode_no_signatures(&mut writer);
        writer.encode(&index);
        writer.finalize()
    }

    pub fn coin_output_id(&self, index: u64) -> CoinOutputId {
        self.derived_id(&SPECIFIER_COIN_OUTPUT, index).into()
    }

    pub fn file_contract_id(&self, index: u64) -> FileContractId {
        self.derived_id(&SPECIFIER_FILE_CONTRACT, index).into()
    }

    pub fn fund_output_id(&self, index: u64) -> FundOutputId {
        self.derived_id(&SPECIFIER_FUND_OUTPUT, index).into()
    }

    /// Total value leaving the transaction through coin outputs, contract payouts and
    /// miner fees.
    pub fn coin_spend_sum(&self) -> Option<Currency> {
        let outputs = self.coin_outputs.iter().map(|output| output.value);
        let payouts = self.file_contracts.iter().map(|contract| contract.payout);
        let fees = self.miner_fees.iter().copied();
        Currency::checked_sum(outputs.chain(payouts).chain(fees))
    }

    pub fn fund_output_sum(&self) -> Option<Currency> {
        Currency::checked_sum(self.fund_outputs.iter().map(|output| output.value))
    }

    pub fn miner_fee_sum(&self) -> Option<Currency> {
        Currency::checked_sum(self.miner_fees.iter().copied())
    }
}

impl Encodable for Transaction {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        Ok(self.encode_no_signatures(writer)? + self.signatures.consensus_encode(writer)?)
    }
}

impl Decodable for Transaction {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        Ok(Self {
            coin_inputs: Decodable::consensus_decode(reader)?,
            coin_outputs: Decodable::consensus_decode(reader)?,
            file_contracts: Decodable::consensus_decode(reader)?,
            file_contract_revisions: Decodable::consensus_decode(reader)?,
            storage_proofs: Decodable::consensus_decode(reader)?,
            fund_inputs: Decodable::consensus_decode(reader)?,
            fund_outputs: Decodable::consensus_decode(reader)?,
            miner_fees: Decodable::consensus_decode(reader)?,
            arbitrary_data: Decodable::consensus_decode(reader)?,
            signatures: Decodable::consensus_decode(reader)?,
        })
    }
}

impl FileContractId {
    /// ID of the `index`th output paid out when the contract resolves.
    pub fn storage_proof_output_id(&self, proof_valid: bool, index: u64) -> CoinOutputId {
        let mut writer = HashWriter::new();
        writer
            .encode(&SPECIFIER_STORAGE_PROOF)
            .encode(self)
            .encode(&proof_valid)
            .encode(&index);
        writer.finalize().into()
    }
}

impl FundOutputId {
    /// ID of the delayed coin output released when this fund output is spent.
    pub fn claim_output_id(&self) -> CoinOutputId {
        let mut writer = HashWriter::new();
        writer.encode(&SPECIFIER_CLAIM_OUTPUT).encode(self);
        writer.finalize().into()
    }
}

impl BlockId {
    pub fn miner_payout_id(&self, index: u64) -> CoinOutputId {
        let mut writer = HashWriter::new();
        writer.encode(self).encode(&index);
        writer.finalize().into()
    }

    pub fn foundation_subsidy_id(&self) -> CoinOutputId {
        let mut writer = HashWriter::new();
        writer.encode(self).encode(&SPECIFIER_FOUNDATION);
        writer.finalize().into()
    }
}
