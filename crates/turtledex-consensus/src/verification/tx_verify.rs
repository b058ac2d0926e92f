use std::collections::HashSet;
use turtledex_primitives::hash::HashWriter;
use turtledex_primitives::merkle::{num_segments, verify_segment};
use turtledex_primitives::{
    ArbitraryData, ChainParams, CoinOutputId, Currency, EncodingError, FileContractId,
    FundOutputId, Hash256, Transaction, UnlockConditions, UnlockHash,
};
use turtledex_state::LedgerRead;

/// Transaction verification error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Object {0} is spent more than once")]
    DoubleSpend(Hash256),
    #[error("Transaction creates a zero-value output")]
    ZeroValueOutput,
    #[error("Fund output #{0} has a non-zero claim start")]
    NonZeroClaimStart(usize),
    #[error("File contract #{0} has an empty or inverted proof window")]
    InvalidContractWindow(usize),
    #[error("File contract #{0} does not pay out its payout minus tax on both outcomes")]
    InvalidContractPayout(usize),
    #[error("Storage proofs must not share a transaction with outputs, contracts or revisions")]
    StorageProofWithOutputs,
    #[error("Malformed arbitrary data: {0}")]
    InvalidArbitraryData(EncodingError),
    #[error("Coin output {0} does not exist")]
    MissingCoinOutput(CoinOutputId),
    #[error("Fund output {0} does not exist")]
    MissingFundOutput(FundOutputId),
    #[error("File contract {0} does not exist")]
    MissingFileContract(FileContractId),
    #[error("Unlock conditions hash to {actual}, expected {expected}")]
    UnlockHashMismatch {
        expected: UnlockHash,
        actual: UnlockHash,
    },
    #[error("Unlock conditions are timelocked until height {0}")]
    Timelocked(u64),
    #[error("Coin inputs of {inputs} do not match spends of {outputs}")]
    CoinValueMismatch { inputs: Currency, outputs: Currency },
    #[error("Fund inputs of {inputs} do not match fund outputs of {outputs}")]
    FundValueMismatch { inputs: Currency, outputs: Currency },
    #[error("File contract #{index} opens its proof window at {window_start}, not after height {height}")]
    ContractWindowPassed {
        index: usize,
        window_start: u64,
        height: u64,
    },
    #[error("File contract {0} can no longer be revised")]
    RevisionWindowClosed(FileContractId),
    #[error("Revision of {0} does not increase the revision number")]
    RevisionNumberNotIncreasing(FileContractId),
    #[error("Revision of {0} changes the contract payout")]
    RevisionPayoutChanged(FileContractId),
    #[error("Revision of {0} has an empty or inverted proof window")]
    InvalidRevisionWindow(FileContractId),
    #[error("File contract {0} is outside its proof window")]
    ProofWindowClosed(FileContractId),
    #[error("Storage proof for {0} does not verify")]
    InvalidStorageProof(FileContractId),
    #[error("Foundation update is not authorized by the current Foundation addresses")]
    UnauthorizedFoundationUpdate,
    #[error("Arithmetic overflow in transaction values")]
    Overflow,
    #[error(transparent)]
    State(#[from] turtledex_state::Error),
}

/// Context free checks on a transaction included in a block at `height`.
pub fn check_transaction_sanity(
    tx: &Transaction,
    height: u64,
    params: &ChainParams,
) -> Result<(), Error> {
    // Check for repeated spends. Revisions and proofs share one namespace, a
    // contract can be touched once per transaction.
    let mut seen = HashSet::new();
    let spent = tx
        .coin_inputs
        .iter()
        .map(|input| input.parent_id.0)
        .chain(tx.fund_inputs.iter().map(|input| input.parent_id.0))
        .chain(tx.file_contract_revisions.iter().map(|rev| rev.parent_id.0))
        .chain(tx.storage_proofs.iter().map(|proof| proof.parent_id.0));
    for id in spent {
        if !seen.insert(id) {
            return Err(Error::DoubleSpend(Hash256::from_byte_array(id)));
        }
    }

    let zero_output = tx.coin_outputs.iter().any(|output| output.value.is_zero())
        || tx.fund_outputs.iter().any(|output| output.value.is_zero())
        || tx.file_contracts.iter().any(|contract| contract.payout.is_zero());
    if zero_output {
        return Err(Error::ZeroValueOutput);
    }

    if let Some(index) = tx
        .fund_outputs
        .iter()
        .position(|output| !output.claim_start.is_zero())
    {
        return Err(Error::NonZeroClaimStart(index));
    }

    for (index, contract) in tx.file_contracts.iter().enumerate() {
        if contract.window_start >= contract.window_end {
            return Err(Error::InvalidContractWindow(index));
        }
        let expected = params
            .tax(contract.payout)
            .and_then(|tax| contract.payout.checked_sub(tax))
            .ok_or(Error::InvalidContractPayout(index))?;
        if contract.valid_proof_sum() != Some(expected)
            || contract.missed_proof_sum() != Some(expected)
        {
            return Err(Error::InvalidContractPayout(index));
        }
    }

    let has_outputs = !tx.coin_outputs.is_empty()
        || !tx.file_contracts.is_empty()
        || !tx.file_contract_revisions.is_empty()
        || !tx.fund_outputs.is_empty();
    if !tx.storage_proofs.is_empty() && has_outputs {
        return Err(Error::StorageProofWithOutputs);
    }

    if height >= params.foundation_hardfork_height {
        for data in &tx.arbitrary_data {
            ArbitraryData::decode(data).map_err(Error::InvalidArbitraryData)?;
        }
    }

    Ok(())
}

fn check_unlock_conditions(
    conditions: &UnlockConditions,
    expected: UnlockHash,
    height: u64,
) -> Result<(), Error> {
    let actual = conditions.unlock_hash();
    if actual != expected {
        return Err(Error::UnlockHashMismatch { expected, actual });
    }
    if conditions.timelock > height {
        return Err(Error::Timelocked(conditions.timelock));
    }
    Ok(())
}

/// Checks `tx` against the ledger it is about to be applied to, at `height`.
///
/// Signatures are not checked here.
pub fn verify_transaction<S: LedgerRead + ?Sized>(
    state: &S,
    tx: &Transaction,
    height: u64,
) -> Result<(), Error> {
    let mut coin_inputs = Currency::ZERO;
    for input in &tx.coin_inputs {
        let output = state
            .coin_output(&input.parent_id)?
            .ok_or(Error::MissingCoinOutput(input.parent_id))?;
        check_unlock_conditions(&input.unlock_conditions, output.unlock_hash, height)?;
        coin_inputs = coin_inputs
            .checked_add(output.value)
            .ok_or(Error::Overflow)?;
    }
    let coin_outputs = tx.coin_spend_sum().ok_or(Error::Overflow)?;
    if coin_inputs != coin_outputs {
        return Err(Error::CoinValueMismatch {
            inputs: coin_inputs,
            outputs: coin_outputs,
        });
    }

    let mut fund_inputs = Currency::ZERO;
    for input in &tx.fund_inputs {
        let output = state
            .fund_output(&input.parent_id)?
            .ok_or(Error::MissingFundOutput(input.parent_id))?;
        check_unlock_conditions(&input.unlock_conditions, output.unlock_hash, height)?;
        fund_inputs = fund_inputs
            .checked_add(output.value)
            .ok_or(Error::Overflow)?;
    }
    let fund_outputs = tx.fund_output_sum().ok_or(Error::Overflow)?;
    if fund_inputs != fund_outputs {
        return Err(Error::FundValueMismatch {
            inputs: fund_inputs,
            outputs: fund_outputs,
        });
    }

    for (index, contract) in tx.file_contracts.iter().enumerate() {
        if contract.window_start <= height {
            return Err(Error::ContractWindowPassed {
                index,
                window_start: contract.window_start,
                height,
            });
        }
    }

    for revision in &tx.file_contract_revisions {
        let id = revision.parent_id;
        let contract = state
            .file_contract(&id)?
            .ok_or(Error::MissingFileContract(id))?;
        if height >= contract.window_start || revision.new_window_start <= height {
            return Err(Error::RevisionWindowClosed(id));
        }
        if revision.new_window_start >= revision.new_window_end {
            return Err(Error::InvalidRevisionWindow(id));
        }
        if revision.new_revision_number <= contract.revision_number {
            return Err(Error::RevisionNumberNotIncreasing(id));
        }
        check_unlock_conditions(&revision.unlock_conditions, contract.unlock_hash, height)?;

        let revised = revision.revised(&contract);
        let payout = contract.valid_proof_sum();
        if revised.valid_proof_sum() != payout || revised.missed_proof_sum() != payout {
            return Err(Error::RevisionPayoutChanged(id));
        }
    }

    for proof in &tx.storage_proofs {
        let id = proof.parent_id;
        let contract = state
            .file_contract(&id)?
            .ok_or(Error::MissingFileContract(id))?;
        if height < contract.window_start || height >= contract.window_end {
            return Err(Error::ProofWindowClosed(id));
        }
        let index = storage_proof_segment(state, &id)?;
        if contract.file_size > 0
            && !verify_segment(
                &proof.segment,
                &proof.hash_set,
                contract.file_size,
                index,
                &contract.merkle_root,
            )
        {
            return Err(Error::InvalidStorageProof(id));
        }
    }

    verify_foundation_authorization(state, tx, height)
}

fn verify_foundation_authorization<S: LedgerRead + ?Sized>(
    state: &S,
    tx: &Transaction,
    height: u64,
) -> Result<(), Error> {
    if height < state.params().foundation_hardfork_height {
        return Ok(());
    }

    let has_update = tx.arbitrary_data.iter().any(|data| {
        matches!(
            ArbitraryData::decode(data),
            Ok(ArbitraryData::FoundationUpdate(_))
        )
    });
    if !has_update {
        return Ok(());
    }

    let addresses = state.foundation_unlock_hashes()?;
    let authorized = tx
        .coin_inputs
        .iter()
        .any(|input| addresses.authorizes(&input.unlock_conditions.unlock_hash()));
    if !authorized {
        return Err(Error::UnauthorizedFoundationUpdate);
    }

    Ok(())
}

/// Index of the segment a storage proof for contract `id` must prove.
///
/// Derived from the canonical block just before the proof window opens, so it is
/// unknown to the host until the window is about to open.
pub fn storage_proof_segment<S: LedgerRead + ?Sized>(
    state: &S,
    id: &FileContractId,
) -> Result<u64, Error> {
    let contract = state
        .file_contract(id)?
        .ok_or(Error::MissingFileContract(*id))?;
    let trigger_height = contract
        .window_start
        .checked_sub(1)
        .ok_or(Error::ProofWindowClosed(*id))?;
    let trigger_block = state
        .block_id_at(trigger_height)?
        .ok_or(Error::ProofWindowClosed(*id))?;

    let mut writer = HashWriter::new();
    writer.encode(&trigger_block).encode(id);
    let seed = writer.finalize();

    // Big-endian reduction of the full 256-bit seed.
    let modulus = u128::from(num_segments(contract.file_size));
    let index = seed
        .as_bytes()
        .iter()
        .fold(0u128, |acc, byte| ((acc << 8) | u128::from(*byte)) % modulus);

    Ok(index as u64)
}
