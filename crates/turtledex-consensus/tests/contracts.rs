mod common;

use common::*;
use turtledex_primitives::merkle::{segment_proof, segment_root};
use turtledex_primitives::{
    CoinOutput, Currency, FileContractRevision, FundInput, FundOutput, StorageProof, Transaction,
    testing_unlock_conditions,
};

#[test]
fn test_contract_tax_goes_to_fund_pool() {
    let chain = TestChain::new();
    let (parent, value) = genesis_coin(&chain.params, 0);
    let contract = contract(&chain.params, 300_000, 5, 8, 3);
    let tx = fund_contract(parent, value, 0, contract.clone());
    let id = tx.file_contract_id(0);

    chain.mine(vec![tx]);

    assert_eq!(chain.cs.fund_pool(), Currency::new(10_000));
    assert_eq!(chain.cs.file_contract(&id).unwrap(), Some(contract));
    assert_eq!(chain.cs.file_contract_count().unwrap(), 1);
    chain.assert_consistent();

    // Reverting the block drains the pool again.
    chain.fork(chain.genesis().id(), 2, 1);
    assert_eq!(chain.cs.height(), 2);
    assert_eq!(chain.cs.fund_pool(), Currency::ZERO);
    assert!(chain.cs.file_contract(&id).unwrap().is_none());
    chain.assert_consistent();
}

#[test]
fn test_contract_expires_into_missed_outputs() {
    let chain = TestChain::new();
    let (parent, value) = genesis_coin(&chain.params, 0);
    let contract = contract(&chain.params, 300_000, 3, 5, 3);
    let tx = fund_contract(parent, value, 0, contract.clone());
    let id = tx.file_contract_id(0);
    chain.mine(vec![tx]);

    chain.mine_empty(3);
    assert_eq!(chain.cs.height(), 4);
    assert!(chain.cs.file_contract(&id).unwrap().is_some());

    // The window closes at height 5.
    chain.mine(Vec::new());
    assert!(chain.cs.file_contract(&id).unwrap().is_none());
    let missed = id.storage_proof_output_id(false, 0);
    assert!(chain.cs.coin_output(&missed).unwrap().is_none());
    chain.assert_consistent();

    chain.mine_empty(chain.params.maturity_delay as usize);
    let output = chain.cs.coin_output(&missed).unwrap().unwrap();
    assert_eq!(output, contract.missed_proof_outputs[0]);
    chain.assert_consistent();
}

#[test]
fn test_storage_proof_pays_valid_outputs() {
    let chain = TestChain::new();
    let data = (0..200u8).collect::<Vec<_>>();
    let (parent, value) = genesis_coin(&chain.params, 0);
    let mut contract = contract(&chain.params, 300_000, 3, 6, 3);
    contract.file_size = data.len() as u64;
    contract.merkle_root = segment_root(&data);
    let tx = fund_contract(parent, value, 0, contract.clone());
    let id = tx.file_contract_id(0);
    chain.mine(vec![tx]);
    chain.mine_empty(1);

    // The window opens at height 3, the segment is fixed by block 2.
    let index = chain.cs.storage_proof_segment(&id).unwrap();
    assert!(index < 4);
    let (segment, hash_set) = segment_proof(&data, index as usize).unwrap();
    let proof = Transaction {
        storage_proofs: vec![StorageProof {
            parent_id: id,
            segment,
            hash_set,
        }],
        ..Default::default()
    };
    chain.mine(vec![proof]);

    assert!(chain.cs.file_contract(&id).unwrap().is_none());
    chain.assert_consistent();

    chain.mine_empty(chain.params.maturity_delay as usize);
    let valid = id.storage_proof_output_id(true, 0);
    assert_eq!(
        chain.cs.coin_output(&valid).unwrap(),
        Some(contract.valid_proof_outputs[0].clone())
    );
    assert!(
        chain
            .cs
            .coin_output(&id.storage_proof_output_id(false, 0))
            .unwrap()
            .is_none()
    );
    chain.assert_consistent();
}

#[test]
fn test_empty_file_contract_can_be_proven() {
    let chain = TestChain::new();
    let (parent, value) = genesis_coin(&chain.params, 0);
    let contract = contract(&chain.params, 300_000, 3, 6, 3);
    assert_eq!(contract.file_size, 0);
    let tx = fund_contract(parent, value, 0, contract.clone());
    let id = tx.file_contract_id(0);
    chain.mine(vec![tx]);
    chain.mine_empty(1);

    assert_eq!(chain.cs.storage_proof_segment(&id).unwrap(), 0);
    let proof = Transaction {
        storage_proofs: vec![StorageProof {
            parent_id: id,
            segment: [0u8; 64],
            hash_set: Vec::new(),
        }],
        ..Default::default()
    };
    chain.mine(vec![proof]);
    assert!(chain.cs.file_contract(&id).unwrap().is_none());

    chain.mine_empty(chain.params.maturity_delay as usize);
    assert_eq!(
        chain
            .cs
            .coin_output(&id.storage_proof_output_id(true, 0))
            .unwrap(),
        Some(contract.valid_proof_outputs[0].clone())
    );
    assert!(
        chain
            .cs
            .coin_output(&id.storage_proof_output_id(false, 0))
            .unwrap()
            .is_none()
    );
    chain.assert_consistent();
}

#[test]
fn test_bad_storage_proof_is_rejected() {
    let chain = TestChain::new();
    let data = vec![7u8; 256];
    let (parent, value) = genesis_coin(&chain.params, 0);
    let mut contract = contract(&chain.params, 300_000, 3, 6, 3);
    contract.file_size = data.len() as u64;
    contract.merkle_root = segment_root(&data);
    let tx = fund_contract(parent, value, 0, contract);
    let id = tx.file_contract_id(0);
    chain.mine(vec![tx]);
    chain.mine_empty(1);

    let index = chain.cs.storage_proof_segment(&id).unwrap();
    let (mut segment, hash_set) = segment_proof(&data, index as usize).unwrap();
    segment[0] ^= 1;
    let proof = Transaction {
        storage_proofs: vec![StorageProof {
            parent_id: id,
            segment,
            hash_set,
        }],
        ..Default::default()
    };
    let block = chain.child_block(chain.tip_id(), vec![proof], 0);
    assert!(chain.cs.accept_block(block).unwrap_err().is_invalid_block());
    assert!(chain.cs.file_contract(&id).unwrap().is_some());
}

#[test]
fn test_revision_replaces_contract() {
    let chain = TestChain::new();
    let (parent, value) = genesis_coin(&chain.params, 0);
    let contract = contract(&chain.params, 300_000, 4, 6, 3);
    let tx = fund_contract(parent, value, 0, contract.clone());
    let id = tx.file_contract_id(0);
    chain.mine(vec![tx]);

    let net = contract.valid_proof_outputs[0].value;
    let split = vec![
        CoinOutput {
            value: Currency::new(net.get() - 1_000),
            unlock_hash: unlock_hash(3),
        },
        CoinOutput {
            value: Currency::new(1_000),
            unlock_hash: unlock_hash(4),
        },
    ];
    let revision = FileContractRevision {
        parent_id: id,
        unlock_conditions: testing_unlock_conditions(3),
        new_revision_number: 1,
        new_file_size: 64,
        new_merkle_root: segment_root(&[1u8; 64]),
        new_window_start: 8,
        new_window_end: 10,
        new_valid_proof_outputs: split.clone(),
        new_missed_proof_outputs: split,
        new_unlock_hash: unlock_hash(3),
    };
    let revised = revision.revised(&contract);
    chain.mine(vec![Transaction {
        file_contract_revisions: vec![revision.clone()],
        ..Default::default()
    }]);

    assert_eq!(chain.cs.file_contract(&id).unwrap(), Some(revised));
    chain.assert_consistent();

    // The same revision number cannot be used twice.
    let replay = chain.child_block(
        chain.tip_id(),
        vec![Transaction {
            file_contract_revisions: vec![revision],
            ..Default::default()
        }],
        0,
    );
    assert!(chain.cs.accept_block(replay).unwrap_err().is_invalid_block());
}

#[test]
fn test_fund_claim_pays_pool_growth() {
    let chain = TestChain::new();
    let (parent, value) = genesis_coin(&chain.params, 0);
    chain.mine(vec![fund_contract(
        parent,
        value,
        0,
        contract(&chain.params, 300_000, 5, 8, 3),
    )]);
    assert_eq!(chain.cs.fund_pool(), Currency::new(10_000));

    // Move seed 1's 4_000 fund units; the claim is 10_000 / 10_000 * 4_000.
    let genesis = chain.genesis();
    let fund_parent = genesis.transactions[0].fund_output_id(1);
    let tx = Transaction {
        fund_inputs: vec![FundInput {
            parent_id: fund_parent,
            unlock_conditions: testing_unlock_conditions(1),
            claim_unlock_hash: unlock_hash(11),
        }],
        fund_outputs: vec![FundOutput {
            value: Currency::new(4_000),
            unlock_hash: unlock_hash(12),
            claim_start: Currency::ZERO,
        }],
        ..Default::default()
    };
    let new_fund_output = tx.fund_output_id(0);
    chain.mine(vec![tx]);

    let moved = chain.cs.fund_output(&new_fund_output).unwrap().unwrap();
    assert_eq!(moved.claim_start, Currency::new(10_000));
    assert!(chain.cs.fund_output(&fund_parent).unwrap().is_none());
    chain.assert_consistent();

    chain.mine_empty(chain.params.maturity_delay as usize);
    let claim = chain
        .cs
        .coin_output(&fund_parent.claim_output_id())
        .unwrap()
        .unwrap();
    assert_eq!(claim.value, Currency::new(4_000));
    assert_eq!(claim.unlock_hash, unlock_hash(11));
    chain.assert_consistent();
}
