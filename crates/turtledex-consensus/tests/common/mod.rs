#![allow(dead_code)]

use tempfile::TempDir;
use turtledex_consensus::{ConsensusSet, ImportStatus};
use turtledex_primitives::{
    ArbitraryData, Block, BlockId, ChainParams, CoinInput, CoinOutput, CoinOutputId, Currency,
    FileContract, FoundationUnlockHashUpdate, Hash256, Transaction, UnlockHash,
    testing_unlock_conditions,
};
use turtledex_state::LedgerRead;

/// A consensus set on the testing network in a temporary directory.
pub struct TestChain {
    pub cs: ConsensusSet,
    pub params: ChainParams,
    _dir: TempDir,
}

impl TestChain {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let params = ChainParams::testing();
        let cs = ConsensusSet::new(dir.path(), params.clone()).unwrap();
        Self {
            cs,
            params,
            _dir: dir,
        }
    }

    pub fn tip_id(&self) -> BlockId {
        self.cs.tip().id
    }

    /// Builds a child of `parent` paying the exact reward to `miner`.
    ///
    /// `salt` goes into the nonce, so siblings with the same content differ.
    pub fn child_block(
        &self,
        parent: BlockId,
        transactions: Vec<Transaction>,
        salt: u8,
    ) -> Block {
        let parent = self
            .cs
            .ledger()
            .processed_block(&parent)
            .unwrap()
            .expect("Parent must be known");
        let height = parent.height + 1;
        let fees = transactions
            .iter()
            .map(|tx| tx.miner_fee_sum().unwrap().get())
            .sum::<u128>();
        Block {
            parent_id: parent.id(),
            nonce: [salt, 0, 0, 0, 0, 0, 0, 0],
            timestamp: parent.block.timestamp + 1,
            miner_payouts: vec![CoinOutput {
                value: Currency::new(self.params.coinbase(height).get() + fees),
                unlock_hash: miner_unlock_hash(),
            }],
            transactions,
        }
    }

    /// Accepts `block`, expecting it to become the tip.
    pub fn accept(&self, block: Block) -> ImportStatus {
        let status = self.cs.accept_block(block).unwrap();
        assert!(
            matches!(status, ImportStatus::Imported { .. }),
            "Unexpected import status {status:?}"
        );
        status
    }

    /// Mines a block with `transactions` on top of the tip.
    pub fn mine(&self, transactions: Vec<Transaction>) -> Block {
        let block = self.child_block(self.tip_id(), transactions, 0);
        self.accept(block.clone());
        block
    }

    /// Mines `count` empty blocks on top of the tip.
    pub fn mine_empty(&self, count: usize) -> Vec<Block> {
        (0..count).map(|_| self.mine(Vec::new())).collect()
    }

    /// Builds a chain of `count` empty blocks on `parent` and submits each of them,
    /// whatever the outcome.
    pub fn fork(&self, parent: BlockId, count: usize, salt: u8) -> Vec<Block> {
        let mut parent = parent;
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            let block = self.child_block(parent, Vec::new(), salt);
            let _ = self.cs.accept_block(block.clone());
            parent = block.id();
            blocks.push(block);
        }
        blocks
    }

    pub fn genesis(&self) -> Block {
        self.params.genesis_block()
    }

    pub fn assert_consistent(&self) {
        self.cs.check_consistency().unwrap();
    }
}

pub fn miner_unlock_hash() -> UnlockHash {
    testing_unlock_conditions(200).unlock_hash()
}

pub fn unlock_hash(seed: u8) -> UnlockHash {
    testing_unlock_conditions(seed).unlock_hash()
}

/// ID and value of the genesis coin output owned by `seed` 0 or 1.
pub fn genesis_coin(params: &ChainParams, index: u64) -> (CoinOutputId, Currency) {
    let genesis = params.genesis_block();
    let tx = &genesis.transactions[0];
    (tx.coin_output_id(index), tx.coin_outputs[index as usize].value)
}

/// Spends `parent` (worth `value`, owned by `owner`) into `outputs`, returning any
/// change to the owner.
pub fn spend(
    parent: CoinOutputId,
    value: Currency,
    owner: u8,
    outputs: Vec<CoinOutput>,
) -> Transaction {
    let spent = outputs.iter().map(|output| output.value.get()).sum::<u128>();
    let mut coin_outputs = outputs;
    let change = value.get() - spent;
    if change > 0 {
        coin_outputs.push(CoinOutput {
            value: Currency::new(change),
            unlock_hash: unlock_hash(owner),
        });
    }
    Transaction {
        coin_inputs: vec![CoinInput {
            parent_id: parent,
            unlock_conditions: testing_unlock_conditions(owner),
        }],
        coin_outputs,
        ..Default::default()
    }
}

/// A contract funded with `payout` whose both outcomes pay `payout - tax` to
/// `beneficiary`.
pub fn contract(
    params: &ChainParams,
    payout: u128,
    window_start: u64,
    window_end: u64,
    beneficiary: u8,
) -> FileContract {
    let payout = Currency::new(payout);
    let net = payout.checked_sub(params.tax(payout).unwrap()).unwrap();
    let output = CoinOutput {
        value: net,
        unlock_hash: unlock_hash(beneficiary),
    };
    FileContract {
        file_size: 0,
        merkle_root: Hash256::default(),
        window_start,
        window_end,
        payout,
        valid_proof_outputs: vec![output.clone()],
        missed_proof_outputs: vec![output],
        unlock_hash: unlock_hash(beneficiary),
        revision_number: 0,
    }
}

/// Spends `parent` into a single contract, returning the change to the owner.
pub fn fund_contract(
    parent: CoinOutputId,
    value: Currency,
    owner: u8,
    contract: FileContract,
) -> Transaction {
    let change = value.get() - contract.payout.get();
    Transaction {
        coin_inputs: vec![CoinInput {
            parent_id: parent,
            unlock_conditions: testing_unlock_conditions(owner),
        }],
        coin_outputs: vec![CoinOutput {
            value: Currency::new(change),
            unlock_hash: unlock_hash(owner),
        }],
        file_contracts: vec![contract],
        ..Default::default()
    }
}

pub fn foundation_update(primary: u8, failsafe: u8) -> FoundationUnlockHashUpdate {
    FoundationUnlockHashUpdate {
        new_primary: unlock_hash(primary),
        new_failsafe: unlock_hash(failsafe),
    }
}

pub fn foundation_data(update: &FoundationUnlockHashUpdate) -> Vec<u8> {
    ArbitraryData::encode_foundation_update(update)
}
