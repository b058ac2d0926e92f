use crate::block::{Block, Target};
use crate::currency::Currency;
use crate::hash::{BlockId, UnlockHash};
use crate::specifier::SPECIFIER_ED25519;
use crate::transaction::{CoinOutput, FundOutput, Transaction, UnlockConditions, UnlockKey};

/// Number of previous timestamps used to compute the median-time-past.
pub const MEDIAN_TIMESTAMP_WINDOW: usize = 11;

/// Share of every contract payout that goes to the fund pool, in thousandths.
const TAX_PER_MILLE: u128 = 39;

/// Consensus constants of a network.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub name: &'static str,
    /// Blocks an output created by the protocol waits before it becomes spendable.
    pub maturity_delay: u64,
    /// Base units per coin.
    pub coin_precision: Currency,
    /// Coinbase of block 1, in whole coins. Decreases by one coin per block.
    pub initial_coinbase: u64,
    /// Floor of the coinbase, in whole coins.
    pub minimum_coinbase: u64,
    /// Total number of fund units in existence.
    pub fund_count: Currency,
    pub foundation_hardfork_height: u64,
    pub foundation_subsidy_frequency: u64,
    /// Subsidy issued at the hardfork height.
    pub initial_foundation_subsidy: Currency,
    /// Subsidy issued every `foundation_subsidy_frequency` blocks after the hardfork.
    pub foundation_subsidy: Currency,
    pub initial_foundation_unlock_hash: UnlockHash,
    pub initial_foundation_failsafe_unlock_hash: UnlockHash,
    pub genesis_timestamp: u64,
    pub genesis_coin_allocation: Vec<CoinOutput>,
    pub genesis_fund_allocation: Vec<FundOutput>,
    /// Target every block must meet. Difficulty does not adjust.
    pub root_target: Target,
    /// How far ahead of local time a block timestamp may be, in seconds.
    pub max_future_timestamp: u64,
    /// Largest encoded block size accepted, in bytes.
    pub block_size_limit: usize,
}

impl ChainParams {
    /// Production network constants.
    pub fn mainnet() -> Self {
        let coin = Currency::new(10u128.pow(24));
        let per_block = Currency::new(30_000 * 10u128.pow(24));
        let mut root_target = [0u8; 32];
        root_target[4] = 0x20;

        Self {
            name: "mainnet",
            maturity_delay: 144,
            coin_precision: coin,
            initial_coinbase: 300_000,
            minimum_coinbase: 30_000,
            fund_count: Currency::new(10_000),
            foundation_hardfork_height: 298_000,
            foundation_subsidy_frequency: 4_380,
            initial_foundation_subsidy: Currency::new(per_block.get() * 52_560),
            foundation_subsidy: Currency::new(per_block.get() * 4_380),
            initial_foundation_unlock_hash: UnlockHash::from_byte_array(MAINNET_FOUNDATION_PRIMARY),
            initial_foundation_failsafe_unlock_hash: UnlockHash::from_byte_array(
                MAINNET_FOUNDATION_FAILSAFE,
            ),
            genesis_timestamp: 1_433_600_000,
            genesis_coin_allocation: Vec::new(),
            genesis_fund_allocation: vec![
                FundOutput {
                    value: Currency::new(2_000),
                    unlock_hash: UnlockHash::from_byte_array(MAINNET_FUND_HOLDER_A),
                    claim_start: Currency::ZERO,
                },
                FundOutput {
                    value: Currency::new(8_000),
                    unlock_hash: UnlockHash::from_byte_array(MAINNET_FUND_HOLDER_B),
                    claim_start: Currency::ZERO,
                },
            ],
            root_target: Target(root_target),
            max_future_timestamp: 3 * 60 * 60,
            block_size_limit: 2_000_000,
        }
    }

    /// Small constants for local chains and tests: every block meets the target,
    /// outputs mature after three blocks and the Foundation hardfork is at height 5.
    pub fn testing() -> Self {
        Self {
            name: "testing",
            maturity_delay: 3,
            coin_precision: Currency::new(1),
            initial_coinbase: 1_000_000,
            minimum_coinbase: 999_000,
            fund_count: Currency::new(10_000),
            foundation_hardfork_height: 5,
            foundation_subsidy_frequency: 4,
            initial_foundation_subsidy: Currency::new(200_000),
            foundation_subsidy: Currency::new(50_000),
            initial_foundation_unlock_hash: testing_unlock_conditions(100).unlock_hash(),
            initial_foundation_failsafe_unlock_hash: testing_unlock_conditions(101).unlock_hash(),
            genesis_timestamp: 1_700_000_000,
            genesis_coin_allocation: vec![
                CoinOutput {
                    value: Currency::new(1_000_000_000),
                    unlock_hash: testing_unlock_conditions(0).unlock_hash(),
                },
                CoinOutput {
                    value: Currency::new(500_000_000),
                    unlock_hash: testing_unlock_conditions(1).unlock_hash(),
                },
            ],
            genesis_fund_allocation: vec![
                FundOutput {
                    value: Currency::new(6_000),
                    unlock_hash: testing_unlock_conditions(0).unlock_hash(),
                    claim_start: Currency::ZERO,
                },
                FundOutput {
                    value: Currency::new(4_000),
                    unlock_hash: testing_unlock_conditions(1).unlock_hash(),
                    claim_start: Currency::ZERO,
                },
            ],
            root_target: Target([0xff; 32]),
            max_future_timestamp: 3 * 60 * 60,
            block_size_limit: 2_000_000,
        }
    }

    /// Block reward (excluding fees) for the block at `height`.
    pub fn coinbase(&self, height: u64) -> Currency {
        let coins = self
            .initial_coinbase
            .saturating_sub(height)
            .max(self.minimum_coinbase);
        Currency::new(u128::from(coins) * self.coin_precision.get())
    }

    /// Portion of a contract payout that goes to the fund pool.
    ///
    /// Rounded down to a multiple of `fund_count` so every claim divides exactly.
    /// The rate is the same at every height.
    pub fn tax(&self, payout: Currency) -> Option<Currency> {
        let raw = payout.checked_mul(Currency::new(TAX_PER_MILLE))?.get() / 1000;
        let fund_count = self.fund_count.get();
        Some(Currency::new(raw - raw % fund_count))
    }

    pub fn is_foundation_subsidy_height(&self, height: u64) -> bool {
        height >= self.foundation_hardfork_height
            && (height - self.foundation_hardfork_height) % self.foundation_subsidy_frequency == 0
    }

    /// Foundation subsidy issued by the block at `height`, if any.
    pub fn foundation_subsidy_at(&self, height: u64) -> Option<Currency> {
        if !self.is_foundation_subsidy_height(height) {
            return None;
        }
        if height == self.foundation_hardfork_height {
            Some(self.initial_foundation_subsidy)
        } else {
            Some(self.foundation_subsidy)
        }
    }

    /// Heights strictly below `height` at which a Foundation subsidy was issued.
    pub fn foundation_subsidy_heights_before(&self, height: u64) -> impl Iterator<Item = u64> {
        (self.foundation_hardfork_height..height).step_by(self.foundation_subsidy_frequency as usize)
    }

    pub fn genesis_coin_supply(&self) -> Currency {
        Currency::new(
            self.genesis_coin_allocation
                .iter()
                .map(|output| output.value.get())
                .sum(),
        )
    }

    /// Total coins in existence once the block at `height` has been applied.
    pub fn total_supply(&self, height: u64) -> Currency {
        let initial = u128::from(self.initial_coinbase);
        let minimum = u128::from(self.minimum_coinbase);
        let h = u128::from(height);

        // Heights 1..=decaying pay `initial - i`, later heights pay the floor.
        let decaying = h.min(initial.saturating_sub(minimum));
        let decaying_sum = decaying * initial - decaying * (decaying + 1) / 2;
        let floor_sum = (h - decaying) * minimum;
        let coinbase_total = (decaying_sum + floor_sum) * self.coin_precision.get();

        let foundation_total = if height < self.foundation_hardfork_height {
            0
        } else {
            let periodic = u128::from(
                (height - self.foundation_hardfork_height) / self.foundation_subsidy_frequency,
            );
            self.initial_foundation_subsidy.get() + periodic * self.foundation_subsidy.get()
        };

        Currency::new(self.genesis_coin_supply().get() + coinbase_total + foundation_total)
    }

    /// The genesis block: a single transaction creating the initial allocations.
    pub fn genesis_block(&self) -> Block {
        Block {
            parent_id: BlockId::default(),
            nonce: [0; 8],
            timestamp: self.genesis_timestamp,
            miner_payouts: Vec::new(),
            transactions: vec![Transaction {
                coin_outputs: self.genesis_coin_allocation.clone(),
                fund_outputs: self.genesis_fund_allocation.clone(),
                ..Default::default()
            }],
        }
    }
}

/// Keyless unlock conditions used by the testing network. Anyone knowing `seed` can
/// spend outputs sent to their hash.
pub fn testing_unlock_conditions(seed: u8) -> UnlockConditions {
    UnlockConditions {
        timelock: 0,
        public_keys: vec![UnlockKey {
            algorithm: SPECIFIER_ED25519,
            key: vec![seed; 32],
        }],
        signatures_required: 0,
    }
}

const MAINNET_FOUNDATION_PRIMARY: [u8; 32] = [
    0x05, 0x3b, 0x2d, 0xef, 0x3c, 0xbd, 0xd0, 0x78, 0xc1, 0x9d, 0x62, 0xce, 0x2b, 0x4f, 0x0b,
    0x1a, 0x3c, 0x5e, 0x0f, 0xfb, 0xee, 0xef, 0xf0, 0x1c, 0x5a, 0x8c, 0x4c, 0x2a, 0x9b, 0x17,
    0x79, 0x6e,
];
const MAINNET_FOUNDATION_FAILSAFE: [u8; 32] = [
    0x27, 0xc2, 0x2a, 0x6c, 0x6e, 0x6a, 0x3a, 0x91, 0xbd, 0xb6, 0xf1, 0xa2, 0x30, 0xa1, 0x75,
    0x1b, 0x8f, 0x74, 0x6c, 0x49, 0x4b, 0x96, 0x1e, 0x93, 0x4b, 0xe8, 0x8d, 0x6f, 0xc0, 0x64,
    0x9a, 0x8f,
];
const MAINNET_FUND_HOLDER_A: [u8; 32] = [
    0x7d, 0x03, 0x70, 0x83, 0x69, 0x7c, 0x03, 0xd1, 0x94, 0xd1, 0x3b, 0x49, 0x89, 0xc1, 0xd7,
    0xa6, 0x61, 0x2f, 0x39, 0xe5, 0x10, 0x13, 0x30, 0x09, 0x4b, 0x6b, 0xbd, 0x12, 0xb2, 0x87,
    0x4f, 0x44,
];
const MAINNET_FUND_HOLDER_B: [u8; 32] = [
    0xb1, 0x4e, 0x64, 0xbb, 0x23, 0x62, 0x9f, 0x92, 0x5c, 0xe6, 0x3e, 0x7c, 0x1c, 0x96, 0x11,
    0xe0, 0x6b, 0x0f, 0xe0, 0xbf, 0xb1, 0xce, 0x3b, 0x86, 0x2a, 0x16, 0x53, 0x71, 0x89, 0x6e,
    0x9b, 0x27,
];
