use turtledex_primitives::encoding::encoded_len;
use turtledex_primitives::{Block, ChainParams, Currency, MEDIAN_TIMESTAMP_WINDOW, Target};
use turtledex_state::ProcessedBlock;

/// Block header verification error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The block ID does not meet the target set by its parent.
    #[error("Insufficient proof-of-work, target: {0}")]
    NotEnoughPow(Target),
    #[error("Timestamp {timestamp} is not after the median {median} of the last blocks")]
    TimeTooOld { timestamp: u64, median: u64 },
    #[error("Timestamp {timestamp} is too far in the future (now: {now})")]
    TooFarInFuture { timestamp: u64, now: u64 },
    #[error("Block of {0} bytes exceeds the size limit")]
    BlockTooLarge(usize),
    #[error("Miner payout #{0} has zero value")]
    ZeroPayout(usize),
    #[error("Miner payouts sum to {actual}, expected {expected}")]
    InvalidBlockReward {
        expected: Currency,
        actual: Currency,
    },
    #[error("Arithmetic overflow in block reward")]
    RewardOverflow,
}

/// A struct responsible for verifying blocks before they enter the block index.
#[derive(Debug, Clone)]
pub struct HeaderVerifier {
    params: ChainParams,
}

impl HeaderVerifier {
    /// Constructs a new instance of [`HeaderVerifier`].
    pub fn new(params: ChainParams) -> Self {
        Self { params }
    }

    /// Verifies `block` as a child of `parent`.
    ///
    /// - The block ID meets the parent's child target.
    /// - The timestamp is in the range:
    ///     - Greater than the median of `prev_timestamps` (the parent and its ancestors).
    ///     - Not greater than `now + max_future_timestamp`.
    /// - The encoded block fits in the size limit.
    /// - Miner payouts are non-zero and claim exactly the coinbase plus the fees.
    pub fn verify_header(
        &self,
        block: &Block,
        parent: &ProcessedBlock,
        prev_timestamps: &[u64],
        now: u64,
    ) -> Result<(), Error> {
        if !parent.child_target.is_met_by(&block.id()) {
            return Err(Error::NotEnoughPow(parent.child_target));
        }

        let median = median_timestamp(prev_timestamps);
        if block.timestamp <= median {
            return Err(Error::TimeTooOld {
                timestamp: block.timestamp,
                median,
            });
        }

        if block.timestamp > now.saturating_add(self.params.max_future_timestamp) {
            return Err(Error::TooFarInFuture {
                timestamp: block.timestamp,
                now,
            });
        }

        let size = encoded_len(block);
        if size > self.params.block_size_limit {
            return Err(Error::BlockTooLarge(size));
        }

        self.verify_miner_payouts(block, parent.height + 1)
    }

    fn verify_miner_payouts(&self, block: &Block, height: u64) -> Result<(), Error> {
        if let Some(index) = block.miner_payouts.iter().position(|p| p.value.is_zero()) {
            return Err(Error::ZeroPayout(index));
        }

        let expected = block
            .miner_fee_sum()
            .and_then(|fees| fees.checked_add(self.params.coinbase(height)))
            .ok_or(Error::RewardOverflow)?;
        let actual = block.miner_payout_sum().ok_or(Error::RewardOverflow)?;

        if actual != expected {
            return Err(Error::InvalidBlockReward { expected, actual });
        }

        Ok(())
    }
}

/// Median of the last [`MEDIAN_TIMESTAMP_WINDOW`] timestamps, most recent first.
pub fn median_timestamp(prev_timestamps: &[u64]) -> u64 {
    let mut timestamps = prev_timestamps
        .iter()
        .take(MEDIAN_TIMESTAMP_WINDOW)
        .copied()
        .collect::<Vec<_>>();
    timestamps.sort_unstable();
    timestamps.get(timestamps.len() / 2).copied().unwrap_or(0)
}
