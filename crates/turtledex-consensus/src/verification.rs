//! Block and transaction validity rules.
//!
//! Header checks run once when a block enters the block index. Transaction checks
//! run while the block is applied, against the state left by every earlier
//! transaction of the same block.

mod header_verifier;
mod tx_verify;

pub use header_verifier::{Error as HeaderError, HeaderVerifier, median_timestamp};
pub use tx_verify::{
    Error as TxError, check_transaction_sanity, storage_proof_segment, verify_transaction,
};
