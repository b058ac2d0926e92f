//! Storage of the Foundation subsidy addresses.

use crate::{Column, FatalError, LedgerRead, Result, StateTransaction, height_key, meta_keys};
use turtledex_primitives::encoding::serialize;
use turtledex_primitives::{FoundationUnlockHashUpdate, UnlockHash, impl_consensus_encoding};

/// The addresses that currently control the Foundation subsidy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundationAddresses {
    pub primary: UnlockHash,
    pub failsafe: UnlockHash,
}

impl_consensus_encoding!(FoundationAddresses, primary, failsafe);

impl FoundationAddresses {
    /// Whether `unlock_hash` may authorize an address rotation.
    pub fn authorizes(&self, unlock_hash: &UnlockHash) -> bool {
        *unlock_hash == self.primary || *unlock_hash == self.failsafe
    }
}

impl StateTransaction<'_> {
    pub fn set_foundation_unlock_hashes(&mut self, addresses: &FoundationAddresses) {
        self.put_raw(
            Column::Meta,
            meta_keys::FOUNDATION.to_vec(),
            serialize(addresses),
        );
    }

    /// Records the addresses in effect before the update applied at `height`.
    pub fn archive_foundation_unlock_hashes(
        &mut self,
        height: u64,
        prior: &FoundationAddresses,
    ) -> Result<()> {
        if self.archived_foundation_unlock_hashes(height)?.is_some() {
            return Err(FatalError::ArchiveExists(height).into());
        }
        self.put_raw(
            Column::FoundationArchive,
            height_key(height).to_vec(),
            serialize(prior),
        );
        Ok(())
    }

    /// Archives the current addresses under `height` and installs the new ones.
    pub fn apply_foundation_update(
        &mut self,
        height: u64,
        update: &FoundationUnlockHashUpdate,
    ) -> Result<()> {
        let prior = self.foundation_unlock_hashes()?;
        self.archive_foundation_unlock_hashes(height, &prior)?;
        self.set_foundation_unlock_hashes(&FoundationAddresses {
            primary: update.new_primary,
            failsafe: update.new_failsafe,
        });
        tracing::debug!(
            height,
            new_primary = %update.new_primary,
            "Foundation unlock hashes updated"
        );
        Ok(())
    }

    /// Restores the addresses archived at `height` and removes the archive entry.
    pub fn revert_foundation_update(&mut self, height: u64) -> Result<()> {
        let prior = self
            .archived_foundation_unlock_hashes(height)?
            .ok_or(FatalError::MissingArchive(height))?;
        self.set_foundation_unlock_hashes(&prior);
        self.delete_raw(Column::FoundationArchive, height_key(height).to_vec());
        Ok(())
    }
}
