//! Change Notifier.
//!
//! Every block acceptance that moves the canonical chain appends one entry to the
//! persisted changelog. Subscribers receive each entry as a [`ConsensusChange`] in
//! changelog order, first the backlog from their resume point, then live changes.

use crate::error::ConsensusError;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use turtledex_primitives::{BlockId, ChangeId, Currency, DiffSet, FoundationUnlockHashUpdate, Target};
use turtledex_state::{ChangeEntry, FatalError, FoundationAddresses, LedgerRead};

/// A consensus change as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusChange {
    pub id: ChangeId,
    /// Position of the change in the changelog.
    pub seq: u64,
    /// Blocks removed from the canonical chain, highest first.
    pub reverted_blocks: Vec<BlockId>,
    /// Blocks added to the canonical chain, lowest first.
    pub applied_blocks: Vec<BlockId>,
    /// Diffs of the reverted blocks, inverted and in reverse order, followed by the
    /// diffs of the applied blocks.
    pub diffs: DiffSet,
    /// Foundation updates reverted by this change, most recent first.
    pub reverted_foundation_updates: Vec<FoundationUnlockHashUpdate>,
    /// Foundation updates applied by this change, in chain order.
    pub applied_foundation_updates: Vec<FoundationUnlockHashUpdate>,
    /// Height of the canonical tip after the change.
    pub block_height: u64,
    /// Target the block after the new tip must meet.
    pub child_target: Target,
    pub fund_pool: Currency,
    pub foundation: FoundationAddresses,
    /// Whether the node considered itself synced when the change was delivered.
    pub synced: bool,
}

impl ConsensusChange {
    /// Expands a changelog entry into the change a subscriber sees.
    pub fn from_entry<S: LedgerRead + ?Sized>(
        state: &S,
        seq: u64,
        entry: ChangeEntry,
    ) -> Result<Self, ConsensusError> {
        let mut diffs = DiffSet::default();
        let mut reverted_foundation_updates = Vec::new();
        let mut applied_foundation_updates = Vec::new();

        for id in &entry.reverted_blocks {
            let block = load_block(state, id)?;
            diffs.extend_inverted(&block.diffs);
            reverted_foundation_updates.extend(block.diffs.foundation_update);
        }

        let mut tip = None;
        for id in &entry.applied_blocks {
            let block = load_block(state, id)?;
            diffs.extend_forward(&block.diffs);
            applied_foundation_updates.extend(block.diffs.foundation_update);
            tip = Some((block.height, block.child_target));
        }

        let (block_height, child_target) = tip.ok_or_else(|| {
            turtledex_state::Error::from(FatalError::Inconsistent(format!(
                "Change #{seq} applies no blocks"
            )))
        })?;

        Ok(Self {
            id: entry.id(),
            seq,
            reverted_blocks: entry.reverted_blocks,
            applied_blocks: entry.applied_blocks,
            diffs,
            reverted_foundation_updates,
            applied_foundation_updates,
            block_height,
            child_target,
            fund_pool: entry.fund_pool,
            foundation: entry.foundation,
            synced: state.synced()?,
        })
    }
}

fn load_block<S: LedgerRead + ?Sized>(
    state: &S,
    id: &BlockId,
) -> Result<turtledex_state::ProcessedBlock, ConsensusError> {
    state
        .processed_block(id)?
        .ok_or_else(|| turtledex_state::Error::from(FatalError::MissingBlock(*id)).into())
}

/// Where a new subscription starts in the changelog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// Replay every change, starting with the genesis block.
    Beginning,
    /// Skip the backlog and receive only changes made after subscribing.
    Recent,
    /// Replay every change made after the given one.
    From(ChangeId),
}

/// Handle identifying a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    sender: UnboundedSender<ConsensusChange>,
}

/// Fans consensus changes out to subscribers.
///
/// The notifier holds no changelog of its own. The caller must serialize
/// [`ChangeNotifier::subscribe`] with [`ChangeNotifier::notify`], otherwise a change
/// could be committed between the backlog replay and the registration and never be
/// delivered.
#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    /// Registers a subscriber, first queueing the backlog selected by `resume`.
    pub fn subscribe<S: LedgerRead + ?Sized>(
        &self,
        state: &S,
        resume: ResumePoint,
    ) -> Result<(SubscriptionId, UnboundedReceiver<ConsensusChange>), ConsensusError> {
        let change_count = state.change_count()?;
        let start = match resume {
            ResumePoint::Beginning => 0,
            ResumePoint::Recent => change_count,
            ResumePoint::From(id) => {
                state
                    .change_seq(&id)?
                    .ok_or(ConsensusError::UnknownChange(id))?
                    + 1
            }
        };

        let (sender, receiver) = unbounded();
        for seq in start..change_count {
            let entry = state.change_entry(seq)?.ok_or_else(|| {
                turtledex_state::Error::from(FatalError::Inconsistent(format!(
                    "Changelog has no entry #{seq}"
                )))
            })?;
            // The receiver is still in hand, the send cannot fail.
            let _ = sender.unbounded_send(ConsensusChange::from_entry(state, seq, entry)?);
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscriber { id, sender });

        tracing::debug!(
            "New consensus subscriber {id:?}, replayed {} changes",
            change_count - start
        );

        Ok((id, receiver))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|subscriber| subscriber.id != id);
    }

    /// Delivers `change` to every subscriber, dropping those whose receiver is gone.
    pub fn notify(&self, change: &ConsensusChange) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| {
            let delivered = subscriber.sender.unbounded_send(change.clone()).is_ok();
            if !delivered {
                tracing::debug!("Dropping closed consensus subscriber {:?}", subscriber.id);
            }
            delivered
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
