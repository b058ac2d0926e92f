mod common;

use common::*;
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use turtledex_consensus::{ConsensusChange, ConsensusError, ResumePoint};
use turtledex_primitives::{ChangeId, Currency, DiffDirection};

fn drain(receiver: &mut UnboundedReceiver<ConsensusChange>) -> Vec<ConsensusChange> {
    let mut changes = Vec::new();
    while let Ok(Some(change)) = receiver.try_next() {
        changes.push(change);
    }
    changes
}

#[test]
fn test_subscribe_from_beginning_replays_genesis() {
    let chain = TestChain::new();
    let (_id, mut receiver) = chain.cs.subscribe(ResumePoint::Beginning).unwrap();

    let changes = drain(&mut receiver);
    assert_eq!(changes.len(), 1);
    let genesis = &changes[0];
    assert_eq!(genesis.seq, 0);
    assert!(genesis.reverted_blocks.is_empty());
    assert_eq!(genesis.applied_blocks, vec![chain.genesis().id()]);
    assert_eq!(genesis.block_height, 0);
    assert_eq!(genesis.diffs.coin_output_diffs.len(), 2);
    assert_eq!(genesis.diffs.fund_output_diffs.len(), 2);

    let block = chain.mine(Vec::new());
    let changes = drain(&mut receiver);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].seq, 1);
    assert_eq!(changes[0].applied_blocks, vec![block.id()]);
    assert_eq!(changes[0].block_height, 1);
    assert_eq!(changes[0].child_target, chain.params.root_target);
    assert_eq!(changes[0].diffs.delayed_output_diffs.len(), 1);
}

#[test]
fn test_resume_after_change() {
    let chain = TestChain::new();
    chain.mine_empty(3);

    let (_id, mut receiver) = chain.cs.subscribe(ResumePoint::Beginning).unwrap();
    let all = drain(&mut receiver);
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|pair| pair[0].seq + 1 == pair[1].seq));

    let (_id, mut resumed) = chain.cs.subscribe(ResumePoint::From(all[1].id)).unwrap();
    let replayed = drain(&mut resumed);
    assert_eq!(replayed, all[2..].to_vec());

    let (_id, mut recent) = chain.cs.subscribe(ResumePoint::Recent).unwrap();
    assert!(drain(&mut recent).is_empty());
    chain.mine(Vec::new());
    assert_eq!(drain(&mut recent).len(), 1);
    assert_eq!(drain(&mut resumed).len(), 1);
}

#[test]
fn test_unknown_resume_point_is_rejected() {
    let chain = TestChain::new();
    let unknown = ChangeId::from_byte_array([3; 32]);
    assert!(matches!(
        chain.cs.subscribe(ResumePoint::From(unknown)),
        Err(ConsensusError::UnknownChange(id)) if id == unknown
    ));
}

#[test]
fn test_reorg_change_inverts_reverted_diffs() {
    let chain = TestChain::new();
    let (parent, value) = genesis_coin(&chain.params, 0);
    chain.mine(vec![fund_contract(
        parent,
        value,
        0,
        contract(&chain.params, 300_000, 5, 8, 3),
    )]);
    let main_tip = chain.tip_id();

    let (_id, mut receiver) = chain.cs.subscribe(ResumePoint::Recent).unwrap();
    let fork = chain.fork(chain.genesis().id(), 2, 1);

    let changes = drain(&mut receiver);
    assert_eq!(changes.len(), 1, "The side chain block produces no change");
    let change = &changes[0];
    assert_eq!(change.reverted_blocks, vec![main_tip]);
    assert_eq!(
        change.applied_blocks,
        fork.iter().map(|block| block.id()).collect::<Vec<_>>()
    );
    assert_eq!(change.block_height, 2);
    assert_eq!(change.fund_pool, Currency::ZERO);

    // The contract of the reverted block leaves, the pool diff is undone.
    assert_eq!(change.diffs.file_contract_diffs.len(), 1);
    assert_eq!(
        change.diffs.file_contract_diffs[0].direction,
        DiffDirection::Revert
    );
    let pool = &change.diffs.fund_pool_diffs[0];
    assert_eq!(pool.direction, DiffDirection::Revert);
    assert_eq!(pool.adjusted, Currency::new(10_000));
}

#[test]
fn test_closed_subscribers_are_pruned() {
    let chain = TestChain::new();
    let (_kept, mut receiver) = chain.cs.subscribe(ResumePoint::Recent).unwrap();
    let (dropped, dropped_receiver) = chain.cs.subscribe(ResumePoint::Recent).unwrap();
    let (removed, _removed_receiver) = chain.cs.subscribe(ResumePoint::Recent).unwrap();
    assert_ne!(dropped, removed);

    drop(dropped_receiver);
    chain.cs.unsubscribe(removed);
    chain.mine(Vec::new());

    assert_eq!(drain(&mut receiver).len(), 1);
    futures::executor::block_on(async {
        chain.mine(Vec::new());
        assert!(receiver.next().await.is_some());
    });
}
