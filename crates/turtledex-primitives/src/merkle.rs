//! Binary Merkle trees with domain-separated leaf and node hashing.
//!
//! Trees are built by splitting the leaf list at the largest power of two smaller
//! than its length, which matches the shape of a stack-based tree that merges
//! equal-height subtrees as leaves are appended.

use crate::hash::{Hash256, HashWriter, hash_bytes};
use std::io::Write;

const LEAF_HASH_PREFIX: u8 = 0x00;
const NODE_HASH_PREFIX: u8 = 0x01;

/// Size of a storage proof segment in bytes.
pub const SEGMENT_SIZE: usize = 64;

/// Deepest proof accepted by [`verify_segment`].
const MAX_PROOF_DEPTH: usize = 63;

pub fn leaf_hash(data: &[u8]) -> Hash256 {
    let mut writer = HashWriter::new();
    let _ = writer.write_all(&[LEAF_HASH_PREFIX]);
    let _ = writer.write_all(data);
    writer.finalize()
}

pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = [0u8; 65];
    buf[0] = NODE_HASH_PREFIX;
    buf[1..33].copy_from_slice(left.as_bytes());
    buf[33..].copy_from_slice(right.as_bytes());
    hash_bytes(&buf)
}

/// Largest power of two strictly below `n`, for `n >= 2`.
fn split_point(n: usize) -> usize {
    1 << (usize::BITS - 1 - (n - 1).leading_zeros())
}

fn subtree_root(hashes: &[Hash256]) -> Hash256 {
    match hashes.len() {
        0 => Hash256::default(),
        1 => hashes[0],
        n => {
            let k = split_point(n);
            node_hash(&subtree_root(&hashes[..k]), &subtree_root(&hashes[k..]))
        }
    }
}

/// Computes the Merkle root of `leaves`. An empty tree has the zero root.
pub fn merkle_root<T: AsRef<[u8]>>(leaves: &[T]) -> Hash256 {
    let hashes: Vec<Hash256> = leaves.iter().map(|leaf| leaf_hash(leaf.as_ref())).collect();
    subtree_root(&hashes)
}

fn subtree_proof(hashes: &[Hash256], index: usize, proof: &mut Vec<Hash256>) {
    if hashes.len() <= 1 {
        return;
    }
    let k = split_point(hashes.len());
    if index < k {
        subtree_proof(&hashes[..k], index, proof);
        proof.push(subtree_root(&hashes[k..]));
    } else {
        subtree_proof(&hashes[k..], index - k, proof);
        proof.push(subtree_root(&hashes[..k]));
    }
}

/// Builds the sibling hashes proving that leaf `index` belongs to the tree, ordered
/// from the leaf upwards. Returns `None` if `index` is out of range.
pub fn build_proof<T: AsRef<[u8]>>(leaves: &[T], index: usize) -> Option<Vec<Hash256>> {
    if index >= leaves.len() {
        return None;
    }
    let hashes: Vec<Hash256> = leaves.iter().map(|leaf| leaf_hash(leaf.as_ref())).collect();
    let mut proof = Vec::new();
    subtree_proof(&hashes, index, &mut proof);
    Some(proof)
}

/// Verifies that `leaf` sits at `index` of a tree with `num_leaves` leaves and the
/// given `root`, using the sibling hashes in `hash_set`.
pub fn verify_proof(
    leaf: &[u8],
    hash_set: &[Hash256],
    num_leaves: u64,
    index: u64,
    root: &Hash256,
) -> bool {
    if index >= num_leaves || hash_set.len() > MAX_PROOF_DEPTH {
        return false;
    }

    // Slot 0 of the conceptual proof is the leaf itself.
    let proof_len = hash_set.len() + 1;
    let mut sum = leaf_hash(leaf);
    let mut height = 1usize;

    // Consume the hashes of the complete subtrees containing the leaf.
    let mut stable_end = index;
    loop {
        let width = 1u64 << height;
        let subtree_start = (index / width) * width;
        let Some(subtree_end) = subtree_start.checked_add(width - 1) else {
            break;
        };
        if subtree_end >= num_leaves {
            break;
        }
        stable_end = subtree_end;

        if height >= proof_len {
            return false;
        }
        let sibling = &hash_set[height - 1];
        if index - subtree_start < width / 2 {
            sum = node_hash(&sum, sibling);
        } else {
            sum = node_hash(sibling, &sum);
        }
        height += 1;
    }

    // The leaf sits in the trailing incomplete subtree, merge with what follows it.
    if stable_end != num_leaves - 1 {
        if height >= proof_len {
            return false;
        }
        sum = node_hash(&sum, &hash_set[height - 1]);
        height += 1;
    }

    // Everything left is a left-hand sibling.
    while height < proof_len {
        sum = node_hash(&hash_set[height - 1], &sum);
        height += 1;
    }

    sum == *root
}

/// Number of storage proof segments in a file of `file_size` bytes. An empty file
/// still has one (empty) segment.
pub fn num_segments(file_size: u64) -> u64 {
    file_size.div_ceil(SEGMENT_SIZE as u64).max(1)
}

fn segments(data: &[u8]) -> Vec<&[u8]> {
    data.chunks(SEGMENT_SIZE).collect()
}

/// Merkle root over the 64-byte segments of `data`.
pub fn segment_root(data: &[u8]) -> Hash256 {
    merkle_root(&segments(data))
}

/// Builds the segment and proof that a storage provider submits for segment `index`.
///
/// An empty file has a single segment of zeroes and an empty proof.
pub fn segment_proof(data: &[u8], index: usize) -> Option<([u8; SEGMENT_SIZE], Vec<Hash256>)> {
    if data.is_empty() {
        return (index == 0).then(|| ([0u8; SEGMENT_SIZE], Vec::new()));
    }
    let segments = segments(data);
    let proof = build_proof(&segments, index)?;
    let mut segment = [0u8; SEGMENT_SIZE];
    segment[..segments[index].len()].copy_from_slice(segments[index]);
    Some((segment, proof))
}

/// Verifies a storage proof segment. The final segment of a file whose size is not a
/// multiple of [`SEGMENT_SIZE`] is truncated before hashing.
///
/// Nothing can be proven about an empty file, so any segment of one is accepted.
pub fn verify_segment(
    segment: &[u8; SEGMENT_SIZE],
    hash_set: &[Hash256],
    file_size: u64,
    index: u64,
    root: &Hash256,
) -> bool {
    if file_size == 0 {
        return true;
    }
    let num_segments = num_segments(file_size);
    let mut segment_len = SEGMENT_SIZE;
    let remainder = (file_size % SEGMENT_SIZE as u64) as usize;
    if index + 1 == num_segments && remainder != 0 {
        segment_len = remainder;
    }
    verify_proof(&segment[..segment_len], hash_set, num_segments, index, root)
}
