//! Binary SHA-256 Merkle tree over per-token leaves.
//!
//! When a level has an odd number of nodes the last node is paired with
//! itself. A single-leaf tree has the leaf as its root and an empty path.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::types::{Hash256, MerkleRoot, VrfOutput};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("cannot build a merkle tree from an empty batch")]
    EmptyBatch,
    #[error("leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("merkle path does not authenticate the leaf")]
    PathInvalid,
}

/// Side of the sibling relative to the running hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    pub sibling: Hash256,
    pub direction: Direction,
}

/// leaf = SHA256( β || context ), context = α for bundles
#[must_use]
pub fn merkle_leaf(beta: &VrfOutput, context: &[u8]) -> Hash256 {
    let mut h = Sha256::new();
    h.update(beta.0);
    h.update(context);
    h.finalize().into()
}

/// node = SHA256( left || right )
#[inline]
#[must_use]
pub fn merkle_node(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut h = Sha256::new();
    h.update(left);
    h.update(right);
    h.finalize().into()
}

fn hash_pair(pair: &[Hash256]) -> Hash256 {
    let left = &pair[0];
    merkle_node(left, pair.get(1).unwrap_or(left))
}

#[cfg(feature = "parallel")]
fn next_level(level: &[Hash256]) -> Vec<Hash256> {
    use rayon::prelude::*;
    level.par_chunks(2).map(hash_pair).collect()
}

#[cfg(not(feature = "parallel"))]
fn next_level(level: &[Hash256]) -> Vec<Hash256> {
    level.chunks(2).map(hash_pair).collect()
}

/// Fold a path from `leaf` up and compare with `root`.
#[must_use]
pub fn verify_merkle_path(leaf: &Hash256, path: &[PathStep], root: &MerkleRoot) -> bool {
    let acc = path.iter().fold(*leaf, |acc, step| match step.direction {
        Direction::Left => merkle_node(&step.sibling, &acc),
        Direction::Right => merkle_node(&acc, &step.sibling),
    });
    bool::from(acc[..].ct_eq(&root.0[..]))
}

/// Authentication path for one leaf, as carried inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub root: MerkleRoot,
    pub leaf: Hash256,
    pub path: Vec<PathStep>,
    pub index: u64,
}

impl MerkleProof {
    /// Check that the directions agree with `index` (bit j set ⇔ sibling at
    /// level j is on the left) and that the path folds to `root`.
    ///
    /// A duplicated last node only ever appears as a right sibling, so a left
    /// sibling equal to the running node is rejected. Without that, a proof
    /// for the last leaf of an odd level would also pass under the index of
    /// its phantom duplicate.
    ///
    /// # Errors
    /// `PathInvalid` on any inconsistency.
    pub fn verify(&self) -> Result<(), MerkleError> {
        let depth = self.path.len();
        if depth < 64 && self.index >> depth != 0 {
            return Err(MerkleError::PathInvalid);
        }
        let mut acc = self.leaf;
        for (j, step) in self.path.iter().enumerate() {
            let bit = j < 64 && (self.index >> j) & 1 == 1;
            if bit != (step.direction == Direction::Left) {
                return Err(MerkleError::PathInvalid);
            }
            acc = match step.direction {
                Direction::Left if step.sibling == acc => return Err(MerkleError::PathInvalid),
                Direction::Left => merkle_node(&step.sibling, &acc),
                Direction::Right => merkle_node(&acc, &step.sibling),
            };
        }
        if !bool::from(acc[..].ct_eq(&self.root.0[..])) {
            return Err(MerkleError::PathInvalid);
        }
        Ok(())
    }
}

/// All levels of the tree, leaves first. Levels are stored unpadded.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    /// # Errors
    /// `EmptyBatch` when `leaves` is empty.
    pub fn from_leaves(leaves: Vec<Hash256>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyBatch);
        }
        let mut levels = vec![leaves];
        while let Some(top) = levels.last().filter(|l| l.len() > 1) {
            let next = next_level(top);
            levels.push(next);
        }
        Ok(Self { levels })
    }

    #[must_use]
    pub fn root(&self) -> MerkleRoot {
        // from_leaves guarantees a non-empty top level
        MerkleRoot(self.levels.last().and_then(|l| l.first()).copied().unwrap_or_default())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// # Errors
    /// `IndexOutOfRange` if `index >= len()`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        let len = self.len();
        if index >= len {
            return Err(MerkleError::IndexOutOfRange { index, len });
        }
        let mut path = Vec::with_capacity(self.depth());
        let mut idx = index;
        for level in &self.levels[..self.depth()] {
            let (sibling_idx, direction) = if idx % 2 == 1 {
                (idx - 1, Direction::Left)
            } else {
                (idx + 1, Direction::Right)
            };
            let sibling = level.get(sibling_idx).unwrap_or(&level[idx]);
            path.push(PathStep { sibling: *sibling, direction });
            idx /= 2;
        }
        Ok(MerkleProof {
            root: self.root(),
            leaf: self.levels[0][index],
            path,
            index: index as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u8) -> Vec<Hash256> {
        (0..n).map(|i| merkle_leaf(&VrfOutput([i; 64]), &[i])).collect()
    }

    #[test]
    fn empty_batch_rejected() {
        assert_eq!(MerkleTree::from_leaves(vec![]).unwrap_err(), MerkleError::EmptyBatch);
    }

    #[test]
    fn single_leaf_is_root() {
        let l = leaves(1);
        let t = MerkleTree::from_leaves(l.clone()).unwrap();
        assert_eq!(t.root(), MerkleRoot(l[0]));
        let p = t.proof(0).unwrap();
        assert!(p.path.is_empty());
        assert_eq!(p.verify(), Ok(()));
    }

    #[test]
    fn odd_level_duplicates_last() {
        let l = leaves(3);
        let t = MerkleTree::from_leaves(l.clone()).unwrap();
        let expected = merkle_node(&merkle_node(&l[0], &l[1]), &merkle_node(&l[2], &l[2]));
        assert_eq!(t.root(), MerkleRoot(expected));
        assert_eq!(t.depth(), 2);
    }

    #[test]
    fn leaf_layout() {
        let beta = VrfOutput([3; 64]);
        let mut h = Sha256::new();
        h.update([3u8; 64]);
        h.update(b"c:1");
        let expected: Hash256 = h.finalize().into();
        assert_eq!(merkle_leaf(&beta, b"c:1"), expected);
    }

    #[test]
    fn every_leaf_verifies_for_odd_and_even_sizes() {
        for n in 1..=9u8 {
            let t = MerkleTree::from_leaves(leaves(n)).unwrap();
            for i in 0..usize::from(n) {
                let p = t.proof(i).unwrap();
                assert_eq!(p.verify(), Ok(()), "n = {n}, i = {i}");
                assert!(verify_merkle_path(&p.leaf, &p.path, &t.root()));
            }
        }
    }

    #[test]
    fn tampering_is_detected() {
        let t = MerkleTree::from_leaves(leaves(6)).unwrap();
        let honest = t.proof(3).unwrap();

        let mut p = honest.clone();
        p.path[1].sibling[0] ^= 1;
        assert_eq!(p.verify(), Err(MerkleError::PathInvalid));

        let mut p = honest.clone();
        p.path[0].direction = Direction::Right;
        assert_eq!(p.verify(), Err(MerkleError::PathInvalid));

        let mut p = honest.clone();
        p.leaf[31] ^= 0x80;
        assert_eq!(p.verify(), Err(MerkleError::PathInvalid));

        let mut p = honest.clone();
        p.index = 2;
        assert_eq!(p.verify(), Err(MerkleError::PathInvalid));

        let mut p = honest;
        p.index += 8;
        assert_eq!(p.verify(), Err(MerkleError::PathInvalid));
    }

    #[test]
    fn duplicated_node_does_not_alias_a_second_index() {
        for n in [3u8, 5, 7] {
            let t = MerkleTree::from_leaves(leaves(n)).unwrap();
            let last = usize::from(n) - 1;
            let honest = t.proof(last).unwrap();
            assert_eq!(honest.verify(), Ok(()));

            // same leaf at the phantom slot right of it
            let mut alias = honest.clone();
            alias.index += 1;
            alias.path[0].direction = Direction::Left;
            assert!(verify_merkle_path(&alias.leaf, &alias.path, &t.root()));
            assert_eq!(alias.verify(), Err(MerkleError::PathInvalid), "n = {n}");
        }
    }

    #[test]
    fn out_of_range_index() {
        let t = MerkleTree::from_leaves(leaves(2)).unwrap();
        assert_eq!(t.proof(2).unwrap_err(), MerkleError::IndexOutOfRange { index: 2, len: 2 });
    }
}
