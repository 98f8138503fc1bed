// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixed-depth binary Merkle tree over BN254 field elements.
//!
//! The tree depth equals the circuit's compiled path length. Unused leaves
//! are zero; the hash of an all-zero subtree at each level is precomputed
//! so the tree only stores populated leaves.

use alloy::primitives::U256;

use crate::proof::field::hash_node;

/// Path length compiled into the circuit.
pub const TREE_DEPTH: usize = 10;

/// Maximum number of members a single record can hold.
pub const MAX_LEAVES: usize = 1 << TREE_DEPTH;

/// Authentication path for one leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePath {
    pub leaf_index: usize,
    /// Sibling node at each level, leaf level first.
    pub elements: Vec<U256>,
    /// 0 when the running node is the left child at that level, 1 when right.
    pub indices: Vec<u8>,
}

/// Merkle tree rebuilt from an ordered leaf set.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` are the leaves, `levels[TREE_DEPTH]` holds the root.
    levels: Vec<Vec<U256>>,
    zeros: [U256; TREE_DEPTH + 1],
}

fn zero_hashes() -> [U256; TREE_DEPTH + 1] {
    let mut zeros = [U256::ZERO; TREE_DEPTH + 1];
    for level in 1..=TREE_DEPTH {
        zeros[level] = hash_node(zeros[level - 1], zeros[level - 1]);
    }
    zeros
}

impl MerkleTree {
    /// Build a tree from leaves in their final order.
    ///
    /// Returns `None` if more than [`MAX_LEAVES`] leaves are supplied.
    pub fn from_leaves(leaves: Vec<U256>) -> Option<Self> {
        if leaves.len() > MAX_LEAVES {
            return None;
        }
        let zeros = zero_hashes();
        let mut levels = Vec::with_capacity(TREE_DEPTH + 1);
        levels.push(leaves);

        for level in 0..TREE_DEPTH {
            let current = &levels[level];
            let parents = current
                .chunks(2)
                .map(|pair| {
                    let left = pair[0];
                    let right = pair.get(1).copied().unwrap_or(zeros[level]);
                    hash_node(left, right)
                })
                .collect();
            levels.push(parents);
        }

        Some(Self { levels, zeros })
    }

    pub fn empty() -> Self {
        Self {
            levels: vec![Vec::new(); TREE_DEPTH + 1],
            zeros: zero_hashes(),
        }
    }

    pub fn root(&self) -> U256 {
        self.levels[TREE_DEPTH]
            .first()
            .copied()
            .unwrap_or(self.zeros[TREE_DEPTH])
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    fn node(&self, level: usize, index: usize) -> U256 {
        self.levels[level]
            .get(index)
            .copied()
            .unwrap_or(self.zeros[level])
    }

    /// Authentication path for the leaf at `leaf_index`.
    pub fn path(&self, leaf_index: usize) -> Option<MerklePath> {
        if leaf_index >= self.len() {
            return None;
        }
        let mut elements = Vec::with_capacity(TREE_DEPTH);
        let mut indices = Vec::with_capacity(TREE_DEPTH);
        let mut index = leaf_index;
        for level in 0..TREE_DEPTH {
            elements.push(self.node(level, index ^ 1));
            indices.push((index & 1) as u8);
            index >>= 1;
        }
        Some(MerklePath {
            leaf_index,
            elements,
            indices,
        })
    }
}

/// Fold a leaf up its authentication path.
///
/// Returns `None` if the path is malformed (wrong length or an index
/// outside `{0, 1}`).
pub fn compute_root(leaf: U256, elements: &[U256], indices: &[u8]) -> Option<U256> {
    if elements.len() != TREE_DEPTH || indices.len() != TREE_DEPTH {
        return None;
    }
    let mut node = leaf;
    for (sibling, bit) in elements.iter().zip(indices) {
        node = match bit {
            0 => hash_node(node, *sibling),
            1 => hash_node(*sibling, node),
            _ => return None,
        };
    }
    Some(node)
}
