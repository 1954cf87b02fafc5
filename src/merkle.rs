//! Merkle commitment over a session's allowed methods.
//!
//! Pairs are hashed in sorted order (`poseidon(min, max)`), so a proof is
//! just the list of sibling hashes from leaf to root. An odd node at the end
//! of a level is paired with zero. A tree with a single leaf has that leaf as
//! its root and an empty proof.

use std::collections::HashMap;

use starknet_crypto::poseidon_hash;
use starknet_types_core::felt::Felt;

use crate::error::{Error, Result};
use crate::types::{AllowedMethod, Call};

/// Binary Merkle tree with sorted-pair Poseidon hashing.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves, the last level holds the root.
    levels: Vec<Vec<Felt>>,
}

impl MerkleTree {
    #[must_use]
    pub fn new(leaves: Vec<Felt>) -> Self {
        if leaves.is_empty() {
            return Self { levels: Vec::new() };
        }

        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|l| l.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| hash_pair(pair[0], pair.get(1).copied().unwrap_or(Felt::ZERO)))
                .collect();
            levels.push(next);
        }
        Self { levels }
    }

    /// Root commitment; zero for an empty tree.
    #[must_use]
    pub fn root(&self) -> Felt {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(Felt::ZERO)
    }

    #[must_use]
    pub fn leaves(&self) -> &[Felt] {
        self.levels.first().map_or(&[], Vec::as_slice)
    }

    /// Sibling hashes from the leaf at `index` up to the root, or `None` if
    /// the index is out of range.
    #[must_use]
    pub fn proof(&self, index: usize) -> Option<Vec<Felt>> {
        if index >= self.leaves().len() {
            return None;
        }

        let mut proof = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut i = index;
        for level in &self.levels[..self.levels.len() - 1] {
            proof.push(level.get(i ^ 1).copied().unwrap_or(Felt::ZERO));
            i /= 2;
        }
        Some(proof)
    }
}

/// Hash of two nodes, independent of their order.
#[must_use]
pub fn hash_pair(a: Felt, b: Felt) -> Felt {
    if a <= b {
        poseidon_hash(a, b)
    } else {
        poseidon_hash(b, a)
    }
}

/// Checks that `leaf` hashes up to `root` along `proof`.
#[must_use]
pub fn verify_proof(root: Felt, leaf: Felt, proof: &[Felt]) -> bool {
    proof.iter().fold(leaf, |node, sibling| hash_pair(node, *sibling)) == root
}

/// Builds the permission tree with one leaf per allowed method, in order.
#[must_use]
pub fn build_tree(allowed_methods: &[AllowedMethod]) -> MerkleTree {
    MerkleTree::new(allowed_methods.iter().map(AllowedMethod::leaf_hash).collect())
}

/// Index from `(contract_address, selector)` to leaf position.
///
/// When a method appears more than once, its first position is used.
#[derive(Debug, Clone, Default)]
pub struct AllowedMethodIndex {
    positions: HashMap<(Felt, Felt), usize>,
}

impl AllowedMethodIndex {
    #[must_use]
    pub fn new(allowed_methods: &[AllowedMethod]) -> Self {
        let mut positions = HashMap::with_capacity(allowed_methods.len());
        for (i, method) in allowed_methods.iter().enumerate() {
            positions
                .entry((method.contract_address, method.selector))
                .or_insert(i);
        }
        Self { positions }
    }

    #[must_use]
    pub fn lookup(&self, contract_address: Felt, selector: Felt) -> Option<usize> {
        self.positions.get(&(contract_address, selector)).copied()
    }

    #[must_use]
    pub fn lookup_call(&self, call: &Call) -> Option<usize> {
        self.lookup(call.to, call.selector)
    }
}

/// Permission tree and lookup index for one session, built once and reused
/// for every transaction signed under it.
#[derive(Debug, Clone)]
pub struct SessionCommitment {
    tree: MerkleTree,
    index: AllowedMethodIndex,
}

impl SessionCommitment {
    #[must_use]
    pub fn new(allowed_methods: &[AllowedMethod]) -> Self {
        Self {
            tree: build_tree(allowed_methods),
            index: AllowedMethodIndex::new(allowed_methods),
        }
    }

    #[must_use]
    pub fn root(&self) -> Felt {
        self.tree.root()
    }

    #[must_use]
    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    /// Proof for the method `call` targets, if the session allows it.
    #[must_use]
    pub fn proof_for_call(&self, call: &Call) -> Option<Vec<Felt>> {
        self.index
            .lookup_call(call)
            .and_then(|i| self.tree.proof(i))
    }

    /// One proof per call, in call order.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnauthorizedCall` for the first call that matches no
    /// allowed method.
    pub fn proofs_for_calls(&self, calls: &[Call]) -> Result<Vec<Vec<Felt>>> {
        calls
            .iter()
            .map(|call| {
                self.proof_for_call(call).ok_or(Error::UnauthorizedCall {
                    contract_address: call.to,
                    selector: call.selector,
                })
            })
            .collect()
    }
}

/// Builds the session's tree and returns one proof per call.
///
/// # Errors
///
/// Returns `Error::UnauthorizedCall` if any call is outside `allowed_methods`.
pub fn proofs_for_calls(
    allowed_methods: &[AllowedMethod],
    calls: &[Call],
) -> Result<Vec<Vec<Felt>>> {
    SessionCommitment::new(allowed_methods).proofs_for_calls(calls)
}
