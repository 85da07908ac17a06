//! Merkle Tree Construction
//!
//! Builds a binary Merkle tree bottom-up over an ordered list of leaf
//! digests. Levels are kept as flat vectors addressed by `(level, index)`;
//! level 0 holds the leaves and the last level holds only the root.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnchorError, Result};
use crate::merkle::hash::{hash_pair, MerkleHash};
use crate::merkle::proof::{prove_leaf, MerkleProof};
use crate::record::{hash_records, LogRecord};

/// How an unpaired node at the end of an odd-length level reaches the next level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OddNodePolicy {
    /// `hash(last || last)`; the proof carries the node as its own right sibling
    DuplicateLast,
    /// Promote the node unchanged; the proof has no step for that level
    CarryForward,
}

/// The odd-node policy used by every anchored batch.
///
/// Roots built under one policy do not verify under the other, so this is
/// the only policy the anchoring path uses.
pub const ODD_NODE_POLICY: OddNodePolicy = OddNodePolicy::DuplicateLast;

impl OddNodePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OddNodePolicy::DuplicateLast => "duplicate_last",
            OddNodePolicy::CarryForward => "carry_forward",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "duplicate_last" => Ok(OddNodePolicy::DuplicateLast),
            "carry_forward" => Ok(OddNodePolicy::CarryForward),
            other => Err(AnchorError::Serialization(format!("Unknown odd-node policy: {}", other))),
        }
    }

    fn promote(&self, node: &MerkleHash) -> MerkleHash {
        match self {
            OddNodePolicy::DuplicateLast => hash_pair(node, node),
            OddNodePolicy::CarryForward => *node,
        }
    }
}

/// Immutable Merkle tree with every level retained
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<MerkleHash>>,
    root: MerkleHash,
    policy: OddNodePolicy,
}

impl MerkleTree {
    /// Build with the system-wide [`ODD_NODE_POLICY`]
    pub fn build(leaves: &[MerkleHash]) -> Result<Self> {
        Self::build_with_policy(leaves, ODD_NODE_POLICY)
    }

    pub fn build_with_policy(leaves: &[MerkleHash], policy: OddNodePolicy) -> Result<Self> {
        if leaves.is_empty() {
            return Err(AnchorError::EmptyBatch);
        }

        let mut levels = vec![leaves.to_vec()];

        while levels[levels.len() - 1].len() > 1 {
            let next: Vec<MerkleHash> = levels[levels.len() - 1]
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [single] => policy.promote(single),
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next);
        }

        let root = levels[levels.len() - 1][0];

        debug!(
            "Built Merkle tree: {} leaves, {} levels, root {}",
            leaves.len(),
            levels.len(),
            root
        );

        Ok(Self { levels, root, policy })
    }

    /// Hash the records and build the tree over their digests
    pub fn from_records(records: &[LogRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(AnchorError::EmptyBatch);
        }
        let leaves = hash_records(records)?;
        Self::build(&leaves)
    }

    pub fn root(&self) -> MerkleHash {
        self.root
    }

    pub fn policy(&self) -> OddNodePolicy {
        self.policy
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn leaves(&self) -> &[MerkleHash] {
        &self.levels[0]
    }

    pub fn leaf(&self, index: usize) -> Option<&MerkleHash> {
        self.levels[0].get(index)
    }

    /// Number of hashing rounds between the leaves and the root
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn levels(&self) -> &[Vec<MerkleHash>] {
        &self.levels
    }

    pub fn prove(&self, index: usize) -> Result<MerkleProof> {
        prove_leaf(self, index)
    }

    /// Proofs for every leaf, in leaf order
    pub fn prove_all(&self) -> Result<Vec<MerkleProof>> {
        (0..self.leaf_count()).map(|index| prove_leaf(self, index)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::hash::hash_bytes;

    fn leaves(count: usize) -> Vec<MerkleHash> {
        (0..count)
            .map(|i| hash_bytes(format!("r{}", i).as_bytes()))
            .collect()
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(matches!(MerkleTree::build(&[]), Err(AnchorError::EmptyBatch)));
        assert!(matches!(MerkleTree::from_records(&[]), Err(AnchorError::EmptyBatch)));
    }

    #[test]
    fn test_single_leaf_is_root() {
        let leaf = hash_bytes(b"only");
        let tree = MerkleTree::build(&[leaf]).unwrap();
        assert_eq!(tree.root(), leaf);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_level_sizes_halve_rounding_up() {
        for count in 1..=40 {
            let tree = MerkleTree::build(&leaves(count)).unwrap();
            let levels = tree.levels();
            for k in 1..levels.len() {
                assert_eq!(levels[k].len(), (levels[k - 1].len() + 1) / 2);
            }
            assert_eq!(levels.last().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_three_leaf_duplicate_policy() {
        let h = leaves(3);
        let tree = MerkleTree::build_with_policy(&h, OddNodePolicy::DuplicateLast).unwrap();

        let left = hash_pair(&h[0], &h[1]);
        let right = hash_pair(&h[2], &h[2]);
        assert_eq!(tree.levels()[1], vec![left, right]);
        assert_eq!(tree.root(), hash_pair(&left, &right));
    }

    #[test]
    fn test_three_leaf_carry_forward_policy() {
        let h = leaves(3);
        let tree = MerkleTree::build_with_policy(&h, OddNodePolicy::CarryForward).unwrap();

        let left = hash_pair(&h[0], &h[1]);
        assert_eq!(tree.levels()[1], vec![left, h[2]]);
        assert_eq!(tree.root(), hash_pair(&left, &h[2]));
    }

    #[test]
    fn test_policies_disagree_on_odd_levels() {
        let h = leaves(5);
        let duplicate = MerkleTree::build_with_policy(&h, OddNodePolicy::DuplicateLast).unwrap();
        let carry = MerkleTree::build_with_policy(&h, OddNodePolicy::CarryForward).unwrap();
        assert_ne!(duplicate.root(), carry.root());

        // Even power-of-two sets never hit the odd-node rule
        let h = leaves(8);
        let duplicate = MerkleTree::build_with_policy(&h, OddNodePolicy::DuplicateLast).unwrap();
        let carry = MerkleTree::build_with_policy(&h, OddNodePolicy::CarryForward).unwrap();
        assert_eq!(duplicate.root(), carry.root());
    }

    #[test]
    fn test_system_policy_is_duplicate_last() {
        assert_eq!(ODD_NODE_POLICY, OddNodePolicy::DuplicateLast);
        let tree = MerkleTree::build(&leaves(3)).unwrap();
        assert_eq!(tree.policy(), OddNodePolicy::DuplicateLast);
    }

    #[test]
    fn test_prove_all_matches_each_leaf() {
        for count in [1, 2, 5, 8, 11] {
            let tree = MerkleTree::build(&leaves(count)).unwrap();
            let proofs = tree.prove_all().unwrap();
            assert_eq!(proofs.len(), count);
            for (index, proof) in proofs.iter().enumerate() {
                assert_eq!(*proof, tree.prove(index).unwrap());
            }
        }
    }
}
