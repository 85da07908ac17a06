//! Merkle Inclusion Proofs
//!
//! Walks the retained tree levels for one leaf and records the sibling
//! digests needed to rebuild the root, plus the persisted proof format.

use serde::{Deserialize, Serialize};

use crate::error::{AnchorError, Result};
use crate::merkle::hash::MerkleHash;
use crate::merkle::tree::{MerkleTree, OddNodePolicy};
use crate::merkle::verify::recompute_root;

/// Position of the sibling relative to the digest being carried upward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Combine as `hash(sibling || current)`
    Left,
    /// Combine as `hash(current || sibling)`
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// One level of a proof path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    #[serde(rename = "siblingDigestHex")]
    pub sibling: MerkleHash,
    pub side: Side,
}

/// Inclusion proof for one leaf of a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub leaf: MerkleHash,
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Root obtained by replaying the steps over the leaf
    pub fn computed_root(&self) -> MerkleHash {
        recompute_root(&self.leaf, &self.steps)
    }

    pub fn to_record(&self, record_id: &str) -> ProofRecord {
        ProofRecord {
            record_id: record_id.to_string(),
            leaf_digest: self.leaf,
            proof: self.steps.clone(),
        }
    }
}

/// Persisted per-leaf proof, the format consumed by verification tooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRecord {
    pub record_id: String,
    #[serde(rename = "leafDigestHex")]
    pub leaf_digest: MerkleHash,
    pub proof: Vec<ProofStep>,
}

/// `ceil(log2(n))`, the proof length for any leaf of an `n`-leaf tree
/// built with the duplicate-last policy
pub fn expected_proof_len(leaf_count: usize) -> usize {
    if leaf_count <= 1 {
        0
    } else {
        (usize::BITS - (leaf_count - 1).leading_zeros()) as usize
    }
}

/// Generate the sibling path for the leaf at `index`
pub fn prove_leaf(tree: &MerkleTree, index: usize) -> Result<MerkleProof> {
    let leaf = *tree.leaf(index).ok_or(AnchorError::InvalidLeafIndex {
        index,
        leaf_count: tree.leaf_count(),
    })?;

    let levels = tree.levels();
    let mut steps = Vec::with_capacity(tree.depth());
    let mut current_index = index;

    for level in &levels[..tree.depth()] {
        let is_right_node = current_index % 2 == 1;
        let sibling_index = if is_right_node {
            current_index - 1
        } else {
            current_index + 1
        };

        if sibling_index < level.len() {
            steps.push(ProofStep {
                sibling: level[sibling_index],
                side: if is_right_node { Side::Left } else { Side::Right },
            });
        } else if tree.policy() == OddNodePolicy::DuplicateLast {
            // Unpaired last node was hashed with itself
            steps.push(ProofStep {
                sibling: level[current_index],
                side: Side::Right,
            });
        }

        current_index /= 2;
    }

    Ok(MerkleProof {
        leaf_index: index,
        leaf,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::hash::{hash_bytes, hash_pair};

    fn leaves(count: usize) -> Vec<MerkleHash> {
        (0..count)
            .map(|i| hash_bytes(format!("leaf-{}", i).as_bytes()))
            .collect()
    }

    #[test]
    fn test_expected_proof_len() {
        assert_eq!(expected_proof_len(1), 0);
        assert_eq!(expected_proof_len(2), 1);
        assert_eq!(expected_proof_len(3), 2);
        assert_eq!(expected_proof_len(4), 2);
        assert_eq!(expected_proof_len(5), 3);
        assert_eq!(expected_proof_len(1024), 10);
        assert_eq!(expected_proof_len(1025), 11);
    }

    #[test]
    fn test_out_of_range_index() {
        let tree = MerkleTree::build(&leaves(4)).unwrap();
        let err = prove_leaf(&tree, 4).unwrap_err();
        assert!(matches!(
            err,
            AnchorError::InvalidLeafIndex {
                index: 4,
                leaf_count: 4
            }
        ));
    }

    #[test]
    fn test_odd_leaf_proof_under_duplicate_policy() {
        let h = leaves(3);
        let tree = MerkleTree::build_with_policy(&h, OddNodePolicy::DuplicateLast).unwrap();
        let proof = prove_leaf(&tree, 2).unwrap();

        assert_eq!(
            proof.steps,
            vec![
                ProofStep { sibling: h[2], side: Side::Right },
                ProofStep { sibling: hash_pair(&h[0], &h[1]), side: Side::Left },
            ]
        );
        assert_eq!(proof.computed_root(), tree.root());
    }

    #[test]
    fn test_odd_leaf_proof_under_carry_forward_policy() {
        let h = leaves(3);
        let tree = MerkleTree::build_with_policy(&h, OddNodePolicy::CarryForward).unwrap();
        let proof = prove_leaf(&tree, 2).unwrap();

        assert_eq!(
            proof.steps,
            vec![ProofStep { sibling: hash_pair(&h[0], &h[1]), side: Side::Left }]
        );
        assert_eq!(proof.computed_root(), tree.root());
    }

    #[test]
    fn test_proof_record_format() {
        let tree = MerkleTree::build(&leaves(2)).unwrap();
        let record = tree.prove(0).unwrap().to_record("evt-9");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["recordId"], "evt-9");
        assert_eq!(json["leafDigestHex"], tree.leaves()[0].to_hex());
        assert_eq!(json["proof"][0]["side"], "right");
        assert_eq!(json["proof"][0]["siblingDigestHex"], tree.leaves()[1].to_hex());

        let back: ProofRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
