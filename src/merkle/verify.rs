//! Standalone Proof Verification
//!
//! Needs only a leaf digest, its stored sibling path and a reference root.
//! No tree, store or ledger access.

use crate::merkle::hash::{hash_pair, MerkleHash};
use crate::merkle::proof::{ProofStep, ProofRecord, Side};

/// Replay a sibling path over a leaf digest
pub fn recompute_root(leaf: &MerkleHash, steps: &[ProofStep]) -> MerkleHash {
    steps.iter().fold(*leaf, |current, step| match step.side {
        Side::Left => hash_pair(&step.sibling, &current),
        Side::Right => hash_pair(&current, &step.sibling),
    })
}

/// `true` iff the replayed path lands exactly on `claimed_root`
pub fn verify_proof(leaf: &MerkleHash, steps: &[ProofStep], claimed_root: &MerkleHash) -> bool {
    recompute_root(leaf, steps) == *claimed_root
}

/// Verify a persisted proof record against a root
pub fn verify_proof_record(record: &ProofRecord, claimed_root: &MerkleHash) -> bool {
    verify_proof(&record.leaf_digest, &record.proof, claimed_root)
}
