//! Merkle Anchoring Core
//!
//! Leaf digests, tree construction, inclusion proofs and standalone
//! verification for anchored log batches.

pub mod hash;
pub mod proof;
pub mod tree;
pub mod verify;

pub use hash::{hash_bytes, hash_pair, MerkleHash};
pub use proof::{expected_proof_len, prove_leaf, MerkleProof, ProofRecord, ProofStep, Side};
pub use tree::{MerkleTree, OddNodePolicy, ODD_NODE_POLICY};
pub use verify::{recompute_root, verify_proof, verify_proof_record};
