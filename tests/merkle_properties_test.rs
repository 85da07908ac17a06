//! Merkle Tree Property Tests
//!
//! Exhaustive checks over small trees: every leaf count from 1 to 33 and
//! every leaf index, which covers every odd/even level shape up to depth 6.

mod common;

use common::sample_records;
use log_anchor::error::AnchorError;
use log_anchor::merkle::{
    expected_proof_len, hash_bytes, hash_pair, recompute_root, verify_proof, MerkleHash, MerkleTree, OddNodePolicy,
    ProofStep, Side, ODD_NODE_POLICY,
};
use log_anchor::record::hash_records;

const MAX_LEAVES: usize = 33;

fn digests(count: usize) -> Vec<MerkleHash> {
    hash_records(&sample_records(count)).unwrap()
}

#[test]
fn test_build_is_deterministic() {
    for n in 1..=MAX_LEAVES {
        let records = sample_records(n);
        let first = MerkleTree::from_records(&records).unwrap();
        let second = MerkleTree::from_records(&records.clone()).unwrap();
        assert_eq!(first.root(), second.root(), "n = {}", n);
        assert_eq!(first.levels(), second.levels());
    }
}

#[test]
fn test_single_leaf_root_is_the_leaf() {
    for tag in ["a", "b", "", "0x00"] {
        let leaf = hash_bytes(tag.as_bytes());
        for policy in [OddNodePolicy::DuplicateLast, OddNodePolicy::CarryForward] {
            let tree = MerkleTree::build_with_policy(&[leaf], policy).unwrap();
            assert_eq!(tree.root(), leaf);
            assert!(tree.prove(0).unwrap().is_empty());
        }
    }
}

#[test]
fn test_every_proof_verifies() {
    for policy in [OddNodePolicy::DuplicateLast, OddNodePolicy::CarryForward] {
        for n in 1..=MAX_LEAVES {
            let leaves = digests(n);
            let tree = MerkleTree::build_with_policy(&leaves, policy).unwrap();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = tree.prove(i).unwrap();
                assert!(
                    verify_proof(leaf, &proof.steps, &tree.root()),
                    "{:?}: leaf {} of {} failed",
                    policy,
                    i,
                    n
                );
            }
        }
    }
}

#[test]
fn test_substituted_leaf_fails() {
    for n in 1..=MAX_LEAVES {
        let leaves = digests(n);
        let tree = MerkleTree::build(&leaves).unwrap();
        let foreign = hash_bytes(b"not in the batch");

        for i in 0..n {
            let proof = tree.prove(i).unwrap();
            assert!(!verify_proof(&foreign, &proof.steps, &tree.root()));

            // Every other leaf of the same tree is also wrong for this path
            for (j, other) in leaves.iter().enumerate() {
                if *other != leaves[i] {
                    assert!(!verify_proof(other, &proof.steps, &tree.root()), "leaf {} under path {}", j, i);
                }
            }
        }
    }
}

#[test]
fn test_single_bit_flips_fail() {
    for n in [1, 2, 3, 7, 8, 13] {
        let leaves = digests(n);
        let tree = MerkleTree::build(&leaves).unwrap();
        for (i, leaf) in leaves.iter().enumerate() {
            let proof = tree.prove(i).unwrap();
            for bit in 0..256 {
                assert!(!verify_proof(&leaf.with_bit_flipped(bit), &proof.steps, &tree.root()));
                assert!(!verify_proof(leaf, &proof.steps, &tree.root().with_bit_flipped(bit)));
            }
        }
    }
}

#[test]
fn test_record_mutations_fail() {
    let records = sample_records(9);
    let tree = MerkleTree::from_records(&records).unwrap();

    for (i, record) in records.iter().enumerate() {
        let proof = tree.prove(i).unwrap();
        let mut mutations = Vec::new();

        let mut m = record.clone();
        m.payload.push(' ');
        mutations.push(m);
        let mut m = record.clone();
        m.classification = format!("{}x", m.classification);
        mutations.push(m);
        let mut m = record.clone();
        m.confidence += 0.001;
        mutations.push(m);
        let mut m = record.clone();
        m.source_ip = "192.0.2.255".to_string();
        mutations.push(m);
        let mut m = record.clone();
        m.endpoint.push('/');
        mutations.push(m);
        let mut m = record.clone();
        m.timestamp = "2024-12-31T23:59:59.999Z".to_string();
        mutations.push(m);

        for mutated in mutations {
            let digest = mutated.leaf_digest().unwrap();
            assert!(!verify_proof(&digest, &proof.steps, &tree.root()));
        }
    }
}

#[test]
fn test_proof_length_is_ceil_log2() {
    assert_eq!(ODD_NODE_POLICY, OddNodePolicy::DuplicateLast);

    for n in 1..=MAX_LEAVES {
        let tree = MerkleTree::build(&digests(n)).unwrap();
        let expected = if n == 1 { 0 } else { (n as f64).log2().ceil() as usize };
        assert_eq!(expected_proof_len(n), expected);

        for i in 0..n {
            assert_eq!(tree.prove(i).unwrap().len(), expected, "leaf {} of {}", i, n);
        }
    }
}

#[test]
fn test_order_changes_root() {
    for n in 2..=MAX_LEAVES {
        let leaves = digests(n);
        let root = MerkleTree::build(&leaves).unwrap().root();

        let mut reversed = leaves.clone();
        reversed.reverse();
        assert_ne!(MerkleTree::build(&reversed).unwrap().root(), root, "n = {}", n);

        let mut swapped = leaves.clone();
        swapped.swap(0, 1);
        assert_ne!(MerkleTree::build(&swapped).unwrap().root(), root, "n = {}", n);
    }
}

#[test]
fn test_three_record_scenario() {
    let leaves = digests(3);
    let (h0, h1, h2) = (leaves[0], leaves[1], leaves[2]);
    let tree = MerkleTree::build(&leaves).unwrap();

    let level1 = [hash_pair(&h0, &h1), hash_pair(&h2, &h2)];
    assert_eq!(tree.levels()[1], level1.to_vec());
    assert_eq!(tree.root(), hash_pair(&level1[0], &level1[1]));

    let proof = tree.prove(2).unwrap();
    assert_eq!(
        proof.steps,
        vec![
            ProofStep { sibling: h2, side: Side::Right },
            ProofStep { sibling: level1[0], side: Side::Left },
        ]
    );
    assert_eq!(recompute_root(&h2, &proof.steps), tree.root());
}

#[test]
fn test_empty_leaf_list_is_rejected() {
    assert!(matches!(MerkleTree::build(&[]), Err(AnchorError::EmptyBatch)));
    assert!(matches!(
        MerkleTree::build_with_policy(&[], OddNodePolicy::CarryForward),
        Err(AnchorError::EmptyBatch)
    ));
}

#[test]
fn test_proof_from_other_policy_fails_on_odd_trees() {
    for n in [3, 5, 6, 7, 9, 11] {
        let leaves = digests(n);
        let duplicate = MerkleTree::build_with_policy(&leaves, OddNodePolicy::DuplicateLast).unwrap();
        let carry = MerkleTree::build_with_policy(&leaves, OddNodePolicy::CarryForward).unwrap();

        let last = n - 1;
        let carry_proof = carry.prove(last).unwrap();
        assert!(!verify_proof(&leaves[last], &carry_proof.steps, &duplicate.root()), "n = {}", n);
    }
}
