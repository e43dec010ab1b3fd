//! # IBC State Tree
//!
//! ICS-23 style Merkle tree over the gateway's IBC state.
//!
//! ## Algorithm
//!
//! 1. Sort leaves by key
//! 2. Leaf hash = `SHA-256(varint(len key) ‖ key ‖ varint(len value) ‖ value)`
//! 3. Parent = `SHA-256(0x01 ‖ left ‖ right)`; an odd trailing node is promoted
//! 4. An empty tree has the all-zero root

use crate::domain::Hash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Root of an empty tree.
pub const EMPTY_ROOT: Hash = [0u8; 32];

const INNER_PREFIX: u8 = 0x01;

/// Sorted key/value Merkle tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ics23MerkleTree {
    leaves: BTreeMap<String, Vec<u8>>,
}

/// One hashing step from child to parent: `SHA-256(prefix ‖ child ‖ suffix)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerOp {
    /// Bytes hashed before the child.
    pub prefix: Vec<u8>,
    /// Bytes hashed after the child.
    pub suffix: Vec<u8>,
}

/// Existence proof for one key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistenceProof {
    /// Proven key.
    pub key: String,
    /// Proven value.
    pub value: Vec<u8>,
    /// Inner ops from leaf to root.
    pub path: Vec<InnerOp>,
}

impl Ics23MerkleTree {
    /// Empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.leaves.insert(key.into(), value);
    }

    /// Value at `key`.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.leaves.get(key).map(Vec::as_slice)
    }

    /// Remove `key`, returning its value.
    pub fn delete(&mut self, key: &str) -> Option<Vec<u8>> {
        self.leaves.remove(key)
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Current root.
    pub fn root(&self) -> Hash {
        let mut level: Vec<Hash> = self
            .leaves
            .iter()
            .map(|(k, v)| leaf_hash(k.as_bytes(), v))
            .collect();
        if level.is_empty() {
            return EMPTY_ROOT;
        }
        while level.len() > 1 {
            level = next_level(&level);
        }
        level[0]
    }

    /// Current root, lowercase hex.
    pub fn root_hex(&self) -> String {
        hex::encode(self.root())
    }

    /// Existence proof for `key`, if present.
    pub fn proof(&self, key: &str) -> Option<ExistenceProof> {
        let value = self.leaves.get(key)?.clone();
        let mut index = self.leaves.keys().position(|k| k == key)?;
        let mut level: Vec<Hash> = self
            .leaves
            .iter()
            .map(|(k, v)| leaf_hash(k.as_bytes(), v))
            .collect();

        let mut path = Vec::new();
        while level.len() > 1 {
            if index % 2 == 1 {
                let mut prefix = vec![INNER_PREFIX];
                prefix.extend_from_slice(&level[index - 1]);
                path.push(InnerOp {
                    prefix,
                    suffix: Vec::new(),
                });
            } else if index + 1 < level.len() {
                path.push(InnerOp {
                    prefix: vec![INNER_PREFIX],
                    suffix: level[index + 1].to_vec(),
                });
            }
            level = next_level(&level);
            index /= 2;
        }

        Some(ExistenceProof {
            key: key.to_string(),
            value,
            path,
        })
    }

    /// Recompute the root from `proof` and compare.
    pub fn verify(proof: &ExistenceProof, expected_root: &Hash) -> bool {
        let mut current = leaf_hash(proof.key.as_bytes(), &proof.value);
        for op in &proof.path {
            let mut hasher = Sha256::new();
            hasher.update(&op.prefix);
            hasher.update(current);
            hasher.update(&op.suffix);
            current = hasher.finalize().into();
        }
        current == *expected_root
    }
}

/// Leaf hash with length-prefixed key and value.
pub fn leaf_hash(key: &[u8], value: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(encode_varint(key.len() as u64));
    hasher.update(key);
    hasher.update(encode_varint(value.len() as u64));
    hasher.update(value);
    hasher.finalize().into()
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|pair| match pair.get(1) {
            Some(right) => inner_hash(&pair[0], right),
            None => pair[0],
        })
        .collect()
}

fn inner_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([INNER_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Protobuf unsigned varint.
fn encode_varint(mut n: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

// =============================================================================
// Keys
// =============================================================================

/// `clients/{id}/clientState`
pub fn client_state_key(client_id: &str) -> String {
    format!("clients/{}/clientState", client_id)
}

/// `connections/{id}`
pub fn connection_key(connection_id: &str) -> String {
    format!("connections/{}", connection_id)
}

/// `channelEnds/ports/{port}/channels/{id}`
pub fn channel_key(port_id: &str, channel_id: &str) -> String {
    format!("channelEnds/ports/{}/channels/{}", port_id, channel_id)
}

/// `commitments/ports/{port}/channels/{id}/sequences/{seq}`
pub fn packet_commitment_key(port_id: &str, channel_id: &str, sequence: u64) -> String {
    format!(
        "commitments/ports/{}/channels/{}/sequences/{}",
        port_id, channel_id, sequence
    )
}

/// `receipts/ports/{port}/channels/{id}/sequences/{seq}`
pub fn packet_receipt_key(port_id: &str, channel_id: &str, sequence: u64) -> String {
    format!(
        "receipts/ports/{}/channels/{}/sequences/{}",
        port_id, channel_id, sequence
    )
}

/// `acks/ports/{port}/channels/{id}/sequences/{seq}`
pub fn packet_ack_key(port_id: &str, channel_id: &str, sequence: u64) -> String {
    format!(
        "acks/ports/{}/channels/{}/sequences/{}",
        port_id, channel_id, sequence
    )
}

/// Value stored under a receipt key.
pub const RECEIPT_VALUE: &[u8] = &[0x01];

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree(n: usize) -> Ics23MerkleTree {
        let mut tree = Ics23MerkleTree::new();
        for i in 0..n {
            tree.set(connection_key(&format!("connection-{}", i)), vec![i as u8; 4]);
        }
        tree
    }

    #[test]
    fn test_empty_root_is_zero() {
        assert_eq!(Ics23MerkleTree::new().root(), EMPTY_ROOT);
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let mut tree = Ics23MerkleTree::new();
        tree.set("a", b"1".to_vec());
        assert_eq!(tree.root(), leaf_hash(b"a", b"1"));
    }

    #[test]
    fn test_root_independent_of_insert_order() {
        let mut a = Ics23MerkleTree::new();
        a.set("x", vec![1]);
        a.set("y", vec![2]);
        let mut b = Ics23MerkleTree::new();
        b.set("y", vec![2]);
        b.set("x", vec![1]);
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_three_leaves_promote_odd_node() {
        let mut tree = Ics23MerkleTree::new();
        tree.set("a", vec![1]);
        tree.set("b", vec![2]);
        tree.set("c", vec![3]);
        let ab = inner_hash(&leaf_hash(b"a", &[1]), &leaf_hash(b"b", &[2]));
        let expected = inner_hash(&ab, &leaf_hash(b"c", &[3]));
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn test_proofs_verify_for_every_key() {
        for n in 1..9 {
            let tree = sample_tree(n);
            let root = tree.root();
            for i in 0..n {
                let key = connection_key(&format!("connection-{}", i));
                let proof = tree.proof(&key).unwrap();
                assert!(Ics23MerkleTree::verify(&proof, &root), "n={} i={}", n, i);
            }
        }
    }

    #[test]
    fn test_tampered_proof_fails() {
        let tree = sample_tree(5);
        let mut proof = tree.proof(&connection_key("connection-2")).unwrap();
        proof.value = vec![0xff];
        assert!(!Ics23MerkleTree::verify(&proof, &tree.root()));
    }

    #[test]
    fn test_delete_restores_root() {
        let mut tree = sample_tree(3);
        let before = tree.root();
        tree.set(packet_receipt_key("transfer", "channel-0", 1), RECEIPT_VALUE.to_vec());
        assert_ne!(tree.root(), before);
        tree.delete(&packet_receipt_key("transfer", "channel-0", 1));
        assert_eq!(tree.root(), before);
    }

    #[test]
    fn test_varint() {
        assert_eq!(encode_varint(1), vec![1]);
        assert_eq!(encode_varint(300), vec![0xac, 0x02]);
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(client_state_key("07-tendermint-0"), "clients/07-tendermint-0/clientState");
        assert_eq!(
            channel_key("transfer", "channel-1"),
            "channelEnds/ports/transfer/channels/channel-1"
        );
        assert_eq!(
            packet_commitment_key("transfer", "channel-1", 4),
            "commitments/ports/transfer/channels/channel-1/sequences/4"
        );
    }
}
