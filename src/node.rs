//! The MST [`Node`] data model and its canonical DAG-CBOR (de)serialization.
//!
//! k/v pairs are interleaved between subtrees like so:
//!
//! ```text
//! keys:          (0,    1,    2,    3)
//! vals:          (0,    1,    2,    3)
//! subtrees:   (0,    1,    2,    3,    4)
//! ```

use ipld_core::cid::{multihash::Multihash, Cid};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// DAG-CBOR multicodec code.
pub const DAG_CBOR: u64 = 0x71;
/// SHA2-256 multihash code.
pub const SHA2_256: u64 = 0x12;

/// An immutable node in a Merkle Search Tree.
///
/// `keys`/`vals` are positionally aligned and strictly ascending; `subtrees`
/// has exactly one more entry than `keys`, where `subtrees[i]` holds
/// everything strictly between `keys[i-1]` and `keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    keys: Vec<Vec<u8>>,
    vals: Vec<Cid>,
    subtrees: Vec<Option<Cid>>,
}

impl Node {
    /// Builds a node from its parallel sequences, checking the structural
    /// invariants from spec.md §3 (ascending keys, matching lengths).
    pub fn new(
        keys: Vec<Vec<u8>>,
        vals: Vec<Cid>,
        subtrees: Vec<Option<Cid>>,
    ) -> Result<Self, Error> {
        if subtrees.len() != keys.len() + 1 {
            return Err(Error::InvalidSubtreeCount);
        }
        if keys.len() != vals.len() {
            return Err(Error::MismatchedLengths);
        }
        if !keys.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::KeysNotAscending);
        }
        Ok(Self { keys, vals, subtrees })
    }

    /// The canonical empty node: no keys, a single `None` subtree slot.
    pub fn empty_root() -> Self {
        Self { keys: vec![], vals: vec![], subtrees: vec![None] }
    }

    pub fn is_empty(&self) -> bool {
        self.subtrees.len() == 1 && self.subtrees[0].is_none()
    }

    pub fn keys(&self) -> &[Vec<u8>] {
        &self.keys
    }

    pub fn vals(&self) -> &[Cid] {
        &self.vals
    }

    pub fn subtrees(&self) -> &[Option<Cid>] {
        &self.subtrees
    }

    /// `None` if this node is empty, else its own CID.
    pub fn to_optional_cid(&self) -> Option<Cid> {
        if self.is_empty() {
            None
        } else {
            Some(self.cid())
        }
    }

    /// The height at which this node's keys live, per spec.md §3.
    ///
    /// An empty node is height 0 by convention. A non-root node with no keys
    /// should never occur (the wrangler always squashes those away), so that
    /// case is a logic error, not a recoverable one.
    pub fn height(&self) -> u32 {
        if let Some(key) = self.keys.first() {
            key_height(key)
        } else if self.subtrees[0].is_none() {
            0
        } else {
            panic!("node has no keys but a non-empty sole subtree: cannot determine height")
        }
    }

    /// Smallest `i` with `keys[i] >= key`, or `keys.len()` if none.
    pub fn gte_index(&self, key: &[u8]) -> usize {
        self.keys.partition_point(|k| k.as_slice() < key)
    }

    /// Canonical DAG-CBOR encoding of this node (§4.1).
    pub fn serialize(&self) -> Vec<u8> {
        let mut entries = Vec::with_capacity(self.keys.len());
        let mut prev_key: &[u8] = &[];
        for ((key, val), tree) in self.keys.iter().zip(&self.vals).zip(&self.subtrees[1..]) {
            let prefix_len = prev_key.iter().zip(key).take_while(|(a, b)| a == b).count();
            entries.push(RawEntry {
                prefix_len,
                key_suffix: serde_bytes::ByteBuf::from(key[prefix_len..].to_vec()),
                value: *val,
                tree: *tree,
            });
            prev_key = key;
        }
        let raw = RawNode { left: self.subtrees[0], entries };
        serde_ipld_dagcbor::to_vec(&raw).expect("Node always serializes to valid DAG-CBOR")
    }

    /// The node's content-addressed identity: `cid-v1(dag-cbor, sha2-256(serialize()))`.
    pub fn cid(&self) -> Cid {
        let digest = Sha256::digest(self.serialize());
        let hash = Multihash::wrap(SHA2_256, digest.as_slice()).expect("digest is 32 bytes");
        Cid::new_v1(DAG_CBOR, hash)
    }

    /// Parses and validates a node from its canonical encoding (§4.1).
    ///
    /// Rejects anything that isn't the unique canonical byte form for its
    /// logical contents: non-maximal prefixes, out-of-order keys, and
    /// prefix lengths that overrun the previous key are all malformed.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let raw: RawNode =
            serde_ipld_dagcbor::from_slice(bytes).map_err(|e| Error::Cbor(e.to_string()))?;

        let mut keys = Vec::with_capacity(raw.entries.len());
        let mut vals = Vec::with_capacity(raw.entries.len());
        let mut subtrees = Vec::with_capacity(raw.entries.len() + 1);
        subtrees.push(raw.left);

        let mut prev_key: Vec<u8> = Vec::new();
        for entry in raw.entries {
            if entry.prefix_len > prev_key.len() {
                return Err(Error::InvalidPrefixLen);
            }
            let suffix = entry.key_suffix.into_vec();
            if let Some(&prev_next_byte) = prev_key.get(entry.prefix_len) {
                if suffix.first() == Some(&prev_next_byte) {
                    return Err(Error::NonMaximalPrefix);
                }
            }
            let mut this_key = prev_key[..entry.prefix_len].to_vec();
            this_key.extend_from_slice(&suffix);
            if this_key <= prev_key {
                return Err(Error::KeysNotAscending);
            }
            prev_key = this_key.clone();
            keys.push(this_key);
            vals.push(entry.value);
            subtrees.push(entry.tree);
        }

        Ok(Self { keys, vals, subtrees })
    }
}

/// Height of a key under the MST's key-height function (GLOSSARY).
///
/// `floor(leading_zero_bits(sha256(key)) / 2)`. Depends only on the key
/// bytes, never on tree contents — this is what makes the tree's shape
/// order-independent.
pub fn key_height(key: &[u8]) -> u32 {
    let digest = Sha256::digest(key);
    let mut leading_zeros = 0u32;
    for byte in digest.iter() {
        if *byte == 0 {
            leading_zeros += 8;
        } else {
            leading_zeros += byte.leading_zeros();
            break;
        }
    }
    leading_zeros / 2
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNode {
    #[serde(rename = "l")]
    left: Option<Cid>,
    #[serde(rename = "e")]
    entries: Vec<RawEntry>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    #[serde(rename = "p")]
    prefix_len: usize,
    #[serde(rename = "k")]
    key_suffix: serde_bytes::ByteBuf,
    #[serde(rename = "v")]
    value: Cid,
    #[serde(rename = "t")]
    tree: Option<Cid>,
}

/// Errors that can occur while building or parsing a [`Node`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("subtrees must have exactly one more entry than keys")]
    InvalidSubtreeCount,
    #[error("keys and vals must have the same length")]
    MismatchedLengths,
    #[error("keys must be strictly ascending")]
    KeysNotAscending,
    #[error("entry prefix_len exceeds the previous key's length")]
    InvalidPrefixLen,
    #[error("entry key prefix is not maximal (non-canonical encoding)")]
    NonMaximalPrefix,
    #[error("malformed DAG-CBOR node: {0}")]
    Cbor(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid_of(data: &[u8]) -> Cid {
        let digest = Sha256::digest(data);
        Cid::new_v1(DAG_CBOR, Multihash::wrap(SHA2_256, digest.as_slice()).unwrap())
    }

    #[test]
    fn empty_root_round_trips() {
        let node = Node::empty_root();
        let bytes = node.serialize();
        let parsed = Node::deserialize(&bytes).unwrap();
        assert_eq!(node, parsed);
        assert_eq!(bytes, parsed.serialize());
    }

    #[test]
    fn single_entry_round_trips() {
        let node = Node::new(
            vec![b"hello".to_vec()],
            vec![cid_of(b"blah")],
            vec![None, None],
        )
        .unwrap();
        let bytes = node.serialize();
        let parsed = Node::deserialize(&bytes).unwrap();
        assert_eq!(node, parsed);
        assert_eq!(bytes, parsed.serialize());
    }

    #[test]
    fn shared_prefix_is_compressed_and_reconstructed() {
        let node = Node::new(
            vec![b"app.bsky.feed.post/1".to_vec(), b"app.bsky.feed.post/2".to_vec()],
            vec![cid_of(b"a"), cid_of(b"b")],
            vec![None, None, None],
        )
        .unwrap();
        let parsed = Node::deserialize(&node.serialize()).unwrap();
        assert_eq!(parsed.keys(), node.keys());
    }

    #[test]
    fn rejects_out_of_order_keys() {
        let raw = RawNode {
            left: None,
            entries: vec![
                RawEntry {
                    prefix_len: 0,
                    key_suffix: serde_bytes::ByteBuf::from(b"b".to_vec()),
                    value: cid_of(b"x"),
                    tree: None,
                },
                RawEntry {
                    prefix_len: 0,
                    key_suffix: serde_bytes::ByteBuf::from(b"a".to_vec()),
                    value: cid_of(b"y"),
                    tree: None,
                },
            ],
        };
        let bytes = serde_ipld_dagcbor::to_vec(&raw).unwrap();
        assert!(matches!(Node::deserialize(&bytes), Err(Error::KeysNotAscending)));
    }

    #[test]
    fn rejects_unknown_top_level_field() {
        #[derive(Serialize)]
        struct RawNodeWithJunk {
            #[serde(rename = "l")]
            left: Option<Cid>,
            #[serde(rename = "e")]
            entries: Vec<RawEntry>,
            junk: u8,
        }
        let raw = RawNodeWithJunk { left: None, entries: vec![], junk: 1 };
        let bytes = serde_ipld_dagcbor::to_vec(&raw).unwrap();
        assert!(matches!(Node::deserialize(&bytes), Err(Error::Cbor(_))));
    }

    #[test]
    fn rejects_non_maximal_prefix() {
        // prev_key = "ab", next entry claims prefix_len=1 but its suffix
        // starts with the same byte prev_key[1] would've continued with.
        let raw = RawNode {
            left: None,
            entries: vec![
                RawEntry {
                    prefix_len: 0,
                    key_suffix: serde_bytes::ByteBuf::from(b"ab".to_vec()),
                    value: cid_of(b"x"),
                    tree: None,
                },
                RawEntry {
                    prefix_len: 1,
                    key_suffix: serde_bytes::ByteBuf::from(b"bc".to_vec()),
                    value: cid_of(b"y"),
                    tree: None,
                },
            ],
        };
        let bytes = serde_ipld_dagcbor::to_vec(&raw).unwrap();
        assert!(matches!(Node::deserialize(&bytes), Err(Error::NonMaximalPrefix)));
    }

    #[test]
    fn key_height_is_deterministic() {
        let h1 = key_height(b"some/key");
        let h2 = key_height(b"some/key");
        assert_eq!(h1, h2);
    }

    #[test]
    fn gte_index_finds_insertion_point() {
        let node = Node::new(
            vec![b"a".to_vec(), b"c".to_vec(), b"e".to_vec()],
            vec![cid_of(b"1"), cid_of(b"2"), cid_of(b"3")],
            vec![None, None, None, None],
        )
        .unwrap();
        assert_eq!(node.gte_index(b"a"), 0);
        assert_eq!(node.gte_index(b"b"), 1);
        assert_eq!(node.gte_index(b"e"), 2);
        assert_eq!(node.gte_index(b"f"), 3);
    }
}
