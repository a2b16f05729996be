//! Inclusion and exclusion proofs (§4.6): a proof is just the set of node
//! CIDs on the search path a [`Walker`] takes while resolving a key, so a
//! verifier holding only those blocks can confirm a key is (or isn't)
//! present without the rest of the tree.

use std::collections::HashSet;

use ipld_core::cid::Cid;

use crate::blockstore::BlockStore;
use crate::node_store::{self, NodeStore};
use crate::walker::{self, Walker};

/// Resolves `key` against `root_cid` and returns both its value (if any)
/// and the proof — the CIDs of every node visited along the way.
pub fn find_with_proof<S: BlockStore>(
    ns: &NodeStore<S>,
    root_cid: Cid,
    key: &[u8],
) -> Result<(Option<Cid>, HashSet<Cid>), Error> {
    let mut walker = Walker::new(ns, Some(root_cid))?;
    let value = walker.find(key)?;
    let proof = walker.stack_cids().into_iter().collect();
    Ok((value, proof))
}

/// Builds an inclusion proof for `key`, which must be present under
/// `root_cid`. Fails with [`Error::ProofError`] if `key` isn't there —
/// use [`find_with_proof`] directly when the presence of `key` is itself
/// unknown.
pub fn build_inclusion_proof<S: BlockStore>(
    ns: &NodeStore<S>,
    root_cid: Cid,
    key: &[u8],
) -> Result<(Cid, HashSet<Cid>), Error> {
    let (value, proof) = find_with_proof(ns, root_cid, key)?;
    match value {
        Some(value) => Ok((value, proof)),
        None => Err(Error::ProofError(format!(
            "cannot build an inclusion proof: key {key:?} is absent"
        ))),
    }
}

/// Builds an exclusion proof for `key`, which must be absent under
/// `root_cid`. Fails with [`Error::ProofError`] if `key` is actually
/// present — use [`find_with_proof`] directly when the presence of `key`
/// is itself unknown.
pub fn build_exclusion_proof<S: BlockStore>(
    ns: &NodeStore<S>,
    root_cid: Cid,
    key: &[u8],
) -> Result<HashSet<Cid>, Error> {
    let (value, proof) = find_with_proof(ns, root_cid, key)?;
    match value {
        None => Ok(proof),
        Some(_) => Err(Error::ProofError(format!(
            "cannot build an exclusion proof: key {key:?} is present"
        ))),
    }
}

/// Confirms `key` resolves to a value under `root_cid`.
pub fn verify_inclusion<S: BlockStore>(ns: &NodeStore<S>, root_cid: Cid, key: &[u8]) -> Result<(), Error> {
    let mut walker = Walker::new(ns, Some(root_cid))?;
    match walker.find(key) {
        Ok(None) => Err(Error::Invalid("key not present in tree".to_string())),
        Ok(Some(_)) => Ok(()),
        Err(walker::Error::NodeStore(_)) => Err(Error::Invalid("proof is missing required blocks".to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Confirms `key` is absent under `root_cid`.
pub fn verify_exclusion<S: BlockStore>(ns: &NodeStore<S>, root_cid: Cid, key: &[u8]) -> Result<(), Error> {
    let mut walker = Walker::new(ns, Some(root_cid))?;
    match walker.find(key) {
        Ok(None) => Ok(()),
        Ok(Some(_)) => Err(Error::Invalid("key is present in tree".to_string())),
        Err(walker::Error::NodeStore(_)) => Err(Error::Invalid("proof is missing required blocks".to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Errors that can occur while building or checking a proof.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid proof: {0}")]
    Invalid(String),
    #[error("cannot build proof: {0}")]
    ProofError(String),
    #[error(transparent)]
    NodeStore(#[from] node_store::Error),
    #[error(transparent)]
    Walker(#[from] walker::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockstore::{BlockStore, MemoryBlockStore, OverlayBlockStore};
    use crate::node::Node;
    use crate::wrangler::Wrangler;

    fn cid(n: u8) -> Cid {
        use ipld_core::cid::multihash::Multihash;
        Cid::new_v1(0x71, Multihash::wrap(0x12, &[n; 32]).unwrap())
    }

    fn build_tree() -> (NodeStore<MemoryBlockStore>, Cid) {
        let ns = NodeStore::new(MemoryBlockStore::new());
        let w = Wrangler::new(&ns);
        let mut root = ns.put(Node::empty_root()).unwrap().cid();
        for (i, key) in (0u8..50).map(|i| format!("rec/{i}")).enumerate() {
            root = w.put_record(root, key.as_bytes(), cid(i as u8)).unwrap();
        }
        (ns, root)
    }

    #[test]
    fn inclusion_proof_succeeds_for_present_key() {
        let (ns, root) = build_tree();
        assert!(verify_inclusion(&ns, root, b"rec/10").is_ok());
    }

    #[test]
    fn inclusion_proof_fails_for_absent_key() {
        let (ns, root) = build_tree();
        assert!(verify_inclusion(&ns, root, b"rec/nope").is_err());
    }

    #[test]
    fn exclusion_proof_succeeds_for_absent_key() {
        let (ns, root) = build_tree();
        assert!(verify_exclusion(&ns, root, b"rec/nope").is_ok());
    }

    #[test]
    fn exclusion_proof_fails_for_present_key() {
        let (ns, root) = build_tree();
        assert!(verify_exclusion(&ns, root, b"rec/10").is_err());
    }

    #[test]
    fn build_inclusion_proof_succeeds_for_present_key() {
        let (ns, root) = build_tree();
        let (value, proof_cids) = build_inclusion_proof(&ns, root, b"rec/10").unwrap();
        assert_eq!(value, cid(10));
        assert!(!proof_cids.is_empty());
    }

    #[test]
    fn build_inclusion_proof_rejects_an_absent_key() {
        let (ns, root) = build_tree();
        assert!(matches!(build_inclusion_proof(&ns, root, b"rec/nope"), Err(Error::ProofError(_))));
    }

    #[test]
    fn build_exclusion_proof_succeeds_for_absent_key() {
        let (ns, root) = build_tree();
        let proof_cids = build_exclusion_proof(&ns, root, b"rec/nope").unwrap();
        assert!(!proof_cids.is_empty());
    }

    #[test]
    fn build_exclusion_proof_rejects_a_present_key() {
        let (ns, root) = build_tree();
        assert!(matches!(build_exclusion_proof(&ns, root, b"rec/10"), Err(Error::ProofError(_))));
    }

    #[test]
    fn proof_blocks_are_sufficient_to_verify_without_the_rest_of_the_tree() {
        let (ns, root) = build_tree();
        let (_value, proof_cids) = find_with_proof(&ns, root, b"rec/25").unwrap();

        let pruned = MemoryBlockStore::new();
        for block_cid in &proof_cids {
            let bytes = ns.get(Some(*block_cid)).unwrap().serialize();
            pruned.put_block(*block_cid, bytes).unwrap();
        }
        let pruned_ns = NodeStore::new(OverlayBlockStore::new(pruned, MemoryBlockStore::new()));
        assert!(verify_inclusion(&pruned_ns, root, b"rec/25").is_ok());
    }
}
