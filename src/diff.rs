//! Structural diffing between two MST roots (§4.5), and deriving record-level
//! changes from the resulting node sets.

use std::collections::{HashMap, HashSet};

use ipld_core::cid::Cid;

use crate::blockstore::BlockStore;
use crate::node::Node;
use crate::node_store::{self, NodeStore};
use crate::walker::{self, Walker};

/// A single record-level change, as derived by [`record_diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    Created { key: Vec<u8>, value: Cid },
    Updated { key: Vec<u8>, old: Cid, new: Cid },
    Deleted { key: Vec<u8>, value: Cid },
}

/// Efficiently computes the structural difference between two MST roots:
/// the set of node CIDs present in `root_b` but not `root_a` ("created"),
/// and vice versa ("deleted"). Skips identical subtrees entirely rather
/// than visiting every node.
pub fn mst_diff<S: BlockStore>(
    ns: &NodeStore<S>,
    root_a: Cid,
    root_b: Cid,
) -> Result<(HashSet<Cid>, HashSet<Cid>), Error> {
    let mut created = HashSet::new();
    let mut deleted = HashSet::new();
    let a = Walker::new(ns, Some(root_a))?;
    let b = Walker::new(ns, Some(root_b))?;
    diff_recursive(&mut created, &mut deleted, a, b)?;

    // The recursive walk occasionally reports the same node as both created
    // and deleted (a false positive from how subtree cursors are scoped);
    // such entries cancel out.
    let middle: Vec<Cid> = created.intersection(&deleted).copied().collect();
    for cid in middle {
        created.remove(&cid);
        deleted.remove(&cid);
    }

    let empty_cid = Node::empty_root().cid();
    if root_a == empty_cid && root_b != empty_cid {
        deleted.insert(empty_cid);
    }
    if root_b == empty_cid && root_a != empty_cid {
        created.insert(empty_cid);
    }

    Ok((created, deleted))
}

/// Computes the same result as [`mst_diff`] by brute-force enumeration of
/// every reachable node in both trees. Much slower on large trees, but
/// useful as an oracle to check [`mst_diff`] against.
pub fn very_slow_mst_diff<S: BlockStore>(
    ns: &NodeStore<S>,
    root_a: Cid,
    root_b: Cid,
) -> Result<(HashSet<Cid>, HashSet<Cid>), Error> {
    let a_nodes: HashSet<Cid> =
        Walker::new(ns, Some(root_a))?.iter_node_cids().collect::<Result<_, walker::Error>>()?;
    let b_nodes: HashSet<Cid> =
        Walker::new(ns, Some(root_b))?.iter_node_cids().collect::<Result<_, walker::Error>>()?;
    Ok((
        b_nodes.difference(&a_nodes).copied().collect(),
        a_nodes.difference(&b_nodes).copied().collect(),
    ))
}

fn diff_recursive<'w, S: BlockStore>(
    created: &mut HashSet<Cid>,
    deleted: &mut HashSet<Cid>,
    mut a: Walker<'w, S>,
    mut b: Walker<'w, S>,
) -> Result<(), Error> {
    let a_node = a.current_node();
    let b_node = b.current_node();
    if a_node == b_node {
        return Ok(());
    }

    if a_node.is_empty() {
        for cid in b.iter_node_cids() {
            created.insert(cid?);
        }
        return Ok(());
    }
    if b_node.is_empty() {
        for cid in a.iter_node_cids() {
            deleted.insert(cid?);
        }
        return Ok(());
    }

    // These are false-positives when one tree is a subtree of the other;
    // the caller subtracts the intersection of created/deleted afterwards.
    created.insert(b_node.cid());
    deleted.insert(a_node.cid());

    loop {
        while a.rpath() != b.rpath() {
            // Leapfrogging: the two cursors can pass each other, so this has
            // to be a loop rather than a single catch-up pass.
            while a.rpath() < b.rpath() && !a.is_final() {
                if a.subtree().is_some() {
                    a.down()?;
                    deleted.insert(a.current_node().cid());
                } else {
                    a.right()?;
                }
            }
            while b.rpath() < a.rpath() && !b.is_final() {
                if b.subtree().is_some() {
                    b.down()?;
                    created.insert(b.current_node().cid());
                } else {
                    b.right()?;
                }
            }
        }

        diff_recursive(created, deleted, a.subtree_walker()?, b.subtree_walker()?)?;

        if a.at_outer_edge() && b.at_outer_edge() {
            break;
        }
        a.right()?;
        b.right()?;
    }

    Ok(())
}

/// Derives per-key record changes from the node sets returned by
/// [`mst_diff`] or [`very_slow_mst_diff`].
pub fn record_diff<S: BlockStore>(
    ns: &NodeStore<S>,
    created: &HashSet<Cid>,
    deleted: &HashSet<Cid>,
) -> Result<Vec<RecordChange>, Error> {
    let kv_union = |cids: &HashSet<Cid>| -> Result<HashMap<Vec<u8>, Cid>, Error> {
        let mut out = HashMap::new();
        for cid in cids {
            let node = ns.get(Some(*cid))?;
            for (k, v) in node.keys().iter().zip(node.vals()) {
                out.insert(k.clone(), *v);
            }
        }
        Ok(out)
    };

    let created_kv = kv_union(created)?;
    let deleted_kv = kv_union(deleted)?;

    let mut changes = Vec::new();
    for (key, val) in &created_kv {
        if !deleted_kv.contains_key(key) {
            changes.push(RecordChange::Created { key: key.clone(), value: *val });
        }
    }
    for (key, new_val) in &created_kv {
        if let Some(old_val) = deleted_kv.get(key) {
            if old_val != new_val {
                changes.push(RecordChange::Updated { key: key.clone(), old: *old_val, new: *new_val });
            }
        }
    }
    for (key, val) in &deleted_kv {
        if !created_kv.contains_key(key) {
            changes.push(RecordChange::Deleted { key: key.clone(), value: *val });
        }
    }
    Ok(changes)
}

/// Errors that can occur while diffing two trees.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    NodeStore(#[from] node_store::Error),
    #[error(transparent)]
    Walker(#[from] walker::Error),
}
