//! [`Wrangler`] implements the MST's two write operations, `put_record` and
//! `del_record` (§4.3). Both take a root CID and a key, and return the CID
//! of the resulting tree; neither ever fails on a logically-absent change
//! (inserting the same key/value twice, or deleting an absent key, is a
//! nop that returns the same CID back).

use std::rc::Rc;

use ipld_core::cid::Cid;

use crate::blockstore::BlockStore;
use crate::node::{self, key_height, Node};
use crate::node_store::{self, NodeStore};

/// Transforms MST trees by `put`/`del`, backed by a [`NodeStore`].
pub struct Wrangler<'a, S> {
    ns: &'a NodeStore<S>,
}

impl<'a, S: BlockStore> Wrangler<'a, S> {
    pub fn new(ns: &'a NodeStore<S>) -> Self {
        Self { ns }
    }

    /// Inserts or updates `key -> val` under `root_cid`, returning the new
    /// root's CID.
    pub fn put_record(&self, root_cid: Cid, key: &[u8], val: Cid) -> Result<Cid, Error> {
        let root = self.ns.get(Some(root_cid))?;
        if root.is_empty() {
            return Ok(self.put_here(&root, key, val)?.cid());
        }
        let height = root.height();
        Ok(self.put_recursive(&root, key, val, key_height(key), height)?.cid())
    }

    /// Removes `key` from under `root_cid`, returning the new root's CID.
    /// A missing key is a nop: the returned CID equals `root_cid`.
    pub fn del_record(&self, root_cid: Cid, key: &[u8]) -> Result<Cid, Error> {
        let root = self.ns.get(Some(root_cid))?;
        let height = root.height();
        let new_cid = self.delete_recursive(&root, key, key_height(key), height)?;
        Ok(self.ns.get(self.squash_top(new_cid)?)?.cid())
    }

    fn put_here(&self, node: &Rc<Node>, key: &[u8], val: Cid) -> Result<Rc<Node>, Error> {
        let i = node.gte_index(key);
        if i < node.keys().len() && node.keys()[i] == key {
            if node.vals()[i] == val {
                return Ok(node.clone());
            }
            let mut vals = node.vals().to_vec();
            vals[i] = val;
            return Ok(self.ns.put(Node::new(node.keys().to_vec(), vals, node.subtrees().to_vec())?)?);
        }

        let (lsub, rsub) = self.split_on_key(node.subtrees()[i], key)?;
        let mut keys = node.keys().to_vec();
        keys.insert(i, key.to_vec());
        let mut vals = node.vals().to_vec();
        vals.insert(i, val);
        let mut subtrees = node.subtrees()[..i].to_vec();
        subtrees.push(lsub);
        subtrees.push(rsub);
        subtrees.extend_from_slice(&node.subtrees()[i + 1..]);
        Ok(self.ns.put(Node::new(keys, vals, subtrees)?)?)
    }

    fn put_recursive(
        &self,
        node: &Rc<Node>,
        key: &[u8],
        val: Cid,
        key_height: u32,
        tree_height: u32,
    ) -> Result<Rc<Node>, Error> {
        if key_height > tree_height {
            // Grow the tree by one level, then recurse into the new root.
            let wrapper = self.ns.put(Node::new(vec![], vec![], vec![Some(node.cid())])?)?;
            return self.put_recursive(&wrapper, key, val, key_height, tree_height + 1);
        }

        if key_height < tree_height {
            let i = node.gte_index(key);
            let child = self.ns.get(node.subtrees()[i])?;
            let new_child = self.put_recursive(&child, key, val, key_height, tree_height - 1)?;
            let mut subtrees = node.subtrees().to_vec();
            subtrees[i] = Some(new_child.cid());
            return Ok(self.ns.put(Node::new(node.keys().to_vec(), node.vals().to_vec(), subtrees)?)?);
        }

        self.put_here(node, key, val)
    }

    fn split_on_key(&self, node_cid: Option<Cid>, key: &[u8]) -> Result<(Option<Cid>, Option<Cid>), Error> {
        let Some(node_cid) = node_cid else {
            return Ok((None, None));
        };
        let node = self.ns.get(Some(node_cid))?;
        let i = node.gte_index(key);
        let (lsub, rsub) = self.split_on_key(node.subtrees()[i], key)?;

        let mut left_subtrees = node.subtrees()[..i].to_vec();
        left_subtrees.push(lsub);
        let left = self.ns.put(Node::new(node.keys()[..i].to_vec(), node.vals()[..i].to_vec(), left_subtrees)?)?;

        let mut right_subtrees = vec![rsub];
        right_subtrees.extend_from_slice(&node.subtrees()[i + 1..]);
        let right = self.ns.put(Node::new(node.keys()[i..].to_vec(), node.vals()[i..].to_vec(), right_subtrees)?)?;

        Ok((left.to_optional_cid(), right.to_optional_cid()))
    }

    /// Strips empty nodes off the top of the tree, so a tree that has
    /// shrunk back down reports the smallest height that still fits its
    /// contents.
    fn squash_top(&self, node_cid: Option<Cid>) -> Result<Option<Cid>, Error> {
        let node = self.ns.get(node_cid)?;
        if !node.keys().is_empty() || node.subtrees()[0].is_none() {
            return Ok(node_cid);
        }
        self.squash_top(node.subtrees()[0])
    }

    fn delete_recursive(
        &self,
        node: &Rc<Node>,
        key: &[u8],
        key_height: u32,
        tree_height: u32,
    ) -> Result<Option<Cid>, Error> {
        if key_height > tree_height {
            return Ok(node.to_optional_cid());
        }

        let i = node.gte_index(key);
        if key_height < tree_height {
            let Some(child_cid) = node.subtrees()[i] else {
                return Ok(node.to_optional_cid());
            };
            let child = self.ns.get(Some(child_cid))?;
            let new_child = self.delete_recursive(&child, key, key_height, tree_height - 1)?;
            let mut subtrees = node.subtrees().to_vec();
            subtrees[i] = new_child;
            let new_node = self.ns.put(Node::new(node.keys().to_vec(), node.vals().to_vec(), subtrees)?)?;
            return Ok(new_node.to_optional_cid());
        }

        if i == node.keys().len() || node.keys()[i] != key {
            return Ok(node.to_optional_cid());
        }

        let mut keys = node.keys().to_vec();
        keys.remove(i);
        let mut vals = node.vals().to_vec();
        vals.remove(i);
        let merged = self.merge(node.subtrees()[i], node.subtrees()[i + 1])?;
        let mut subtrees = node.subtrees()[..i].to_vec();
        subtrees.push(merged);
        subtrees.extend_from_slice(&node.subtrees()[i + 2..]);
        let new_node = self.ns.put(Node::new(keys, vals, subtrees)?)?;
        Ok(new_node.to_optional_cid())
    }

    fn merge(&self, left_cid: Option<Cid>, right_cid: Option<Cid>) -> Result<Option<Cid>, Error> {
        let (Some(left_cid), Some(right_cid)) = (left_cid, right_cid) else {
            return Ok(left_cid.or(right_cid));
        };
        let left = self.ns.get(Some(left_cid))?;
        let right = self.ns.get(Some(right_cid))?;

        let mut keys = left.keys().to_vec();
        keys.extend_from_slice(right.keys());
        let mut vals = left.vals().to_vec();
        vals.extend_from_slice(right.vals());

        let merged_mid = self.merge(*left.subtrees().last().unwrap(), right.subtrees()[0])?;
        let mut subtrees = left.subtrees()[..left.subtrees().len() - 1].to_vec();
        subtrees.push(merged_mid);
        subtrees.extend_from_slice(&right.subtrees()[1..]);

        let new_node = self.ns.put(Node::new(keys, vals, subtrees)?)?;
        Ok(new_node.to_optional_cid())
    }
}

/// Errors that can occur while transforming a tree.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    NodeStore(#[from] node_store::Error),
    #[error(transparent)]
    MalformedNode(#[from] node::Error),
}
