//! [`Walker`] is a cursor over an MST: it can step sideways along a node's
//! entries or recurse down into a subtree, but doesn't itself implement any
//! higher-level query — [`crate::diff`] and [`crate::proof`] are built on
//! top of it (§4.4).
//!
//! Node layout, for reference:
//!
//! ```text
//! keys:  (lpath)  (0,    1,    2,    3)  (rpath)
//! vals:            (0,    1,    2,    3)
//! subtrees:    (0,    1,    2,    3,    4)
//! ```

use std::rc::Rc;

use ipld_core::cid::Cid;

use crate::blockstore::BlockStore;
use crate::node::Node;
use crate::node_store::{self, NodeStore};

/// A key bound, including the sentinels below/above every real key.
///
/// The original algorithm this is grounded on represents these sentinels as
/// ordinary strings (`""` and `"\xff"`) that happen to compare outside the
/// range of legal keys. That's fragile once keys are arbitrary bytes (a key
/// could itself start with `0xff`), so this is a real enum instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Min,
    Key(Vec<u8>),
    Max,
}

impl PartialOrd for Bound {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bound {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering::*;
        use Bound::*;
        match (self, other) {
            (Min, Min) | (Max, Max) => Equal,
            (Min, _) => Less,
            (_, Min) => Greater,
            (Max, _) => Greater,
            (_, Max) => Less,
            (Key(a), Key(b)) => a.cmp(b),
        }
    }
}

struct Frame {
    node: Rc<Node>,
    lpath: Bound,
    rpath: Bound,
    idx: usize,
}

/// A cursor over a single tree, starting at its root.
pub struct Walker<'a, S> {
    ns: &'a NodeStore<S>,
    stack: Vec<Frame>,
}

impl<'a, S: BlockStore> Walker<'a, S> {
    pub fn new(ns: &'a NodeStore<S>, root_cid: Option<Cid>) -> Result<Self, Error> {
        Self::bounded(ns, root_cid, Bound::Min, Bound::Max)
    }

    /// Like [`Self::new`], but scoped to `[lpath, rpath)` rather than the
    /// whole keyspace. Used to walk a subtree in isolation (e.g. by the
    /// diff algorithm).
    pub fn bounded(ns: &'a NodeStore<S>, root_cid: Option<Cid>, lpath: Bound, rpath: Bound) -> Result<Self, Error> {
        let node = ns.get(root_cid)?;
        Ok(Self { ns, stack: vec![Frame { node, lpath, rpath, idx: 0 }] })
    }

    fn frame(&self) -> &Frame {
        self.stack.last().expect("a live walker's stack is never empty")
    }

    fn frame_node(&self) -> Rc<Node> {
        self.frame().node.clone()
    }

    /// The node the cursor currently sits in.
    pub fn current_node(&self) -> Rc<Node> {
        self.frame_node()
    }

    /// A fresh walker scoped to the subtree at the cursor's current slot.
    pub fn subtree_walker(&self) -> Result<Walker<'a, S>, Error> {
        Walker::bounded(self.ns, self.subtree(), self.lpath(), self.rpath())
    }

    /// True once the cursor's right edge has reached the outer bound it was
    /// constructed with (ignoring whether a subtree remains below it).
    pub fn at_outer_edge(&self) -> bool {
        self.rpath() == self.stack[0].rpath
    }

    pub fn lpath(&self) -> Bound {
        let f = self.frame();
        if f.idx == 0 {
            f.lpath.clone()
        } else {
            Bound::Key(f.node.keys()[f.idx - 1].clone())
        }
    }

    pub fn lval(&self) -> Option<Cid> {
        let f = self.frame();
        (f.idx != 0).then(|| f.node.vals()[f.idx - 1])
    }

    pub fn subtree(&self) -> Option<Cid> {
        self.frame().node.subtrees()[self.frame().idx]
    }

    pub fn rpath(&self) -> Bound {
        let f = self.frame();
        if f.idx == f.node.keys().len() {
            f.rpath.clone()
        } else {
            Bound::Key(f.node.keys()[f.idx].clone())
        }
    }

    pub fn rval(&self) -> Option<Cid> {
        let f = self.frame();
        (f.idx != f.node.vals().len()).then(|| f.node.vals()[f.idx])
    }

    /// True once the cursor can make no further progress: an empty subtree
    /// at the outer right edge of the whole walk.
    pub fn is_final(&self) -> bool {
        self.stack.is_empty() || (self.subtree().is_none() && self.rpath() == self.stack[0].rpath)
    }

    /// Steps to the next slot in the current node, popping back up to the
    /// parent (and skipping empty intermediates) when the current node is
    /// exhausted.
    pub fn right(&mut self) -> Result<(), Error> {
        let at_end = {
            let f = self.frame();
            f.idx + 1 >= f.node.subtrees().len()
        };
        if at_end {
            self.stack.pop();
            if self.stack.is_empty() {
                return Err(Error::WalkedOffEnd);
            }
            return self.right();
        }
        self.stack.last_mut().unwrap().idx += 1;
        Ok(())
    }

    /// Recurses into the subtree at the cursor's current slot.
    pub fn down(&mut self) -> Result<(), Error> {
        let subtree = self.subtree().ok_or(Error::CannotDescend)?;
        let lpath = self.lpath();
        let rpath = self.rpath();
        let node = self.ns.get(Some(subtree))?;
        self.stack.push(Frame { node, lpath, rpath, idx: 0 });
        Ok(())
    }

    /// Advances past the next k/v pair in key order and returns it.
    pub fn next_kv(&mut self) -> Result<(Vec<u8>, Cid), Error> {
        while self.subtree().is_some() {
            self.down()?;
        }
        self.right()?;
        let key = match self.lpath() {
            Bound::Key(k) => k,
            _ => unreachable!("lpath is a concrete key immediately after right()"),
        };
        Ok((key, self.lval().expect("lval is set whenever lpath is a concrete key")))
    }

    fn seek(&mut self, start: &Bound) -> Result<(), Error> {
        loop {
            while self.rpath() < *start {
                self.right()?;
            }
            if self.subtree().is_none() {
                break;
            }
            self.down()?;
        }
        Ok(())
    }

    /// All k/v pairs in this walker's range, in ascending key order.
    pub fn iter_kv(self) -> KvIter<'a, S> {
        KvIter { walker: self }
    }

    /// Every node touched by a full traversal of this walker's range,
    /// starting with the current node.
    pub fn iter_nodes(self) -> NodeIter<'a, S> {
        NodeIter { walker: self, done: false, emitted_root: false }
    }

    pub fn iter_node_cids(self) -> impl Iterator<Item = Result<Cid, Error>> + 'a
    where
        S: 'a,
    {
        self.iter_nodes().map(|r| r.map(|n| n.cid()))
    }

    /// k/v pairs with `start <= key < end` (or `<= end` if `end_inclusive`).
    pub fn iter_kv_range(
        mut self,
        start: Vec<u8>,
        end: Vec<u8>,
        end_inclusive: bool,
    ) -> Result<impl Iterator<Item = Result<(Vec<u8>, Cid), Error>> + 'a, Error>
    where
        S: 'a,
    {
        self.seek(&Bound::Key(start))?;
        Ok(self.iter_kv().take_while(move |item| match item {
            Ok((k, _)) => *k < end || (end_inclusive && *k == end),
            Err(_) => true,
        }))
    }

    /// The CIDs of every node on the path from the root down to the
    /// cursor's current position. Doubles as an inclusion/exclusion proof
    /// once paired with a [`Self::find`] call (§4.6).
    pub fn stack_cids(&self) -> Vec<Cid> {
        self.stack.iter().map(|f| f.node.cid()).collect()
    }

    /// The value stored at `key`, or `None` if it isn't present. Leaves the
    /// cursor positioned at `key`'s resolved location, so [`Self::stack_cids`]
    /// afterwards yields the search path.
    pub fn find(&mut self, key: &[u8]) -> Result<Option<Cid>, Error> {
        let target = Bound::Key(key.to_vec());
        loop {
            while self.rpath() < target {
                self.right()?;
            }
            if self.rpath() == target || self.subtree().is_none() {
                break;
            }
            self.down()?;
        }
        if self.rpath() != target {
            return Ok(None);
        }
        Ok(self.rval())
    }
}

pub struct KvIter<'a, S> {
    walker: Walker<'a, S>,
}

impl<'a, S: BlockStore> Iterator for KvIter<'a, S> {
    type Item = Result<(Vec<u8>, Cid), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.walker.is_final() {
            return None;
        }
        Some(self.walker.next_kv())
    }
}

pub struct NodeIter<'a, S> {
    walker: Walker<'a, S>,
    done: bool,
    emitted_root: bool,
}

impl<'a, S: BlockStore> Iterator for NodeIter<'a, S> {
    type Item = Result<Rc<Node>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.emitted_root {
            self.emitted_root = true;
            return Some(Ok(self.walker.frame_node()));
        }
        loop {
            if self.walker.is_final() {
                self.done = true;
                return None;
            }
            if self.walker.subtree().is_some() {
                if let Err(e) = self.walker.down() {
                    self.done = true;
                    return Some(Err(e));
                }
                return Some(Ok(self.walker.frame_node()));
            }
            if let Err(e) = self.walker.right() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

/// Errors that can occur while moving a [`Walker`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    NodeStore(#[from] node_store::Error),
    #[error("attempted to descend into a None subtree")]
    CannotDescend,
    #[error("walked off the end of the tree")]
    WalkedOffEnd,
}
