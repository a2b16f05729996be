//! [`NodeStore`] wraps a [`BlockStore`] to provide a more ergonomic,
//! `Node`-typed interface, backed by a bounded LRU cache (§4.2).

use std::cell::RefCell;
use std::rc::Rc;

use ipld_core::cid::Cid;
use lru::LruCache;

use crate::blockstore::{BlockStore, Error as BlockStoreError};
use crate::node::{self, Node};

/// Recommended default LRU capacity (§4.2).
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Caches CID → [`Node`] lookups over a [`BlockStore`].
///
/// Reads and writes both take `&self`: the cache is purely a performance
/// optimization (§4.2, §5) and its presence never changes the result of a
/// `get`/`put` call, so interior mutability here is sound and lets a
/// `Wrangler` and several `Walker`s share one store without fighting the
/// borrow checker.
pub struct NodeStore<S> {
    bs: S,
    cache: RefCell<LruCache<Option<Cid>, Rc<Node>>>,
}

impl<S: BlockStore> NodeStore<S> {
    pub fn new(bs: S) -> Self {
        Self::with_capacity(bs, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(bs: S, capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity)
            .unwrap_or(std::num::NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap());
        Self { bs, cache: RefCell::new(LruCache::new(capacity)) }
    }

    /// Loads the node for `cid`, or the canonical empty root if `cid` is
    /// `None`. Consults the cache before the underlying [`BlockStore`].
    pub fn get(&self, cid: Option<Cid>) -> Result<Rc<Node>, Error> {
        if let Some(cached) = self.cache.borrow_mut().get(&cid) {
            return Ok(cached.clone());
        }

        let node = match cid {
            None => return self.put(Node::empty_root()),
            Some(cid) => {
                let bytes = self.bs.get_block(&cid)?;
                Node::deserialize(&bytes)?
            }
        };

        let node = Rc::new(node);
        self.cache.borrow_mut().put(Some(cid), node.clone());
        Ok(node)
    }

    /// Stores `node`, computing and returning its CID. Idempotent: storing
    /// the same logical node twice is a nop at the `BlockStore` layer.
    pub fn put(&self, node: Node) -> Result<Rc<Node>, Error> {
        let cid = node.to_optional_cid();
        self.bs.put_block(
            cid.unwrap_or_else(|| Node::empty_root().cid()),
            node.serialize(),
        )?;
        let node = Rc::new(node);
        self.cache.borrow_mut().put(cid, node.clone());
        Ok(node)
    }

    /// A recursive, indented dump of the tree rooted at `cid`. Debugging aid
    /// only; not used by any transformation or query path.
    pub fn pretty(&self, cid: Option<Cid>) -> Result<String, Error> {
        let Some(cid) = cid else {
            return Ok("<empty>".to_string());
        };
        let node = self.get(Some(cid))?;
        let mut out = format!("Node<cid={cid}>(\n{},\n", indent(&self.pretty(node.subtrees()[0])?));
        for ((key, val), subtree) in node.keys().iter().zip(node.vals()).zip(&node.subtrees()[1..]) {
            out += &format!(
                "  {:?} ({}) -> {val},\n",
                String::from_utf8_lossy(key),
                node::key_height(key)
            );
            out += &indent(&self.pretty(*subtree)?);
            out += ",\n";
        }
        out += ")";
        Ok(out)
    }
}

fn indent(msg: &str) -> String {
    let indented: Vec<String> = msg.lines().map(|l| format!("  {l}")).collect();
    indented.join("\n")
}

/// Errors that can occur while loading or storing a [`Node`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    BlockStore(#[from] BlockStoreError),
    #[error(transparent)]
    MalformedNode(#[from] node::Error),
}
