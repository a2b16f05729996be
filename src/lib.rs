//! A content-addressed, order-independent Merkle Search Tree, as used by
//! AT Protocol repositories: an ordered key/value map whose canonical shape
//! depends only on its contents, never on insertion order, and whose nodes
//! are addressed by the hash of their own canonical encoding.
//!
//! The pieces, roughly bottom-up:
//!
//! - [`varint`] — the length-prefix codec used by the archive format.
//! - [`node`] — the [`Node`](node::Node) data model and its canonical
//!   DAG-CBOR (de)serialization.
//! - [`blockstore`] — content-addressed byte storage, with in-memory,
//!   overlay, and read-only archive implementations.
//! - [`node_store`] — a cached, `Node`-typed view over a [`blockstore::BlockStore`].
//! - [`wrangler`] — the `put`/`del` tree-transformation algorithms.
//! - [`walker`] — a cursor abstraction for traversing a tree.
//! - [`diff`] — structural and record-level diffing between two tree roots.
//! - [`proof`] — inclusion/exclusion proofs built from a walker's search path.

pub mod blockstore;
pub mod diff;
pub mod node;
pub mod node_store;
pub mod proof;
pub mod varint;
pub mod walker;
pub mod wrangler;

pub use blockstore::BlockStore;
pub use node::Node;
pub use node_store::NodeStore;
pub use walker::Walker;
pub use wrangler::Wrangler;
