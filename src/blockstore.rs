//! A block store is a k/v store where values are immutable once set: `k ==
//! hash(v)` in practice, though this trait doesn't enforce that itself.
//!
//! Calling [`BlockStore::put_block`] twice with the same key and value is a
//! nop. Calling it twice with the same key but a different value is
//! [`Error::DuplicateBlockConflict`]. Deleting a key that doesn't exist is a
//! nop. [`BlockStore::get_block`] has no default: a miss is
//! [`Error::CidNotFound`].

use ipld_core::cid::Cid;

mod archive;
mod memory;
mod overlay;

pub use archive::{ArchiveBlockStore, Error as ArchiveError, V1Header};
pub use memory::MemoryBlockStore;
pub use overlay::OverlayBlockStore;

/// A content-addressed block store.
///
/// Reads and writes both take `&self`: implementations use interior
/// mutability (see module docs at the crate root) so a single store can
/// back several independent [`crate::walker::Walker`]s at once, which the
/// diff algorithm (§4.5) relies on.
pub trait BlockStore {
    fn get_block(&self, cid: &Cid) -> Result<Vec<u8>, Error>;
    fn put_block(&self, cid: Cid, bytes: Vec<u8>) -> Result<(), Error>;
    fn del_block(&self, cid: &Cid);
}

/// Errors that can occur while interacting with a [`BlockStore`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("CID does not exist in block store")]
    CidNotFound,
    #[error("block values are immutable: put with an existing key but a different value")]
    DuplicateBlockConflict,
    #[error(transparent)]
    Archive(#[from] archive::Error),
}
