use ipld_core::cid::Cid;

use super::{BlockStore, Error};

/// Reads try `upper`, falling back to `lower` on a miss. Writes and deletes
/// go to `upper` only — `lower` is never mutated.
///
/// Useful for layering a writable [`super::MemoryBlockStore`] on top of a
/// read-only [`super::ArchiveBlockStore`], so a caller can mutate a tree
/// loaded from an archive without rewriting the archive itself.
pub struct OverlayBlockStore<U, L> {
    upper: U,
    lower: L,
}

impl<U: BlockStore, L: BlockStore> OverlayBlockStore<U, L> {
    pub fn new(upper: U, lower: L) -> Self {
        Self { upper, lower }
    }

    pub fn into_inner(self) -> (U, L) {
        (self.upper, self.lower)
    }
}

impl<U: BlockStore, L: BlockStore> BlockStore for OverlayBlockStore<U, L> {
    fn get_block(&self, cid: &Cid) -> Result<Vec<u8>, Error> {
        match self.upper.get_block(cid) {
            Err(Error::CidNotFound) => self.lower.get_block(cid),
            result => result,
        }
    }

    fn put_block(&self, cid: Cid, bytes: Vec<u8>) -> Result<(), Error> {
        self.upper.put_block(cid, bytes)
    }

    fn del_block(&self, cid: &Cid) {
        self.upper.del_block(cid)
    }
}
