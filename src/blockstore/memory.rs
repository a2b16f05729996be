use std::cell::RefCell;
use std::collections::HashMap;

use ipld_core::cid::Cid;

use super::{BlockStore, Error};

/// Basic in-memory blockstore. This is primarily used for testing and as
/// the upper layer of an [`super::OverlayBlockStore`].
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: RefCell<HashMap<Cid, Vec<u8>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryBlockStore {
    fn get_block(&self, cid: &Cid) -> Result<Vec<u8>, Error> {
        self.blocks.borrow().get(cid).cloned().ok_or(Error::CidNotFound)
    }

    fn put_block(&self, cid: Cid, bytes: Vec<u8>) -> Result<(), Error> {
        let mut blocks = self.blocks.borrow_mut();
        match blocks.get(&cid) {
            Some(existing) if existing == &bytes => Ok(()),
            Some(_) => Err(Error::DuplicateBlockConflict),
            None => {
                blocks.insert(cid, bytes);
                Ok(())
            }
        }
    }

    fn del_block(&self, cid: &Cid) {
        self.blocks.borrow_mut().remove(cid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u8) -> Cid {
        use ipld_core::cid::multihash::Multihash;
        Cid::new_v1(0x71, Multihash::wrap(0x12, &[n; 32]).unwrap())
    }

    #[test]
    fn put_is_idempotent_on_identical_value() {
        let bs = MemoryBlockStore::new();
        bs.put_block(cid(1), b"hello".to_vec()).unwrap();
        bs.put_block(cid(1), b"hello".to_vec()).unwrap();
        assert_eq!(bs.get_block(&cid(1)).unwrap(), b"hello");
    }

    #[test]
    fn put_conflicting_value_errors() {
        let bs = MemoryBlockStore::new();
        bs.put_block(cid(1), b"hello".to_vec()).unwrap();
        assert!(matches!(
            bs.put_block(cid(1), b"world".to_vec()),
            Err(Error::DuplicateBlockConflict)
        ));
    }

    #[test]
    fn missing_key_errors() {
        let bs = MemoryBlockStore::new();
        assert!(matches!(bs.get_block(&cid(9)), Err(Error::CidNotFound)));
    }

    #[test]
    fn delete_absent_key_is_a_nop() {
        let bs = MemoryBlockStore::new();
        bs.del_block(&cid(1));
    }
}
