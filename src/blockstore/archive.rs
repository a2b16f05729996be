//! A read-only reader for the append-only archive format described in
//! spec.md §6: a stream of `(varint length, payload)` blocks, the first of
//! which is a DAG-CBOR header naming the tree's root.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use ipld_core::cid::{multihash::Multihash, Cid};
use serde::Deserialize;
use sha2::Digest;

use super::{BlockStore, Error as BlockStoreError};
use crate::varint::decode_varint;

/// The 4-byte prefix of a CIDv1/dag-cbor/sha2-256 CID in its raw byte form:
/// version, codec, multihash code, multihash length. Every other CID shape
/// is rejected (spec.md §8, Open Question) rather than assuming a fixed
/// 36-byte length.
const CID_PREFIX: [u8; 4] = [0x01, 0x71, 0x12, 0x20];
const CID_BYTE_LEN: usize = 36;

/// The archive's header block: `{version: 1, roots: [root_cid]}`.
#[derive(Debug, Deserialize)]
pub struct V1Header {
    pub version: u64,
    pub roots: Vec<Cid>,
}

/// Indexes an archive file on open, then serves random-access block reads.
///
/// The whole file is scanned once up front to record `(offset, length)` per
/// CID; `get_block` seeks, reads, and verifies `sha2-256(bytes) ==
/// cid.digest` before returning.
pub struct ArchiveBlockStore<R> {
    storage: RefCell<R>,
    header: V1Header,
    index: HashMap<Cid, (u64, usize)>,
}

impl<R: Read + Seek> ArchiveBlockStore<R> {
    pub fn open(mut storage: R) -> Result<Self, Error> {
        storage.seek(SeekFrom::Start(0))?;

        let header_len = decode_varint(&mut storage)?;
        let mut header_bytes = vec![0u8; header_len as usize];
        storage.read_exact(&mut header_bytes)?;
        let header: V1Header =
            serde_ipld_dagcbor::from_slice(&header_bytes).map_err(|e| Error::Cbor(e.to_string()))?;
        if header.version != 1 {
            return Err(Error::UnsupportedVersion(header.version));
        }
        if header.roots.len() != 1 {
            return Err(Error::UnsupportedRootCount(header.roots.len()));
        }

        let mut index = HashMap::new();
        let mut cid_buf = [0u8; CID_BYTE_LEN];
        loop {
            let block_len = match decode_varint(&mut storage) {
                Ok(len) => len,
                Err(_) => break, // end of file: no more length-prefixed blocks
            };
            if (block_len as usize) < CID_BYTE_LEN {
                return Err(Error::TruncatedBlock);
            }
            storage.read_exact(&mut cid_buf)?;
            if cid_buf[..4] != CID_PREFIX {
                return Err(Error::UnsupportedCidPrefix);
            }
            let digest = &cid_buf[4..];
            let cid = Cid::new_v1(0x71, Multihash::wrap(0x12, digest).expect("32-byte digest"));

            let data_offset = storage.stream_position()?;
            let data_len = block_len as usize - CID_BYTE_LEN;
            index.insert(cid, (data_offset, data_len));
            tracing::debug!(cid = %cid, offset = data_offset, len = data_len, "indexed archive block");

            storage.seek(SeekFrom::Start(data_offset + data_len as u64))?;
        }

        Ok(Self { storage: RefCell::new(storage), header, index })
    }

    pub fn header(&self) -> &V1Header {
        &self.header
    }

    pub fn root(&self) -> Cid {
        self.header.roots[0]
    }

    pub fn block_count(&self) -> usize {
        self.index.len()
    }
}

impl<R: Read + Seek> BlockStore for ArchiveBlockStore<R> {
    fn get_block(&self, cid: &Cid) -> Result<Vec<u8>, BlockStoreError> {
        let (offset, len) = *self.index.get(cid).ok_or(BlockStoreError::CidNotFound)?;
        let mut storage = self.storage.borrow_mut();
        storage.seek(SeekFrom::Start(offset)).map_err(Error::Io)?;
        let mut bytes = vec![0u8; len];
        storage.read_exact(&mut bytes).map_err(Error::Io)?;

        let digest = sha2::Sha256::digest(&bytes);
        if digest.as_slice() != cid.hash().digest() {
            tracing::warn!(cid = %cid, "archive block failed hash verification");
            return Err(Error::HashMismatch.into());
        }
        Ok(bytes)
    }

    fn put_block(&self, _cid: Cid, _bytes: Vec<u8>) -> Result<(), BlockStoreError> {
        Err(Error::ReadOnly.into())
    }

    fn del_block(&self, _cid: &Cid) {}
}

/// Errors specific to parsing or reading the archive format (`MalformedArchive`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u64),
    #[error("unsupported number of archive roots: {0} (expected 1)")]
    UnsupportedRootCount(usize),
    #[error("unsupported CID prefix in archive block")]
    UnsupportedCidPrefix,
    #[error("truncated archive block")]
    TruncatedBlock,
    #[error("archive block failed hash verification")]
    HashMismatch,
    #[error("archive is read-only")]
    ReadOnly,
    #[error("malformed DAG-CBOR in archive header: {0}")]
    Cbor(String),
    #[error("varint error: {0}")]
    Varint(#[from] crate::varint::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::varint::encode_varint;
    use std::io::Cursor;

    fn cid_of(data: &[u8]) -> Cid {
        let digest = sha2::Sha256::digest(data);
        Cid::new_v1(0x71, Multihash::wrap(0x12, digest.as_slice()).unwrap())
    }

    fn build_archive(blocks: &[(Cid, &[u8])]) -> Vec<u8> {
        #[derive(serde::Serialize)]
        struct Header {
            version: u64,
            roots: Vec<Cid>,
        }

        let mut out = Vec::new();
        let header = serde_ipld_dagcbor::to_vec(&Header { version: 1, roots: vec![blocks[0].0] })
            .unwrap();
        out.extend(encode_varint(header.len() as u64).unwrap());
        out.extend(&header);

        for (cid, bytes) in blocks {
            let mut cid_bytes = Vec::new();
            cid_bytes.extend_from_slice(&CID_PREFIX);
            cid_bytes.extend_from_slice(cid.hash().digest());
            let block_len = cid_bytes.len() + bytes.len();
            out.extend(encode_varint(block_len as u64).unwrap());
            out.extend(&cid_bytes);
            out.extend(*bytes);
        }
        out
    }

    #[test]
    fn indexes_and_reads_blocks() {
        let a = b"alpha".as_slice();
        let b = b"beta".as_slice();
        let blocks = vec![(cid_of(a), a), (cid_of(b), b)];
        let archive = build_archive(&blocks);

        let store = ArchiveBlockStore::open(Cursor::new(archive)).unwrap();
        assert_eq!(store.block_count(), 2);
        assert_eq!(store.root(), blocks[0].0);
        assert_eq!(store.get_block(&blocks[0].0).unwrap(), a);
        assert_eq!(store.get_block(&blocks[1].0).unwrap(), b);
    }

    #[test]
    fn corrupted_block_fails_hash_check_on_read() {
        let a = b"alpha".as_slice();
        let blocks = vec![(cid_of(a), a)];
        let mut archive = build_archive(&blocks);

        // Open succeeds (indexing doesn't re-verify hashes)...
        let last = archive.len() - 1;
        archive[last] ^= 0xff;
        let store = ArchiveBlockStore::open(Cursor::new(archive)).unwrap();

        // ...but reading the corrupted block does not.
        assert!(matches!(
            store.get_block(&blocks[0].0),
            Err(BlockStoreError::Archive(Error::HashMismatch))
        ));
    }

    #[test]
    fn writes_are_rejected() {
        let a = b"alpha".as_slice();
        let blocks = vec![(cid_of(a), a)];
        let archive = build_archive(&blocks);
        let store = ArchiveBlockStore::open(Cursor::new(archive)).unwrap();
        assert!(store.put_block(cid_of(b"x"), vec![]).is_err());
    }
}
