//! LEB128 varint codec used by the archive block-stream format (§6).
//!
//! Mirrors `multiformats`' unsigned-varint encoding, but restricted to the
//! range the archive format actually needs (`[0, 2^63)`) and strict about
//! minimal encoding on the way in.

use std::io::Read;

/// Largest value `encode_varint` will accept: `2^63 - 1`.
const MAX_VALUE: u64 = (1 << 63) - 1;

/// Encodes `n` as an unsigned LEB128 varint.
///
/// # Errors
/// Returns [`Error::OutOfRange`] if `n` is outside `[0, 2^63)`.
pub fn encode_varint(n: u64) -> Result<Vec<u8>, Error> {
    if n > MAX_VALUE {
        return Err(Error::OutOfRange);
    }
    let mut n = n;
    let mut out = Vec::with_capacity(9);
    while n > 0x7f {
        out.push(0x80 | (n as u8 & 0x7f));
        n >>= 7;
    }
    out.push(n as u8);
    Ok(out)
}

/// Decodes an unsigned LEB128 varint from `reader`.
///
/// Rejects non-minimal encodings (a continuation byte whose payload is the
/// all-zero final group) and values that don't fit in 63 bits.
pub fn decode_varint<R: Read>(reader: &mut R) -> Result<u64, Error> {
    let mut n: u64 = 0;
    let mut byte = [0u8; 1];
    for shift in (0..63).step_by(7) {
        if reader.read(&mut byte)? == 0 {
            return Err(Error::UnexpectedEof);
        }
        let val = byte[0];
        n |= ((val & 0x7f) as u64) << shift;
        if val & 0x80 == 0 {
            if shift != 0 && val == 0 {
                return Err(Error::NotMinimal);
            }
            return Ok(n);
        }
    }
    Err(Error::TooLong)
}

/// Errors that can occur while encoding or decoding a varint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("integer out of encodable varint range")]
    OutOfRange,
    #[error("unexpected end of varint input")]
    UnexpectedEof,
    #[error("varint not minimally encoded")]
    NotMinimal,
    #[error("varint too long")]
    TooLong,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encode() {
        assert_eq!(encode_varint(0).unwrap(), vec![0x00]);
        assert_eq!(encode_varint(1).unwrap(), vec![0x01]);
        assert_eq!(encode_varint(127).unwrap(), vec![0x7f]);
        assert_eq!(encode_varint(128).unwrap(), vec![0x80, 0x01]);
        assert_eq!(
            encode_varint(2u64.pow(63) - 1).unwrap(),
            vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]
        );
        assert!(matches!(encode_varint(1u64 << 63), Err(Error::OutOfRange)));
    }

    #[test]
    fn decode() {
        assert_eq!(decode_varint(&mut Cursor::new(vec![0x00])).unwrap(), 0);
        assert_eq!(decode_varint(&mut Cursor::new(vec![0x01])).unwrap(), 1);
        assert_eq!(decode_varint(&mut Cursor::new(vec![0x7f])).unwrap(), 127);
        assert_eq!(decode_varint(&mut Cursor::new(vec![0x80, 0x01])).unwrap(), 128);
        assert_eq!(
            decode_varint(&mut Cursor::new(vec![
                0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f
            ]))
            .unwrap(),
            2u64.pow(63) - 1
        );
        assert!(matches!(
            decode_varint(&mut Cursor::new(vec![
                0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f
            ])),
            Err(Error::TooLong)
        ));
        assert!(matches!(
            decode_varint(&mut Cursor::new(Vec::<u8>::new())),
            Err(Error::UnexpectedEof)
        ));
        assert!(matches!(
            decode_varint(&mut Cursor::new(vec![0xff])),
            Err(Error::UnexpectedEof)
        ));
        assert!(matches!(
            decode_varint(&mut Cursor::new(vec![0x80, 0x00])),
            Err(Error::NotMinimal)
        ));
    }
}
