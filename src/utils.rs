//! Low-level I/O primitives shared by the key and record parsers.
//!
//! Each function reads exactly the bytes it promises or returns an error -
//! there is no partial-read ambiguity.

use std::io::Read;
use std::ops::Range;

use crate::{Error, Result};

/// Read one byte.
#[inline]
pub(crate) fn u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

/// Read a big-endian `u16`.
#[inline]
pub(crate) fn be_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_be_bytes(b))
}

/// Read a big-endian `u32`.
#[inline]
pub(crate) fn be_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

/// Read a big-endian `u64`.
#[inline]
pub(crate) fn be_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_be_bytes(b))
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// `start..start + len`, the shape every layout table in this crate uses.
#[inline]
pub(crate) const fn span(start: usize, len: usize) -> Range<usize> {
    start..start + len
}

/// Decode a fixed-width UTF-16BE field, stopping at the first NUL code unit.
///
/// Unpaired surrogates are replaced with U+FFFD rather than rejected; amiibo
/// nicknames written by games are not always well-formed.
pub(crate) fn utf16be_string(buf: &[u8]) -> Result<String> {
    if buf.len() % 2 != 0 {
        return Err(Error::Parse("odd-length UTF-16 field"));
    }
    let units = buf
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0);
    Ok(char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}
