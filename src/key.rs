//! Key embedding: lookup metadata written into the head of a raw UTF-16 buffer.
//!
//! A wire decoder that parses a symbol into a reusable `[u16]` buffer can
//! reserve the first [`KEY_HEADER_SIZE`] units, decode the payload right
//! after them and call [`embed_key`]. The cache can then probe its tables
//! with the buffer directly and only builds a `String` when the symbol is
//! not cached yet.
//!
//! Layout:
//!
//! ```text
//! [0] KEY_MAGIC0  [1] KEY_MAGIC1  [2..4] length (hi, lo)  [4..6] hash (hi, lo)  [6..] payload
//! ```
//!
//! Both markers are lone low surrogates, which cannot start well-formed
//! UTF-16 text, so a buffer holding plain payload at offset 0 is never
//! mistaken for a key.

use crate::error::{CacheError, Result};

/// First marker unit of an embedded key.
pub const KEY_MAGIC0: u16 = 0xDFFE;
/// Second marker unit of an embedded key.
pub const KEY_MAGIC1: u16 = 0xDFFF;
/// Number of header units preceding the payload.
pub const KEY_HEADER_SIZE: usize = 6;

/// Polynomial hash (`h = 31 * h + unit`) over UTF-16 code units.
#[inline]
pub fn hash_units(units: &[u16]) -> u32 {
    units
        .iter()
        .fold(0u32, |h, &u| h.wrapping_mul(31).wrapping_add(u32::from(u)))
}

/// Hash of a string; equal to [`hash_units`] over its UTF-16 encoding.
#[inline]
pub fn symbol_hash(symbol: &str) -> u32 {
    symbol
        .encode_utf16()
        .fold(0u32, |h, u| h.wrapping_mul(31).wrapping_add(u32::from(u)))
}

/// Returns true when `buf` carries an embedded key whose payload starts at `offset`.
#[inline]
pub fn is_key(buf: &[u16], offset: usize) -> bool {
    offset == KEY_HEADER_SIZE
        && buf.len() >= KEY_HEADER_SIZE
        && buf[0] == KEY_MAGIC0
        && buf[1] == KEY_MAGIC1
}

/// Writes the key header for the payload `buf[offset..offset + length]`.
///
/// `offset` must equal [`KEY_HEADER_SIZE`].
pub fn embed_key(buf: &mut [u16], offset: usize, length: usize) -> Result<&mut [u16]> {
    if offset != KEY_HEADER_SIZE {
        return Err(CacheError::InvalidKeyOffset {
            expected: KEY_HEADER_SIZE,
            actual: offset,
        });
    }
    let end = offset.checked_add(length);
    if end.map_or(true, |end| end > buf.len()) || u32::try_from(length).is_err() {
        return Err(CacheError::KeyOutOfBounds {
            offset,
            length,
            capacity: buf.len(),
        });
    }

    let hash = hash_units(&buf[offset..offset + length]);
    let length = length as u32;
    buf[0] = KEY_MAGIC0;
    buf[1] = KEY_MAGIC1;
    buf[2] = (length >> 16) as u16;
    buf[3] = length as u16;
    buf[4] = (hash >> 16) as u16;
    buf[5] = hash as u16;
    Ok(buf)
}

/// Builds a fresh key buffer holding `symbol`.
pub fn embed_str(symbol: &str) -> Vec<u16> {
    let mut buf = vec![0u16; KEY_HEADER_SIZE];
    buf.extend(symbol.encode_utf16());
    let length = buf.len() - KEY_HEADER_SIZE;
    let embedded = embed_key(&mut buf, KEY_HEADER_SIZE, length);
    debug_assert!(embedded.is_ok(), "header always fits a fresh buffer");
    buf
}

/// Payload length recorded in the header of an embedded key.
pub fn length_from_key(buf: &[u16]) -> Result<usize> {
    if !is_key(buf, KEY_HEADER_SIZE) {
        return Err(CacheError::NotAKey);
    }
    Ok(header_length(buf))
}

/// Payload hash recorded in the header of an embedded key.
pub fn hash_from_key(buf: &[u16]) -> Result<u32> {
    if !is_key(buf, KEY_HEADER_SIZE) {
        return Err(CacheError::NotAKey);
    }
    Ok(header_hash(buf))
}

// Callers check `is_key` first.
#[inline]
fn header_length(buf: &[u16]) -> usize {
    ((u32::from(buf[2]) << 16) | u32::from(buf[3])) as usize
}

#[inline]
fn header_hash(buf: &[u16]) -> u32 {
    (u32::from(buf[4]) << 16) | u32::from(buf[5])
}

/// Payload of an embedded key, validated against the buffer length.
pub fn payload_from_key(buf: &[u16]) -> Result<&[u16]> {
    if !is_key(buf, KEY_HEADER_SIZE) {
        return Err(CacheError::NotAKey);
    }
    let length = header_length(buf);
    buf.get(KEY_HEADER_SIZE..KEY_HEADER_SIZE + length)
        .ok_or(CacheError::KeyOutOfBounds {
            offset: KEY_HEADER_SIZE,
            length,
            capacity: buf.len(),
        })
}

/// Materializes the payload of an embedded key.
pub fn string_from_key(buf: &[u16]) -> Result<String> {
    String::from_utf16(payload_from_key(buf)?).map_err(|_| CacheError::InvalidUtf16)
}

/// Compares `symbol` with the payload of an embedded key without allocating.
pub fn equals_with_key(symbol: &str, buf: &[u16]) -> bool {
    payload_from_key(buf).map_or(false, |units| equals_units(symbol, units))
}

#[inline]
pub(crate) fn equals_units(symbol: &str, units: &[u16]) -> bool {
    // UTF-16 never needs more units than UTF-8 needs bytes.
    units.len() <= symbol.len() && symbol.encode_utf16().eq(units.iter().copied())
}

/// Borrowed probe key: an owned-string lookup or a raw payload view.
#[derive(Copy, Clone, Debug)]
pub(crate) enum SymbolKey<'a> {
    Str { symbol: &'a str, hash: u32 },
    Units { units: &'a [u16], hash: u32 },
}

impl<'a> SymbolKey<'a> {
    pub(crate) fn for_str(symbol: &'a str) -> Self {
        SymbolKey::Str {
            symbol,
            hash: symbol_hash(symbol),
        }
    }

    /// Probe key over an embedded key buffer; the hash is taken from the header.
    pub(crate) fn from_key(buf: &'a [u16]) -> Result<Self> {
        Ok(SymbolKey::Units {
            units: payload_from_key(buf)?,
            hash: header_hash(buf),
        })
    }

    #[inline]
    pub(crate) fn hash(&self) -> u32 {
        match *self {
            SymbolKey::Str { hash, .. } | SymbolKey::Units { hash, .. } => hash,
        }
    }

    /// Hash first, content second.
    #[inline]
    pub(crate) fn matches(&self, symbol: &str, hash: u32) -> bool {
        if self.hash() != hash {
            return false;
        }
        match *self {
            SymbolKey::Str { symbol: s, .. } => s == symbol,
            SymbolKey::Units { units, .. } => equals_units(symbol, units),
        }
    }
}
