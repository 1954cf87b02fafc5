//! Field-element helpers: Cairo short strings, entrypoint selectors and
//! `ByteArray` encoding.

use sha3::{Digest, Keccak256};
use starknet_types_core::felt::Felt;

use crate::error::{Error, Result};

/// Maximum number of bytes packed into one felt (short strings and byte-array words).
pub const BYTES_PER_WORD: usize = 31;

/// Keccak-256 truncated to the low 250 bits, as used for Starknet selectors
/// and SNIP-12 type hashes.
#[must_use]
pub fn starknet_keccak(data: &[u8]) -> Felt {
    let mut hash: [u8; 32] = Keccak256::digest(data).into();
    hash[0] &= 0x03;
    Felt::from_bytes_be(&hash)
}

/// Computes the selector of a contract entrypoint from its name.
#[must_use]
pub fn selector_from_name(name: &str) -> Felt {
    match name {
        "__default__" | "__l1_default__" => Felt::ZERO,
        _ => starknet_keccak(name.as_bytes()),
    }
}

/// Encodes an ASCII string of at most 31 characters as a Cairo short string.
///
/// # Errors
///
/// Returns `Error::Encoding` if the string is not ASCII or is too long.
pub fn short_string(s: &str) -> Result<Felt> {
    if !s.is_ascii() {
        return Err(Error::Encoding(format!("short string is not ASCII: {s:?}")));
    }
    if s.len() > BYTES_PER_WORD {
        return Err(Error::Encoding(format!(
            "short string too long: {} bytes (max {BYTES_PER_WORD})",
            s.len()
        )));
    }
    Ok(pack_word(s.as_bytes()))
}

/// Packs up to 31 bytes big-endian into a felt.
fn pack_word(bytes: &[u8]) -> Felt {
    debug_assert!(bytes.len() <= BYTES_PER_WORD);
    let mut buf = [0u8; 32];
    buf[32 - bytes.len()..].copy_from_slice(bytes);
    Felt::from_bytes_be(&buf)
}

/// Cairo `ByteArray`: full 31-byte words plus a partially filled tail word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteArray {
    pub data: Vec<Felt>,
    pub pending_word: Felt,
    pub pending_word_len: usize,
}

impl ByteArray {
    /// Splits `bytes` into 31-byte words.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` if the input does not fit a Cairo `ByteArray`
    /// (length above `u32::MAX`).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if u32::try_from(bytes.len()).is_err() {
            return Err(Error::Encoding(format!(
                "byte array too large: {} bytes",
                bytes.len()
            )));
        }

        let mut chunks = bytes.chunks_exact(BYTES_PER_WORD);
        let data = chunks.by_ref().map(pack_word).collect();
        let tail = chunks.remainder();

        Ok(Self {
            data,
            pending_word: pack_word(tail),
            pending_word_len: tail.len(),
        })
    }

    /// Serialized form: `[data.len, ...data, pending_word, pending_word_len]`.
    #[must_use]
    pub fn to_felts(&self) -> Vec<Felt> {
        let mut out = Vec::with_capacity(self.data.len() + 3);
        out.push(Felt::from(self.data.len() as u64));
        out.extend_from_slice(&self.data);
        out.push(self.pending_word);
        out.push(Felt::from(self.pending_word_len as u64));
        out
    }
}

impl TryFrom<&str> for ByteArray {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::from_bytes(s.as_bytes())
    }
}
