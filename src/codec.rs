//! Flat felt encoding matching Cairo's `Serde` layout.
//!
//! Structs encode their fields in declaration order, `bool` as `0`/`1`,
//! arrays and spans as `[len, ...items]`, and enums as
//! `[variant_index, ...payload]`.

use starknet_types_core::felt::Felt;

use crate::error::{Error, Result};

pub trait CairoEncode {
    fn encode(&self, out: &mut Vec<Felt>);

    fn to_felts(&self) -> Vec<Felt> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

pub trait CairoDecode: Sized {
    fn decode(reader: &mut FeltReader<'_>) -> Result<Self>;

    /// Decodes a value that must consume the whole input.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` on truncated input, trailing felts, or any
    /// field that does not decode.
    fn from_felts(felts: &[Felt]) -> Result<Self> {
        let mut reader = FeltReader::new(felts);
        let value = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// Cursor over an encoded felt slice.
pub struct FeltReader<'a> {
    felts: &'a [Felt],
    pos: usize,
}

impl<'a> FeltReader<'a> {
    #[must_use]
    pub fn new(felts: &'a [Felt]) -> Self {
        Self { felts, pos: 0 }
    }

    pub fn next_felt(&mut self) -> Result<Felt> {
        let felt = self.felts.get(self.pos).copied().ok_or_else(|| {
            Error::Encoding(format!("unexpected end of input at offset {}", self.pos))
        })?;
        self.pos += 1;
        Ok(felt)
    }

    /// Reads an array length and checks it against the remaining input.
    pub fn next_len(&mut self) -> Result<usize> {
        let len = usize::try_from(felt_to_u64(self.next_felt()?)?)
            .map_err(|_| Error::Encoding("array length overflows usize".into()))?;
        if len > self.remaining() {
            return Err(Error::Encoding(format!(
                "array length {len} exceeds remaining input ({})",
                self.remaining()
            )));
        }
        Ok(len)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.felts.len() - self.pos
    }

    pub fn finish(self) -> Result<()> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(Error::Encoding(format!(
                "{} trailing felts after decoding",
                self.remaining()
            )))
        }
    }
}

/// Narrows a felt to `u64`.
///
/// # Errors
///
/// Returns `Error::Encoding` if the value does not fit.
pub fn felt_to_u64(felt: Felt) -> Result<u64> {
    let bytes = felt.to_bytes_be();
    if bytes[..24].iter().any(|b| *b != 0) {
        return Err(Error::Encoding(format!("{felt:#x} does not fit in u64")));
    }
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[24..]);
    Ok(u64::from_be_bytes(word))
}

/// Narrows a felt to `u128`.
///
/// # Errors
///
/// Returns `Error::Encoding` if the value does not fit.
pub fn felt_to_u128(felt: Felt) -> Result<u128> {
    let bytes = felt.to_bytes_be();
    if bytes[..16].iter().any(|b| *b != 0) {
        return Err(Error::Encoding(format!("{felt:#x} does not fit in u128")));
    }
    let mut word = [0u8; 16];
    word.copy_from_slice(&bytes[16..]);
    Ok(u128::from_be_bytes(word))
}

impl CairoEncode for Felt {
    fn encode(&self, out: &mut Vec<Felt>) {
        out.push(*self);
    }
}

impl CairoDecode for Felt {
    fn decode(reader: &mut FeltReader<'_>) -> Result<Self> {
        reader.next_felt()
    }
}

impl CairoEncode for bool {
    fn encode(&self, out: &mut Vec<Felt>) {
        out.push(if *self { Felt::ONE } else { Felt::ZERO });
    }
}

impl CairoDecode for bool {
    fn decode(reader: &mut FeltReader<'_>) -> Result<Self> {
        let felt = reader.next_felt()?;
        if felt == Felt::ZERO {
            Ok(false)
        } else if felt == Felt::ONE {
            Ok(true)
        } else {
            Err(Error::Encoding(format!("invalid bool: {felt:#x}")))
        }
    }
}

impl CairoEncode for u64 {
    fn encode(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(*self));
    }
}

impl CairoDecode for u64 {
    fn decode(reader: &mut FeltReader<'_>) -> Result<Self> {
        felt_to_u64(reader.next_felt()?)
    }
}

impl<T: CairoEncode> CairoEncode for [T] {
    fn encode(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(self.len() as u64));
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: CairoEncode> CairoEncode for Vec<T> {
    fn encode(&self, out: &mut Vec<Felt>) {
        self.as_slice().encode(out);
    }
}

impl<T: CairoDecode> CairoDecode for Vec<T> {
    fn decode(reader: &mut FeltReader<'_>) -> Result<Self> {
        let len = reader.next_len()?;
        (0..len).map(|_| T::decode(reader)).collect()
    }
}
