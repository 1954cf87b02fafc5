use serde::{Deserialize, Serialize};
use starknet_types_core::felt::Felt;

use crate::codec::{CairoDecode, CairoEncode, FeltReader, felt_to_u64};
use crate::error::{Error, Result};

/// Raw Stark-curve ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarknetSignature {
    pub r: Felt,
    pub s: Felt,
}

/// Co-signature returned by the guardian backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianSignature {
    pub public_key: Felt,
    pub r: Felt,
    pub s: Felt,
}

impl GuardianSignature {
    #[must_use]
    pub fn signature(&self) -> StarknetSignature {
        StarknetSignature {
            r: self.r,
            s: self.s,
        }
    }
}

/// Signature scheme tags understood by the account's on-chain verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignerType {
    Starknet = 0,
    Secp256k1 = 1,
    Secp256r1 = 2,
    Eip191 = 3,
    Webauthn = 4,
}

impl SignerType {
    #[must_use]
    pub fn index(self) -> u64 {
        self as u64
    }
}

impl TryFrom<u64> for SignerType {
    type Error = Error;

    fn try_from(index: u64) -> Result<Self> {
        match index {
            0 => Ok(Self::Starknet),
            1 => Ok(Self::Secp256k1),
            2 => Ok(Self::Secp256r1),
            3 => Ok(Self::Eip191),
            4 => Ok(Self::Webauthn),
            _ => Err(Error::Encoding(format!("unknown signer type: {index}"))),
        }
    }
}

/// Signature tagged with its signer type so the verifier can dispatch on it.
///
/// Only Stark-curve signatures are produced by session signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SignerSignature {
    Starknet { pubkey: Felt, r: Felt, s: Felt },
}

impl SignerSignature {
    #[must_use]
    pub fn starknet(pubkey: Felt, signature: StarknetSignature) -> Self {
        Self::Starknet {
            pubkey,
            r: signature.r,
            s: signature.s,
        }
    }

    #[must_use]
    pub fn signer_type(&self) -> SignerType {
        match self {
            Self::Starknet { .. } => SignerType::Starknet,
        }
    }

    #[must_use]
    pub fn pubkey(&self) -> Felt {
        match self {
            Self::Starknet { pubkey, .. } => *pubkey,
        }
    }
}

impl From<GuardianSignature> for SignerSignature {
    fn from(sig: GuardianSignature) -> Self {
        Self::starknet(sig.public_key, sig.signature())
    }
}

impl CairoEncode for SignerSignature {
    fn encode(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(self.signer_type().index()));
        match self {
            Self::Starknet { pubkey, r, s } => out.extend_from_slice(&[*pubkey, *r, *s]),
        }
    }
}

impl CairoDecode for SignerSignature {
    fn decode(reader: &mut FeltReader<'_>) -> Result<Self> {
        match SignerType::try_from(felt_to_u64(reader.next_felt()?)?)? {
            SignerType::Starknet => Ok(Self::Starknet {
                pubkey: reader.next_felt()?,
                r: reader.next_felt()?,
                s: reader.next_felt()?,
            }),
            other => Err(Error::Encoding(format!(
                "unsupported signer type in session token: {other:?}"
            ))),
        }
    }
}
