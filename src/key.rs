use rand::Rng;
use starknet_crypto::{SignError, get_public_key, poseidon_hash, rfc6979_generate_k, sign, verify};
use starknet_types_core::felt::Felt;

use crate::error::{Error, Result};
use crate::signature::StarknetSignature;

/// `"Starknet Signer"`, the prefix folded into a Stark-key signer GUID.
const STARKNET_SIGNER_TAG: Felt = Felt::from_hex_unchecked("0x537461726b6e6574205369676e6572");

/// Stark-curve key pair held by the dapp for the lifetime of its sessions.
///
/// The private half never leaves this type: it is not serializable and is
/// redacted from `Debug`.
#[derive(Clone)]
pub struct DappKey {
    private_key: Felt,
    public_key: Felt,
}

impl DappKey {
    /// Generates a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        loop {
            // 248 random bits stay below the curve order.
            let bytes: [u8; 31] = rand::rng().random();
            let mut buf = [0u8; 32];
            buf[1..].copy_from_slice(&bytes);
            let candidate = Felt::from_bytes_be(&buf);
            if candidate != Felt::ZERO {
                return Self::with_private_key(candidate);
            }
        }
    }

    /// # Errors
    ///
    /// Returns `Error::Config` for a zero key.
    pub fn from_private_key(private_key: Felt) -> Result<Self> {
        if private_key == Felt::ZERO {
            return Err(Error::Config("dapp private key must be non-zero".into()));
        }
        Ok(Self::with_private_key(private_key))
    }

    /// Parses a hex-encoded private key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the hex is invalid or the key is zero.
    pub fn from_hex(private_key_hex: &str) -> Result<Self> {
        let private_key = Felt::from_hex(private_key_hex)
            .map_err(|_| Error::Config("invalid dapp private key hex".into()))?;
        Self::from_private_key(private_key)
    }

    /// Reads the key from `SESSION_DAPP_PRIVATE_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the variable is missing or invalid.
    pub fn from_env() -> Result<Self> {
        let hex = std::env::var("SESSION_DAPP_PRIVATE_KEY")
            .map_err(|_| Error::Config("SESSION_DAPP_PRIVATE_KEY is required".into()))?;
        Self::from_hex(hex.trim())
    }

    fn with_private_key(private_key: Felt) -> Self {
        Self {
            private_key,
            public_key: get_public_key(&private_key),
        }
    }

    #[must_use]
    pub fn public_key(&self) -> Felt {
        self.public_key
    }

    /// GUID identifying this key as a Starknet signer:
    /// `poseidon("Starknet Signer", public_key)`.
    #[must_use]
    pub fn session_key_guid(&self) -> Felt {
        poseidon_hash(STARKNET_SIGNER_TAG, self.public_key)
    }

    /// Signs `message_hash` with an RFC 6979 deterministic nonce.
    ///
    /// # Errors
    ///
    /// Returns `Error::Signing` if the hash is outside the signable range.
    pub fn sign(&self, message_hash: Felt) -> Result<StarknetSignature> {
        let mut seed = None;
        loop {
            let k = rfc6979_generate_k(&message_hash, &self.private_key, seed.as_ref());
            match sign(&self.private_key, &message_hash, &k) {
                Ok(sig) => return Ok(StarknetSignature { r: sig.r, s: sig.s }),
                Err(SignError::InvalidK) => {
                    seed = Some(seed.unwrap_or(Felt::ZERO) + Felt::ONE);
                }
                Err(e) => return Err(Error::Signing(format!("{e:?}"))),
            }
        }
    }
}

impl std::fmt::Debug for DappKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DappKey")
            .field("public_key", &format_args!("{:#x}", self.public_key))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Checks a Stark-curve signature over `message_hash`.
#[must_use]
pub fn verify_signature(
    public_key: Felt,
    message_hash: Felt,
    signature: &StarknetSignature,
) -> bool {
    verify(&public_key, &message_hash, &signature.r, &signature.s).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::felt::short_string;

    #[test]
    fn generated_keys_differ() {
        let a = DappKey::generate();
        let b = DappKey::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn signature_verifies_and_is_deterministic() {
        let key = DappKey::from_hex("0x1234567890abcdef").unwrap();
        let hash = Felt::from_hex("0x5afe").unwrap();

        let s1 = key.sign(hash).unwrap();
        let s2 = key.sign(hash).unwrap();
        assert_eq!(s1, s2);
        assert!(verify_signature(key.public_key(), hash, &s1));
        assert!(!verify_signature(key.public_key(), hash + Felt::ONE, &s1));
    }

    #[test]
    fn zero_or_malformed_key_is_rejected() {
        assert!(matches!(DappKey::from_hex("0x0"), Err(Error::Config(_))));
        assert!(matches!(DappKey::from_hex("not hex"), Err(Error::Config(_))));
    }

    #[test]
    fn debug_redacts_private_key() {
        let key = DappKey::from_hex("0xdeadbeef").unwrap();
        let printed = format!("{key:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("deadbeef"));
    }

    #[test]
    fn signer_tag_is_short_string() {
        assert_eq!(STARKNET_SIGNER_TAG, short_string("Starknet Signer").unwrap());
    }

    #[test]
    fn guid_binds_public_key() {
        let a = DappKey::from_hex("0x1").unwrap();
        let b = DappKey::from_hex("0x2").unwrap();
        assert_ne!(a.session_key_guid(), b.session_key_guid());
        assert_eq!(
            a.session_key_guid(),
            poseidon_hash(short_string("Starknet Signer").unwrap(), a.public_key())
        );
    }
}
