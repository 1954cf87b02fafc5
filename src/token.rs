use starknet_types_core::felt::Felt;

use crate::codec::{CairoDecode, CairoEncode, FeltReader};
use crate::error::{Error, Result};
use crate::merkle::SessionCommitment;
use crate::session::{OffChainSession, OnChainSession};
use crate::signature::SignerSignature;
use crate::types::Call;

/// `"session-token"`, the first felt of every session-signed transaction's
/// signature.
pub const SESSION_MAGIC: Felt = Felt::from_hex_unchecked("0x73657373696f6e2d746f6b656e");

/// Signatures carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSignatures {
    /// Owner's approval of the session, passed through unmodified.
    pub session_authorization: Vec<Felt>,
    pub session_signature: SignerSignature,
    pub guardian_signature: SignerSignature,
}

/// Authorization payload for one transaction signed under a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub session: OnChainSession,
    pub cache_authorization: bool,
    pub session_authorization: Vec<Felt>,
    pub session_signature: SignerSignature,
    pub guardian_signature: SignerSignature,
    /// One proof per call, in call order.
    pub proofs: Vec<Vec<Felt>>,
}

impl SessionToken {
    /// Transaction signature: `[SESSION_MAGIC, ...encoded token]`.
    #[must_use]
    pub fn to_signature(&self) -> Vec<Felt> {
        let mut out = vec![SESSION_MAGIC];
        self.encode(&mut out);
        out
    }

    /// Parses a transaction signature produced by [`to_signature`](Self::to_signature).
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` if the magic prefix is missing or the rest
    /// does not decode to exactly one token.
    pub fn from_signature(signature: &[Felt]) -> Result<Self> {
        match signature.split_first() {
            Some((magic, rest)) if *magic == SESSION_MAGIC => Self::from_felts(rest),
            _ => Err(Error::Encoding("not a session token signature".into())),
        }
    }

    /// Whether `signature` carries a session token rather than a plain
    /// account signature.
    #[must_use]
    pub fn is_session_signature(signature: &[Felt]) -> bool {
        signature.first() == Some(&SESSION_MAGIC)
    }
}

impl CairoEncode for SessionToken {
    fn encode(&self, out: &mut Vec<Felt>) {
        self.session.encode(out);
        self.cache_authorization.encode(out);
        self.session_authorization.encode(out);
        self.session_signature.encode(out);
        self.guardian_signature.encode(out);
        self.proofs.encode(out);
    }
}

impl CairoDecode for SessionToken {
    fn decode(reader: &mut FeltReader<'_>) -> Result<Self> {
        Ok(Self {
            session: OnChainSession::decode(reader)?,
            cache_authorization: bool::decode(reader)?,
            session_authorization: Vec::decode(reader)?,
            session_signature: SignerSignature::decode(reader)?,
            guardian_signature: SignerSignature::decode(reader)?,
            proofs: Vec::decode(reader)?,
        })
    }
}

/// Assembles the token for `calls` under `session`.
///
/// # Errors
///
/// Returns `Error::UnauthorizedCall` if a call is outside the session,
/// or `Error::Encoding` if the metadata cannot be encoded or `commitment` was
/// built from different allowed methods.
pub fn compile_session_token(
    session: &OffChainSession,
    commitment: &SessionCommitment,
    calls: &[Call],
    signatures: TokenSignatures,
    cache_authorization: bool,
) -> Result<SessionToken> {
    let proofs = commitment.proofs_for_calls(calls)?;
    let compiled = session.compile()?;
    if compiled.allowed_methods_root != commitment.root() {
        return Err(Error::Encoding(
            "permission commitment does not match the session's allowed methods".into(),
        ));
    }

    Ok(SessionToken {
        session: compiled,
        cache_authorization,
        session_authorization: signatures.session_authorization,
        session_signature: signatures.session_signature,
        guardian_signature: signatures.guardian_signature,
        proofs,
    })
}
