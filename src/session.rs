use serde::{Deserialize, Serialize};
use starknet_types_core::felt::Felt;
use time::OffsetDateTime;

use crate::codec::{CairoDecode, CairoEncode, FeltReader};
use crate::error::{Error, Result};
use crate::key::DappKey;
use crate::merkle::build_tree;
use crate::session_hash::metadata_hash;
use crate::types::AllowedMethod;

/// Session request as approved by the account owner.
///
/// ```rust,ignore
/// let session = OffChainSession::new(expires_at, allowed_methods, &dapp_key)
///     .with_session_metadata(&SessionMetadata::new("my-dapp"))?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffChainSession {
    /// Unix timestamp (seconds) after which the session is no longer valid.
    pub expires_at: u64,
    /// Order defines leaf positions in the permission tree.
    pub allowed_methods: Vec<AllowedMethod>,
    /// Opaque JSON string, committed to through its byte-array hash.
    pub metadata: String,
    pub session_key_guid: Felt,
}

impl OffChainSession {
    /// Session for `dapp_key` with empty (`{}`) metadata.
    #[must_use]
    pub fn new(expires_at: u64, allowed_methods: Vec<AllowedMethod>, dapp_key: &DappKey) -> Self {
        Self {
            expires_at,
            allowed_methods,
            metadata: "{}".into(),
            session_key_guid: dapp_key.session_key_guid(),
        }
    }

    /// Replace the metadata with a raw string.
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Replace the metadata with its JSON rendering.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` if serialization fails.
    pub fn with_session_metadata(mut self, metadata: &SessionMetadata) -> Result<Self> {
        self.metadata = serde_json::to_string(metadata)?;
        Ok(self)
    }

    /// Expiry as a UTC timestamp.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the expiry is not a representable date.
    pub fn expires_at_datetime(&self) -> Result<OffsetDateTime> {
        i64::try_from(self.expires_at)
            .ok()
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
            .ok_or_else(|| Error::Config(format!("invalid expiry: {}", self.expires_at)))
    }

    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        u64::try_from(now.unix_timestamp()).is_ok_and(|now| now >= self.expires_at)
    }

    /// Derives the struct the on-chain verifier checks against.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` if the metadata cannot be encoded.
    pub fn compile(&self) -> Result<OnChainSession> {
        Ok(OnChainSession {
            expires_at: self.expires_at,
            allowed_methods_root: build_tree(&self.allowed_methods).root(),
            metadata_hash: metadata_hash(&self.metadata)?,
            session_key_guid: self.session_key_guid,
        })
    }
}

/// Unix timestamp `duration` from now, for use as a session expiry.
///
/// # Errors
///
/// Returns `Error::Config` if the result is before the epoch.
pub fn expires_in(duration: time::Duration) -> Result<u64> {
    let at = OffsetDateTime::now_utc() + duration;
    u64::try_from(at.unix_timestamp())
        .map_err(|_| Error::Config(format!("expiry before epoch: {at}")))
}

/// Session as compiled for on-chain verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainSession {
    pub expires_at: u64,
    pub allowed_methods_root: Felt,
    pub metadata_hash: Felt,
    pub session_key_guid: Felt,
}

impl CairoEncode for OnChainSession {
    fn encode(&self, out: &mut Vec<Felt>) {
        self.expires_at.encode(out);
        out.extend_from_slice(&[
            self.allowed_methods_root,
            self.metadata_hash,
            self.session_key_guid,
        ]);
    }
}

impl CairoDecode for OnChainSession {
    fn decode(reader: &mut FeltReader<'_>) -> Result<Self> {
        Ok(Self {
            expires_at: u64::decode(reader)?,
            allowed_methods_root: reader.next_felt()?,
            metadata_hash: reader.next_felt()?,
            session_key_guid: reader.next_felt()?,
        })
    }
}

/// Structured form of the session metadata string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SessionMetadata {
    #[serde(rename = "projectID")]
    pub project_id: String,
    #[serde(rename = "txFees", default)]
    pub tx_fees: Vec<TxFee>,
}

impl SessionMetadata {
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            tx_fees: Vec::new(),
        }
    }

    /// Add a fee allowance for `token_address`.
    #[must_use]
    pub fn with_tx_fee(mut self, token_address: Felt, max_amount: impl Into<String>) -> Self {
        self.tx_fees.push(TxFee {
            token_address,
            max_amount: max_amount.into(),
        });
        self
    }
}

/// Maximum fee, in a given token, the session may spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxFee {
    pub token_address: Felt,
    /// Decimal amount string, as the wallet displays it.
    pub max_amount: String,
}
