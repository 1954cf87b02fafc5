use starknet_types_core::felt::Felt;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Signer details carry a transaction version with no known hash formula.
    #[error("unsupported transaction version: {0:#x}")]
    UnsupportedVersion(Felt),

    /// The guardian refused to co-sign or answered with an error status.
    #[error("guardian {operation} failed{}: {detail}", http_status(.status))]
    Guardian {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[cfg(feature = "backend")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A call targets a `(contract, selector)` pair the session does not allow.
    #[error("call to {contract_address:#x} selector {selector:#x} is not allowed by the session")]
    UnauthorizedCall { contract_address: Felt, selector: Felt },

    /// The session's `expires_at` has passed.
    #[error("session expired at {expires_at}")]
    SessionExpired { expires_at: u64 },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

fn http_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}
