//! HTTP client for the guardian co-signing backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use starknet_types_core::felt::Felt;
use url::Url;

use crate::error::{Error, Result};
use crate::guardian::{GuardianRequest, GuardianSigner};
use crate::signature::GuardianSignature;
use crate::transaction::{SignerDetails, execute_calldata};
use crate::typed_data::SessionTypedData;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Guardian backend configuration.
///
/// ```rust,ignore
/// let config = GuardianConfig::new("https://cosigner.example.com/api/".parse()?)
///     .with_api_key("secret")
///     .with_timeout(Duration::from_secs(10));
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct GuardianConfig {
    pub(crate) base_url: Url,
    pub(crate) api_key: Option<String>,
    pub(crate) timeout: Duration,
}

impl GuardianConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sent as a bearer token on every request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Request timeout (default: 30s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SESSION_GUARDIAN_URL`: backend base URL
    ///
    /// # Optional env vars
    /// - `SESSION_GUARDIAN_API_KEY`: bearer token
    /// - `SESSION_GUARDIAN_TIMEOUT_SECS`: request timeout in seconds
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is missing or a value is invalid.
    pub fn from_env() -> Result<Self> {
        let url_str = std::env::var("SESSION_GUARDIAN_URL")
            .map_err(|_| Error::Config("SESSION_GUARDIAN_URL is required".into()))?;
        let base_url: Url = url_str
            .parse()
            .map_err(|e| Error::Config(format!("SESSION_GUARDIAN_URL: {e}")))?;

        let mut config = Self::new(base_url);

        if let Ok(key) = std::env::var("SESSION_GUARDIAN_API_KEY") {
            config = config.with_api_key(key);
        }
        if let Ok(secs) = std::env::var("SESSION_GUARDIAN_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("SESSION_GUARDIAN_TIMEOUT_SECS: {e}")))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Co-signing endpoint, relative to the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL cannot be joined.
    pub fn sign_session_url(&self) -> Result<Url> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join("cosigner/signSession")
            .map_err(|e| Error::Config(format!("guardian URL: {e}")))
    }
}

impl std::fmt::Debug for GuardianConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardianConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignSessionBody<'a> {
    session_data: SessionData<'a>,
    transaction: TransactionBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionData<'a> {
    cache_authorisation: bool,
    session_signature: SessionSignatureBody,
    session_typed_data: &'a SessionTypedData,
}

#[derive(Serialize)]
struct SessionSignatureBody {
    #[serde(rename = "type")]
    kind: &'static str,
    signer: GuardianSignature,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionBody<'a> {
    contract_address: Felt,
    calldata: Vec<Felt>,
    #[serde(flatten)]
    details: &'a SignerDetails,
}

#[derive(Deserialize)]
struct SignSessionResponse {
    signature: GuardianSignature,
}

impl<'a> From<GuardianRequest<'a>> for SignSessionBody<'a> {
    fn from(request: GuardianRequest<'a>) -> Self {
        Self {
            session_data: SessionData {
                cache_authorisation: request.cache_authorization,
                session_signature: SessionSignatureBody {
                    kind: "StarknetKey",
                    signer: GuardianSignature {
                        public_key: request.session_public_key,
                        r: request.session_signature.r,
                        s: request.session_signature.s,
                    },
                },
                session_typed_data: request.session_typed_data,
            },
            transaction: TransactionBody {
                contract_address: request.details.wallet_address(),
                calldata: execute_calldata(request.calls),
                details: request.details,
            },
        }
    }
}

/// Guardian reached over HTTP.
pub struct BackendGuardian {
    config: GuardianConfig,
    http: reqwest::Client,
}

impl BackendGuardian {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: GuardianConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &GuardianConfig {
        &self.config
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Guardian {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}

impl std::fmt::Debug for BackendGuardian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendGuardian")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GuardianSigner for BackendGuardian {
    async fn sign_tx_and_session(&self, request: GuardianRequest<'_>) -> Result<GuardianSignature> {
        let url = self.config.sign_session_url()?;
        let body = SignSessionBody::from(request);

        let mut builder = self.http.post(url).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let response = Self::ensure_success(response, "sign session").await?;
        let parsed: SignSessionResponse = response.json().await?;
        Ok(parsed.signature)
    }
}
