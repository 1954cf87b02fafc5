use std::future::Future;
use std::sync::Arc;

use starknet_types_core::felt::Felt;

use crate::error::Result;
use crate::signature::{GuardianSignature, StarknetSignature};
use crate::transaction::SignerDetails;
use crate::typed_data::SessionTypedData;
use crate::types::Call;

/// Everything the guardian needs to re-derive and co-sign the combined hash.
#[derive(Debug, Clone, Copy)]
pub struct GuardianRequest<'a> {
    pub calls: &'a [Call],
    pub details: &'a SignerDetails,
    pub session_typed_data: &'a SessionTypedData,
    /// Public key of the session key that produced `session_signature`.
    pub session_public_key: Felt,
    pub session_signature: StarknetSignature,
    /// Whether the guardian may cache its approval for this session.
    pub cache_authorization: bool,
}

/// Remote co-signer for session transactions.
///
/// Implementations must surface rejections and transport failures as errors;
/// the caller retries the whole signing attempt if it wants to.
///
/// # Example
///
/// ```rust,ignore
/// struct MyGuardian { /* ... */ }
///
/// impl GuardianSigner for MyGuardian {
///     async fn sign_tx_and_session(
///         &self,
///         request: GuardianRequest<'_>,
///     ) -> Result<GuardianSignature> {
///         self.client.co_sign(&request).await
///     }
/// }
/// ```
pub trait GuardianSigner: Send + Sync {
    fn sign_tx_and_session(
        &self,
        request: GuardianRequest<'_>,
    ) -> impl Future<Output = Result<GuardianSignature>> + Send;
}

impl<T: GuardianSigner + ?Sized> GuardianSigner for Arc<T> {
    fn sign_tx_and_session(
        &self,
        request: GuardianRequest<'_>,
    ) -> impl Future<Output = Result<GuardianSignature>> + Send {
        (**self).sign_tx_and_session(request)
    }
}

impl<T: GuardianSigner + ?Sized> GuardianSigner for &T {
    fn sign_tx_and_session(
        &self,
        request: GuardianRequest<'_>,
    ) -> impl Future<Output = Result<GuardianSignature>> + Send {
        (**self).sign_tx_and_session(request)
    }
}
