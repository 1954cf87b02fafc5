use std::future::Future;
use std::sync::Arc;

use starknet_types_core::felt::Felt;

use crate::error::Result;
use crate::guardian::GuardianSigner;
use crate::merkle::SessionCommitment;
use crate::service::{DappService, SigningRequest};
use crate::session::OffChainSession;
use crate::transaction::{SignerDetails, execute_calldata};
use crate::types::Call;

/// Produces the signature for an invoke of `calls` under `details`.
pub trait TransactionSigner: Send + Sync {
    fn sign_transaction(
        &self,
        calls: &[Call],
        details: &SignerDetails,
    ) -> impl Future<Output = Result<Vec<Felt>>> + Send;
}

/// Signs transactions with a dapp session instead of the owner key.
///
/// Works for both v1 and v3 invokes; the version only changes how the
/// transaction hash is computed.
pub struct SessionSigner<G> {
    service: Arc<DappService<G>>,
    session: OffChainSession,
    commitment: SessionCommitment,
    session_authorization: Vec<Felt>,
    cache_authorization: bool,
}

impl<G: GuardianSigner> SessionSigner<G> {
    /// `session_authorization` is the owner's signature over the session
    /// typed data, as returned by their wallet.
    #[must_use]
    pub fn new(
        service: Arc<DappService<G>>,
        session: OffChainSession,
        session_authorization: Vec<Felt>,
    ) -> Self {
        let commitment = SessionCommitment::new(&session.allowed_methods);
        Self {
            service,
            session,
            commitment,
            session_authorization,
            cache_authorization: false,
        }
    }

    /// Let the guardian cache its approval of this session.
    #[must_use]
    pub fn with_cache_authorization(mut self, cache_authorization: bool) -> Self {
        self.cache_authorization = cache_authorization;
        self
    }

    #[must_use]
    pub fn session(&self) -> &OffChainSession {
        &self.session
    }

    #[must_use]
    pub fn service(&self) -> &DappService<G> {
        &self.service
    }
}

impl<G: GuardianSigner> TransactionSigner for SessionSigner<G> {
    async fn sign_transaction(&self, calls: &[Call], details: &SignerDetails) -> Result<Vec<Felt>> {
        let calldata = execute_calldata(calls);
        let transaction_hash = details.transaction_hash(&calldata);

        tracing::debug!(
            version = %format!("{:#x}", details.version()),
            calls = calls.len(),
            "Signing transaction with session key"
        );

        self.service
            .sign_session_transaction(SigningRequest {
                session: &self.session,
                commitment: &self.commitment,
                session_authorization: &self.session_authorization,
                calls,
                details,
                transaction_hash,
                cache_authorization: self.cache_authorization,
            })
            .await
    }
}

impl<G> std::fmt::Debug for SessionSigner<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("session", &self.session)
            .field("cache_authorization", &self.cache_authorization)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::guardian::testing::LocalGuardian;
    use crate::key::DappKey;
    use crate::session_hash::combined_hash;
    use crate::signature::{SignerSignature, StarknetSignature};
    use crate::token::SessionToken;
    use crate::transaction::{
        ResourceBound, ResourceBounds, V2SignerDetails, V3SignerDetails, transaction_hash,
    };
    use crate::types::{AllowedMethod, ChainId};

    const TOKEN: u64 = 0x49d3;
    const ACCOUNT: u64 = 0x5e55;

    fn signer() -> SessionSigner<LocalGuardian> {
        let service = Arc::new(DappService::new(
            ChainId::SEPOLIA,
            DappKey::from_hex("0xd4").unwrap(),
            LocalGuardian::new(),
        ));
        let session = service.create_session(
            4_000_000_000,
            vec![
                AllowedMethod::from_entrypoint(Felt::from(TOKEN), "approve"),
                AllowedMethod::from_entrypoint(Felt::from(TOKEN), "transfer"),
            ],
        );
        SessionSigner::new(service, session, vec![Felt::from(7u64), Felt::from(8u64)])
    }

    fn v2(query: bool) -> SignerDetails {
        SignerDetails::V2(V2SignerDetails {
            wallet_address: Felt::from(ACCOUNT),
            chain_id: ChainId::SEPOLIA,
            nonce: Felt::from(3u64),
            max_fee: Felt::from(1_000_000u64),
            query,
        })
    }

    fn v3() -> SignerDetails {
        SignerDetails::V3(V3SignerDetails::new(
            Felt::from(ACCOUNT),
            ChainId::SEPOLIA,
            Felt::from(3u64),
            ResourceBounds {
                l2_gas: ResourceBound {
                    max_amount: 1_000,
                    max_price_per_unit: 5,
                },
                ..ResourceBounds::default()
            },
        ))
    }

    fn transfer() -> Vec<Call> {
        vec![Call::new(Felt::from(TOKEN), "transfer", vec![Felt::ONE, Felt::TWO])]
    }

    fn signed_hash(
        signer: &SessionSigner<LocalGuardian>,
        details: &SignerDetails,
        token: &SessionToken,
    ) -> Felt {
        let message_hash = signer
            .service()
            .session_message_hash(signer.session(), details.wallet_address())
            .unwrap();
        combined_hash(
            transaction_hash(&transfer(), details),
            message_hash,
            token.cache_authorization,
        )
    }

    #[tokio::test]
    async fn signs_v2_and_v3_against_their_own_hashes() {
        let signer = signer();

        for details in [v2(false), v3()] {
            let sig = signer.sign_transaction(&transfer(), &details).await.unwrap();
            let token = SessionToken::from_signature(&sig).unwrap();
            let hash = signed_hash(&signer, &details, &token);

            let SignerSignature::Starknet { r, s, .. } = token.session_signature;
            assert!(
                signer
                    .service()
                    .verify_session_signature(hash, &StarknetSignature { r, s })
            );
            assert_eq!(token.session_authorization, vec![Felt::from(7u64), Felt::from(8u64)]);
        }
    }

    #[tokio::test]
    async fn version_changes_the_signature() {
        let signer = signer();
        let calls = transfer();

        let v2_sig = signer.sign_transaction(&calls, &v2(false)).await.unwrap();
        let query_sig = signer.sign_transaction(&calls, &v2(true)).await.unwrap();
        let v3_sig = signer.sign_transaction(&calls, &v3()).await.unwrap();

        let session_sig =
            |sig: &[Felt]| SessionToken::from_signature(sig).unwrap().session_signature;
        assert_ne!(session_sig(&v2_sig), session_sig(&query_sig));
        assert_ne!(session_sig(&v2_sig), session_sig(&v3_sig));
    }

    #[tokio::test]
    async fn cache_authorization_is_carried_in_token() {
        let signer = signer().with_cache_authorization(true);
        let sig = signer.sign_transaction(&transfer(), &v3()).await.unwrap();
        assert!(SessionToken::from_signature(&sig).unwrap().cache_authorization);
    }

    #[tokio::test]
    async fn out_of_scope_call_is_refused() {
        let signer = signer();
        let calls = vec![Call::new(Felt::from(TOKEN), "mint", vec![])];

        let err = signer.sign_transaction(&calls, &v3()).await.unwrap_err();
        assert!(matches!(err, Error::UnauthorizedCall { .. }));
        assert_eq!(signer.service().guardian().request_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_signing_from_shared_signer() {
        let signer = Arc::new(signer());

        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let signer = Arc::clone(&signer);
                tokio::spawn(async move {
                    let calls = vec![Call::new(Felt::from(TOKEN), "approve", vec![Felt::from(i)])];
                    signer.sign_transaction(&calls, &v3()).await
                })
            })
            .collect();

        let mut signatures = Vec::new();
        for handle in handles {
            signatures.push(handle.await.unwrap().unwrap());
        }
        signatures.sort();
        signatures.dedup();
        assert_eq!(signatures.len(), 8);
        assert_eq!(signer.service().guardian().request_count(), 8);
    }
}
