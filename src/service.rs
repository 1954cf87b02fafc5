use starknet_types_core::felt::Felt;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::guardian::{GuardianRequest, GuardianSigner};
use crate::key::{DappKey, verify_signature};
use crate::merkle::SessionCommitment;
use crate::session::OffChainSession;
use crate::session_hash::{combined_hash, session_message_hash};
use crate::signature::{SignerSignature, StarknetSignature};
use crate::token::{SessionToken, TokenSignatures, compile_session_token};
use crate::transaction::SignerDetails;
use crate::typed_data::SessionTypedData;
use crate::types::{AllowedMethod, Call, ChainId};

/// Dapp-side session signing: holds the session key and chain, and asks the
/// guardian to co-sign every transaction.
///
/// Each signing call is independent; nothing is cached between calls, so one
/// service can sign concurrently for many sessions.
pub struct DappService<G> {
    chain_id: ChainId,
    key: DappKey,
    guardian: G,
}

/// One transaction to sign under a session.
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    pub session: &'a OffChainSession,
    /// Permission tree built from `session.allowed_methods`.
    pub commitment: &'a SessionCommitment,
    /// Owner's signature over the session typed data.
    pub session_authorization: &'a [Felt],
    pub calls: &'a [Call],
    pub details: &'a SignerDetails,
    pub transaction_hash: Felt,
    pub cache_authorization: bool,
}

/// Session-key and guardian signatures over one combined hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoSignatures {
    pub combined_hash: Felt,
    pub session_signature: SignerSignature,
    pub guardian_signature: SignerSignature,
}

impl<G: GuardianSigner> DappService<G> {
    #[must_use]
    pub fn new(chain_id: ChainId, key: DappKey, guardian: G) -> Self {
        Self {
            chain_id,
            key,
            guardian,
        }
    }

    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    #[must_use]
    pub fn public_key(&self) -> Felt {
        self.key.public_key()
    }

    #[must_use]
    pub fn guardian(&self) -> &G {
        &self.guardian
    }

    /// Session request bound to this service's key, ready for owner approval.
    #[must_use]
    pub fn create_session(
        &self,
        expires_at: u64,
        allowed_methods: Vec<AllowedMethod>,
    ) -> OffChainSession {
        OffChainSession::new(expires_at, allowed_methods, &self.key)
    }

    #[must_use]
    pub fn session_typed_data(&self, session: &OffChainSession) -> SessionTypedData {
        SessionTypedData::new(session, self.chain_id)
    }

    /// Message hash the owner signs to authorize `session` for `account_address`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` if the metadata cannot be encoded.
    pub fn session_message_hash(
        &self,
        session: &OffChainSession,
        account_address: Felt,
    ) -> Result<Felt> {
        session_message_hash(session, self.chain_id, account_address)
    }

    /// Checks a session-key signature over a combined hash.
    #[must_use]
    pub fn verify_session_signature(
        &self,
        combined_hash: Felt,
        signature: &StarknetSignature,
    ) -> bool {
        verify_signature(self.key.public_key(), combined_hash, signature)
    }

    /// Signs the combined hash with the session key and obtains the
    /// guardian's co-signature over the same commitment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Guardian` (or `Error::Http`) if the guardian fails,
    /// `Error::SessionExpired` for an expired session, and `Error::Config`
    /// if the details target another chain.
    pub async fn co_sign(&self, request: SigningRequest<'_>) -> Result<CoSignatures> {
        if request.details.chain_id() != self.chain_id {
            return Err(Error::Config(format!(
                "transaction chain {} does not match session chain {}",
                request.details.chain_id(),
                self.chain_id
            )));
        }
        if request.session.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(Error::SessionExpired {
                expires_at: request.session.expires_at,
            });
        }

        let typed_data = self.session_typed_data(request.session);
        let message_hash = typed_data.message_hash(request.details.wallet_address())?;
        let hash = combined_hash(
            request.transaction_hash,
            message_hash,
            request.cache_authorization,
        );
        let session_signature = self.key.sign(hash)?;

        tracing::debug!(
            transaction_hash = %format!("{:#x}", request.transaction_hash),
            session_message_hash = %format!("{message_hash:#x}"),
            cache_authorization = request.cache_authorization,
            "Requesting guardian co-signature"
        );

        let guardian_signature = self
            .guardian
            .sign_tx_and_session(GuardianRequest {
                calls: request.calls,
                details: request.details,
                session_typed_data: &typed_data,
                session_public_key: self.key.public_key(),
                session_signature,
                cache_authorization: request.cache_authorization,
            })
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Guardian co-signature failed"))?;

        Ok(CoSignatures {
            combined_hash: hash,
            session_signature: SignerSignature::starknet(self.key.public_key(), session_signature),
            guardian_signature: guardian_signature.into(),
        })
    }

    /// Full pipeline: validates the calls, co-signs and compiles the token.
    ///
    /// Unauthorized calls and a commitment built from other allowed methods
    /// are rejected before the guardian is contacted.
    ///
    /// # Errors
    ///
    /// See [`co_sign`](Self::co_sign) and
    /// [`compile_session_token`](crate::token::compile_session_token).
    pub async fn session_token(&self, request: SigningRequest<'_>) -> Result<SessionToken> {
        request.commitment.proofs_for_calls(request.calls)?;
        if request.commitment.root() != request.session.compile()?.allowed_methods_root {
            return Err(Error::Encoding(
                "permission commitment does not match the session's allowed methods".into(),
            ));
        }

        let signatures = self.co_sign(request).await?;

        compile_session_token(
            request.session,
            request.commitment,
            request.calls,
            TokenSignatures {
                session_authorization: request.session_authorization.to_vec(),
                session_signature: signatures.session_signature,
                guardian_signature: signatures.guardian_signature,
            },
            request.cache_authorization,
        )
    }

    /// Transaction signature `[SESSION_MAGIC, ...token]` for `request`.
    ///
    /// # Errors
    ///
    /// See [`session_token`](Self::session_token).
    pub async fn sign_session_transaction(&self, request: SigningRequest<'_>) -> Result<Vec<Felt>> {
        let token = self.session_token(request).await?;
        Ok(token.to_signature())
    }
}

impl<G> std::fmt::Debug for DappService<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DappService")
            .field("chain_id", &self.chain_id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardian::testing::{LocalGuardian, RejectingGuardian};
    use crate::merkle::verify_proof;
    use crate::token::SESSION_MAGIC;
    use crate::transaction::{ResourceBound, ResourceBounds, V3SignerDetails, transaction_hash};

    const ACCOUNT: u64 = 0xacc0;
    const AUTH: &[Felt] = &[Felt::from_hex_unchecked("0xa0a")];

    fn service<G: GuardianSigner>(guardian: G) -> DappService<G> {
        DappService::new(
            ChainId::SEPOLIA,
            DappKey::from_hex("0x51e55").unwrap(),
            guardian,
        )
    }

    fn session<G: GuardianSigner>(service: &DappService<G>) -> OffChainSession {
        service
            .create_session(
                4_000_000_000,
                vec![AllowedMethod::from_entrypoint(Felt::from(0xabcu64), "transfer")],
            )
            .with_metadata(r#"{"projectID":"demo","txFees":[]}"#)
    }

    fn details() -> SignerDetails {
        SignerDetails::V3(V3SignerDetails::new(
            Felt::from(ACCOUNT),
            ChainId::SEPOLIA,
            Felt::ZERO,
            ResourceBounds {
                l1_gas: ResourceBound {
                    max_amount: 10,
                    max_price_per_unit: 100,
                },
                ..ResourceBounds::default()
            },
        ))
    }

    struct Fixture<G> {
        service: DappService<G>,
        session: OffChainSession,
        commitment: SessionCommitment,
        details: SignerDetails,
    }

    impl<G: GuardianSigner> Fixture<G> {
        fn new(guardian: G) -> Self {
            let service = service(guardian);
            let session = session(&service);
            let commitment = SessionCommitment::new(&session.allowed_methods);
            Self {
                service,
                session,
                commitment,
                details: details(),
            }
        }

        fn request<'a>(&'a self, calls: &'a [Call], cache: bool) -> SigningRequest<'a> {
            SigningRequest {
                session: &self.session,
                commitment: &self.commitment,
                session_authorization: AUTH,
                calls,
                details: &self.details,
                transaction_hash: transaction_hash(calls, &self.details),
                cache_authorization: cache,
            }
        }
    }

    #[tokio::test]
    async fn matching_call_yields_token_with_magic_and_one_proof() {
        let fx = Fixture::new(LocalGuardian::new());
        let calls = vec![Call::new(Felt::from(0xabcu64), "transfer", vec![Felt::ONE])];

        let signature = fx
            .service
            .sign_session_transaction(fx.request(&calls, false))
            .await
            .unwrap();

        assert_eq!(signature[0], SESSION_MAGIC);
        let token = SessionToken::from_signature(&signature).unwrap();
        assert_eq!(token.proofs.len(), 1);
        assert!(verify_proof(
            token.session.allowed_methods_root,
            fx.session.allowed_methods[0].leaf_hash(),
            &token.proofs[0]
        ));
        assert_eq!(token.session, fx.session.compile().unwrap());
        assert_eq!(token.session_authorization, AUTH);
        assert_eq!(token.session_signature.pubkey(), fx.service.public_key());
        assert_eq!(
            token.guardian_signature.pubkey(),
            fx.service.guardian().key.public_key()
        );
    }

    #[tokio::test]
    async fn both_signatures_cover_combined_hash() {
        let fx = Fixture::new(LocalGuardian::new());
        let calls = vec![Call::new(Felt::from(0xabcu64), "transfer", vec![])];
        let request = fx.request(&calls, true);

        let sigs = fx.service.co_sign(request).await.unwrap();

        let message_hash = fx
            .service
            .session_message_hash(&fx.session, Felt::from(ACCOUNT))
            .unwrap();
        let expected = combined_hash(request.transaction_hash, message_hash, true);
        assert_eq!(sigs.combined_hash, expected);

        let SignerSignature::Starknet { r, s, .. } = sigs.session_signature;
        assert!(
            fx.service
                .verify_session_signature(expected, &StarknetSignature { r, s })
        );

        let SignerSignature::Starknet { pubkey, r, s } = sigs.guardian_signature;
        assert!(verify_signature(pubkey, expected, &StarknetSignature { r, s }));
    }

    #[tokio::test]
    async fn cache_flag_changes_session_signature() {
        let fx = Fixture::new(LocalGuardian::new());
        let calls = vec![Call::new(Felt::from(0xabcu64), "transfer", vec![])];

        let uncached = fx.service.co_sign(fx.request(&calls, false)).await.unwrap();
        let cached = fx.service.co_sign(fx.request(&calls, true)).await.unwrap();

        assert_ne!(uncached.combined_hash, cached.combined_hash);
        assert_ne!(uncached.session_signature, cached.session_signature);
    }

    #[tokio::test]
    async fn signing_is_repeatable() {
        let fx = Fixture::new(LocalGuardian::new());
        let calls = vec![Call::new(Felt::from(0xabcu64), "transfer", vec![])];

        let first = fx.service.sign_session_transaction(fx.request(&calls, false)).await.unwrap();
        let second = fx.service.sign_session_transaction(fx.request(&calls, false)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unauthorized_call_never_reaches_guardian() {
        let fx = Fixture::new(LocalGuardian::new());
        let calls = vec![Call::new(Felt::from(0xdefu64), "other", vec![])];

        let err = fx
            .service
            .sign_session_transaction(fx.request(&calls, false))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnauthorizedCall { .. }));
        assert_eq!(fx.service.guardian().request_count(), 0);
    }

    #[tokio::test]
    async fn guardian_rejection_is_surfaced() {
        let fx = Fixture::new(RejectingGuardian);
        let calls = vec![Call::new(Felt::from(0xabcu64), "transfer", vec![])];

        let err = fx
            .service
            .sign_session_transaction(fx.request(&calls, false))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Guardian {
                status: Some(403),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn wrong_chain_is_rejected() {
        let fx = Fixture::new(LocalGuardian::new());
        let calls = vec![Call::new(Felt::from(0xabcu64), "transfer", vec![])];
        let mainnet = SignerDetails::V3(V3SignerDetails::new(
            Felt::from(ACCOUNT),
            ChainId::MAINNET,
            Felt::ZERO,
            ResourceBounds::default(),
        ));
        let mut request = fx.request(&calls, false);
        request.details = &mainnet;

        assert!(matches!(fx.service.co_sign(request).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let mut fx = Fixture::new(LocalGuardian::new());
        fx.session.expires_at = 1;
        let calls = vec![Call::new(Felt::from(0xabcu64), "transfer", vec![])];

        let err = fx.service.co_sign(fx.request(&calls, false)).await.unwrap_err();
        assert!(matches!(err, Error::SessionExpired { expires_at: 1 }));
        assert_eq!(fx.service.guardian().request_count(), 0);
    }

    #[tokio::test]
    async fn foreign_commitment_never_reaches_guardian() {
        let mut fx = Fixture::new(LocalGuardian::new());
        let mut wider = fx.session.allowed_methods.clone();
        wider.push(AllowedMethod::from_entrypoint(Felt::from(0xabcu64), "approve"));
        fx.commitment = SessionCommitment::new(&wider);
        let calls = vec![Call::new(Felt::from(0xabcu64), "transfer", vec![])];

        let err = fx
            .service
            .sign_session_transaction(fx.request(&calls, false))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Encoding(_)));
        assert_eq!(fx.service.guardian().request_count(), 0);
    }

    #[test]
    fn debug_does_not_leak_key() {
        let service = service(RejectingGuardian);
        assert!(format!("{service:?}").contains("<redacted>"));
    }
}
