use std::future::Future;

use starknet_types_core::felt::Felt;

use crate::error::{Error, Result};
use crate::signer::TransactionSigner;
use crate::transaction::{ResourceBounds, SignerDetails, V3SignerDetails, execute_calldata};
use crate::types::{Call, ChainId};

/// Fee margin applied to estimates: 3/2.
const FEE_MARGIN: (u64, u64) = (3, 2);

/// Signed (or query) invoke ready for the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeTransaction {
    pub sender_address: Felt,
    pub calldata: Vec<Felt>,
    pub signature: Vec<Felt>,
    pub details: SignerDetails,
}

impl InvokeTransaction {
    #[must_use]
    pub fn transaction_hash(&self) -> Felt {
        self.details.transaction_hash(&self.calldata)
    }
}

/// Node access needed to execute session transactions.
///
/// Implementations report failures as `Error::Provider`.
pub trait Provider: Send + Sync {
    fn chain_id(&self) -> impl Future<Output = Result<ChainId>> + Send;

    fn nonce(&self, address: Felt) -> impl Future<Output = Result<Felt>> + Send;

    /// Resource consumption of a query-version invoke.
    fn estimate_fee(
        &self,
        invoke: &InvokeTransaction,
    ) -> impl Future<Output = Result<ResourceBounds>> + Send;

    /// Submits `invoke` and returns its transaction hash.
    fn submit_invoke(&self, invoke: InvokeTransaction) -> impl Future<Output = Result<Felt>> + Send;
}

/// Account that executes v3 invokes signed by a [`TransactionSigner`].
#[derive(Debug)]
pub struct SessionAccount<P, S> {
    provider: P,
    signer: S,
    address: Felt,
    chain_id: ChainId,
}

impl<P: Provider, S: TransactionSigner> SessionAccount<P, S> {
    /// Binds `signer` to the account at `address` on the provider's chain.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the chain id cannot be fetched.
    pub async fn connect(provider: P, signer: S, address: Felt) -> Result<Self> {
        let chain_id = provider.chain_id().await?;
        Ok(Self {
            provider,
            signer,
            address,
            chain_id,
        })
    }

    #[must_use]
    pub fn address(&self) -> Felt {
        self.address
    }

    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Signs and submits `calls`. Without explicit `resource_bounds` the fee
    /// is estimated first and padded by half.
    ///
    /// # Errors
    ///
    /// Returns signing errors from the signer (including
    /// `Error::UnauthorizedCall`) and provider errors.
    pub async fn execute(
        &self,
        calls: &[Call],
        resource_bounds: Option<ResourceBounds>,
    ) -> Result<Felt> {
        if calls.is_empty() {
            return Err(Error::Config("no calls to execute".into()));
        }

        let nonce = self.provider.nonce(self.address).await?;
        let resource_bounds = match resource_bounds {
            Some(bounds) => bounds,
            None => self.estimate_resource_bounds(calls, nonce).await?,
        };

        let details = SignerDetails::V3(V3SignerDetails::new(
            self.address,
            self.chain_id,
            nonce,
            resource_bounds,
        ));
        let signature = self.signer.sign_transaction(calls, &details).await?;

        let invoke = InvokeTransaction {
            sender_address: self.address,
            calldata: execute_calldata(calls),
            signature,
            details,
        };
        let transaction_hash = self.provider.submit_invoke(invoke).await?;

        tracing::info!(
            account = %format!("{:#x}", self.address),
            transaction_hash = %format!("{transaction_hash:#x}"),
            calls = calls.len(),
            "Submitted session transaction"
        );
        Ok(transaction_hash)
    }

    /// Estimated bounds for `calls`, scaled by the fee margin.
    ///
    /// # Errors
    ///
    /// Returns signing or provider errors.
    pub async fn estimate_resource_bounds(
        &self,
        calls: &[Call],
        nonce: Felt,
    ) -> Result<ResourceBounds> {
        let mut query = V3SignerDetails::new(
            self.address,
            self.chain_id,
            nonce,
            ResourceBounds::default(),
        );
        query.query = true;
        let details = SignerDetails::V3(query);
        let signature = self.signer.sign_transaction(calls, &details).await?;

        let estimate = self
            .provider
            .estimate_fee(&InvokeTransaction {
                sender_address: self.address,
                calldata: execute_calldata(calls),
                signature,
                details,
            })
            .await?;

        tracing::debug!(?estimate, "Estimated session transaction fee");
        Ok(estimate.scaled(FEE_MARGIN.0, FEE_MARGIN.1))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::guardian::testing::LocalGuardian;
    use crate::key::DappKey;
    use crate::service::DappService;
    use crate::signer::SessionSigner;
    use crate::token::SessionToken;
    use crate::transaction::{ResourceBound, VERSION_3, VERSION_3_QUERY};
    use crate::types::AllowedMethod;

    const ACCOUNT: u64 = 0xacc;
    const TOKEN: u64 = 0x70c;

    #[derive(Default)]
    struct FakeProvider {
        fail_nonce: bool,
        estimated: Mutex<Vec<InvokeTransaction>>,
        submitted: Mutex<Vec<InvokeTransaction>>,
    }

    fn estimate() -> ResourceBounds {
        ResourceBounds {
            l1_gas: ResourceBound {
                max_amount: 100,
                max_price_per_unit: 10,
            },
            l2_gas: ResourceBound {
                max_amount: 2_000,
                max_price_per_unit: 4,
            },
            l1_data_gas: Some(ResourceBound {
                max_amount: 64,
                max_price_per_unit: 2,
            }),
        }
    }

    impl Provider for FakeProvider {
        async fn chain_id(&self) -> Result<ChainId> {
            Ok(ChainId::SEPOLIA)
        }

        async fn nonce(&self, _address: Felt) -> Result<Felt> {
            if self.fail_nonce {
                return Err(Error::Provider("node unavailable".into()));
            }
            Ok(Felt::from(9u64))
        }

        async fn estimate_fee(&self, invoke: &InvokeTransaction) -> Result<ResourceBounds> {
            self.estimated.lock().unwrap().push(invoke.clone());
            Ok(estimate())
        }

        async fn submit_invoke(&self, invoke: InvokeTransaction) -> Result<Felt> {
            let hash = invoke.transaction_hash();
            self.submitted.lock().unwrap().push(invoke);
            Ok(hash)
        }
    }

    async fn account(
        provider: FakeProvider,
    ) -> SessionAccount<FakeProvider, SessionSigner<LocalGuardian>> {
        let service = Arc::new(DappService::new(
            ChainId::SEPOLIA,
            DappKey::from_hex("0x5ec").unwrap(),
            LocalGuardian::new(),
        ));
        let session = service.create_session(
            4_000_000_000,
            vec![AllowedMethod::from_entrypoint(Felt::from(TOKEN), "transfer")],
        );
        let signer = SessionSigner::new(service, session, vec![Felt::ONE]);
        SessionAccount::connect(provider, signer, Felt::from(ACCOUNT))
            .await
            .unwrap()
    }

    fn transfer() -> Vec<Call> {
        vec![Call::new(Felt::from(TOKEN), "transfer", vec![Felt::from(5u64)])]
    }

    #[tokio::test]
    async fn estimates_then_submits_with_margin() {
        let account = account(FakeProvider::default()).await;

        let hash = account.execute(&transfer(), None).await.unwrap();

        let estimated = account.provider().estimated.lock().unwrap();
        assert_eq!(estimated.len(), 1);
        assert_eq!(estimated[0].details.version(), VERSION_3_QUERY);
        assert!(SessionToken::is_session_signature(&estimated[0].signature));

        let submitted = account.provider().submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        let invoke = &submitted[0];
        assert_eq!(invoke.transaction_hash(), hash);
        assert_eq!(invoke.details.version(), VERSION_3);
        assert_eq!(invoke.details.nonce(), Felt::from(9u64));
        assert_eq!(invoke.sender_address, Felt::from(ACCOUNT));
        assert_eq!(invoke.calldata, execute_calldata(&transfer()));

        let SignerDetails::V3(details) = &invoke.details else {
            panic!("expected v3 details");
        };
        assert_eq!(details.resource_bounds.l1_gas.max_amount, 150);
        assert_eq!(details.resource_bounds.l2_gas.max_price_per_unit, 6);
        assert_eq!(details.resource_bounds.l1_data_gas.map(|b| b.max_amount), Some(96));

        let token = SessionToken::from_signature(&invoke.signature).unwrap();
        assert_eq!(token.proofs.len(), 1);
    }

    #[tokio::test]
    async fn explicit_bounds_skip_estimation() {
        let account = account(FakeProvider::default()).await;

        account.execute(&transfer(), Some(estimate())).await.unwrap();

        assert!(account.provider().estimated.lock().unwrap().is_empty());
        let submitted = account.provider().submitted.lock().unwrap();
        let SignerDetails::V3(details) = &submitted[0].details else {
            panic!("expected v3 details");
        };
        assert_eq!(details.resource_bounds, estimate());
        assert_eq!(account.signer().service().guardian().request_count(), 1);
    }

    #[tokio::test]
    async fn provider_failure_aborts_before_signing() {
        let account = account(FakeProvider {
            fail_nonce: true,
            ..FakeProvider::default()
        })
        .await;

        let err = account.execute(&transfer(), None).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert_eq!(account.signer().service().guardian().request_count(), 0);
    }

    #[tokio::test]
    async fn unauthorized_call_is_never_submitted() {
        let account = account(FakeProvider::default()).await;
        let calls = vec![Call::new(Felt::from(TOKEN), "burn", vec![])];

        let err = account.execute(&calls, Some(estimate())).await.unwrap_err();
        assert!(matches!(err, Error::UnauthorizedCall { .. }));
        assert!(account.provider().submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_call_list_is_rejected() {
        let account = account(FakeProvider::default()).await;
        assert!(matches!(
            account.execute(&[], None).await,
            Err(Error::Config(_))
        ));
    }
}
