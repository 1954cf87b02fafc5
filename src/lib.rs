#![doc = include_str!("../README.md")]

pub mod account;
#[cfg(feature = "backend")]
pub mod backend;
pub mod codec;
pub mod error;
pub mod felt;
pub mod guardian;
pub mod key;
pub mod merkle;
pub mod service;
pub mod session;
pub mod session_hash;
pub mod signature;
pub mod signer;
pub mod token;
pub mod transaction;
pub mod typed_data;
pub mod types;

// Re-exports for convenient access
pub use account::{InvokeTransaction, Provider, SessionAccount};
#[cfg(feature = "backend")]
pub use backend::{BackendGuardian, GuardianConfig};
pub use error::{Error, Result};
pub use guardian::{GuardianRequest, GuardianSigner};
pub use key::DappKey;
pub use merkle::{AllowedMethodIndex, MerkleTree, SessionCommitment, verify_proof};
pub use service::{CoSignatures, DappService, SigningRequest};
pub use session::{OffChainSession, OnChainSession, SessionMetadata, expires_in};
pub use session_hash::{combined_hash, metadata_hash};
pub use signature::{GuardianSignature, SignerSignature, StarknetSignature};
pub use signer::{SessionSigner, TransactionSigner};
pub use starknet_types_core::felt::Felt;
pub use token::{SESSION_MAGIC, SessionToken, TokenSignatures, compile_session_token};
pub use transaction::{
    ResourceBound, ResourceBounds, SignerDetails, V2SignerDetails, V3SignerDetails,
    transaction_hash,
};
pub use typed_data::SessionTypedData;
pub use types::{AllowedMethod, Call, ChainId};
