//! Hashes binding a transaction to a session.

use starknet_crypto::poseidon_hash_many;
use starknet_types_core::felt::Felt;

use crate::error::Result;
use crate::felt::ByteArray;
use crate::session::OffChainSession;
use crate::typed_data::SessionTypedData;
use crate::types::ChainId;

/// Poseidon hash of the metadata string in its `ByteArray` form.
///
/// # Errors
///
/// Returns `Error::Encoding` if the metadata is too large for a `ByteArray`.
pub fn metadata_hash(metadata: &str) -> Result<Felt> {
    let bytes = ByteArray::try_from(metadata)?;
    Ok(poseidon_hash_many(&bytes.to_felts()))
}

/// SNIP-12 message hash of `session` for `account_address` on `chain_id`.
///
/// # Errors
///
/// Returns `Error::Encoding` if the metadata cannot be encoded.
pub fn session_message_hash(
    session: &OffChainSession,
    chain_id: ChainId,
    account_address: Felt,
) -> Result<Felt> {
    SessionTypedData::new(session, chain_id).message_hash(account_address)
}

/// The value both the session key and the guardian sign:
/// `poseidon(transaction_hash, session_message_hash, cache_authorization)`.
#[must_use]
pub fn combined_hash(
    transaction_hash: Felt,
    session_message_hash: Felt,
    cache_authorization: bool,
) -> Felt {
    poseidon_hash_many(&[
        transaction_hash,
        session_message_hash,
        if cache_authorization { Felt::ONE } else { Felt::ZERO },
    ])
}
