//! SNIP-12 (revision 1) typed data for session approval.
//!
//! The owner's wallet signs this document when approving a session, and the
//! guardian receives it alongside each co-signing request. Only its message
//! hash matters for signing; the JSON form is never submitted on chain.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::{Serialize, Serializer};
use starknet_crypto::poseidon_hash_many;
use starknet_types_core::felt::Felt;

use crate::error::Result;
use crate::felt::starknet_keccak;
use crate::session::OffChainSession;
use crate::types::{AllowedMethod, ChainId};

/// `"StarkNet Message"`
const STARKNET_MESSAGE: Felt = Felt::from_hex_unchecked("0x537461726b4e6574204d657373616765");
/// `"SessionAccount.session"`
const DOMAIN_NAME: Felt =
    Felt::from_hex_unchecked("0x53657373696f6e4163636f756e742e73657373696f6e");
/// Short string `"1"`.
const DOMAIN_VERSION: Felt = Felt::from_hex_unchecked("0x31");
const REVISION: Felt = Felt::ONE;

struct Member {
    name: &'static str,
    kind: &'static str,
    contains: Option<&'static str>,
}

const fn member(name: &'static str, kind: &'static str) -> Member {
    Member {
        name,
        kind,
        contains: None,
    }
}

const DOMAIN_TYPE: (&str, &[Member]) = (
    "StarknetDomain",
    &[
        member("name", "shortstring"),
        member("version", "shortstring"),
        member("chainId", "shortstring"),
        member("revision", "shortstring"),
    ],
);

const ALLOWED_METHOD_TYPE: (&str, &[Member]) = (
    "Allowed Method",
    &[
        member("Contract Address", "ContractAddress"),
        member("selector", "selector"),
    ],
);

const SESSION_TYPE: (&str, &[Member]) = (
    "Session",
    &[
        member("Expires At", "timestamp"),
        Member {
            name: "Allowed Methods",
            kind: "merkletree",
            contains: Some("Allowed Method"),
        },
        member("Metadata", "string"),
        member("Session Key", "felt"),
    ],
);

/// Revision 1 type encoding, e.g. `"Session"("Expires At":"timestamp",...)`.
///
/// `merkletree` members do not pull their leaf type into the encoding.
fn encode_type((name, members): (&str, &[Member])) -> String {
    let fields: Vec<String> = members
        .iter()
        .map(|m| format!("\"{}\":\"{}\"", m.name, m.kind))
        .collect();
    format!("\"{name}\"({})", fields.join(","))
}

static DOMAIN_TYPE_HASH: LazyLock<Felt> =
    LazyLock::new(|| starknet_keccak(encode_type(DOMAIN_TYPE).as_bytes()));

static SESSION_TYPE_HASH: LazyLock<Felt> =
    LazyLock::new(|| starknet_keccak(encode_type(SESSION_TYPE).as_bytes()));

/// Session approval document, bound to one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTypedData {
    chain_id: ChainId,
    session: OffChainSession,
}

impl SessionTypedData {
    #[must_use]
    pub fn new(session: &OffChainSession, chain_id: ChainId) -> Self {
        Self {
            chain_id,
            session: session.clone(),
        }
    }

    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    #[must_use]
    pub fn session(&self) -> &OffChainSession {
        &self.session
    }

    #[must_use]
    pub fn domain_hash(&self) -> Felt {
        poseidon_hash_many(&[
            *DOMAIN_TYPE_HASH,
            DOMAIN_NAME,
            DOMAIN_VERSION,
            self.chain_id.as_felt(),
            REVISION,
        ])
    }

    /// Hash of the `Session` struct. The merkletree member hashes to the
    /// same root as the compiled session's `allowed_methods_root`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` if the metadata cannot be encoded.
    pub fn struct_hash(&self) -> Result<Felt> {
        let compiled = self.session.compile()?;
        Ok(poseidon_hash_many(&[
            *SESSION_TYPE_HASH,
            Felt::from(compiled.expires_at),
            compiled.allowed_methods_root,
            compiled.metadata_hash,
            compiled.session_key_guid,
        ]))
    }

    /// Message hash as signed by `account_address`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` if the metadata cannot be encoded.
    pub fn message_hash(&self, account_address: Felt) -> Result<Felt> {
        Ok(poseidon_hash_many(&[
            STARKNET_MESSAGE,
            self.domain_hash(),
            account_address,
            self.struct_hash()?,
        ]))
    }
}

#[derive(Serialize)]
struct TypeMemberJson {
    name: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    contains: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DomainJson {
    name: &'static str,
    version: &'static str,
    chain_id: ChainId,
    revision: &'static str,
}

#[derive(Serialize)]
struct MessageJson<'a> {
    #[serde(rename = "Expires At")]
    expires_at: String,
    #[serde(rename = "Allowed Methods")]
    allowed_methods: &'a [AllowedMethod],
    #[serde(rename = "Metadata")]
    metadata: &'a str,
    #[serde(rename = "Session Key")]
    session_key: Felt,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentJson<'a> {
    types: BTreeMap<&'static str, Vec<TypeMemberJson>>,
    primary_type: &'static str,
    domain: DomainJson,
    message: MessageJson<'a>,
}

fn type_json((name, members): (&'static str, &[Member])) -> (&'static str, Vec<TypeMemberJson>) {
    let members = members
        .iter()
        .map(|m| TypeMemberJson {
            name: m.name,
            kind: m.kind,
            contains: m.contains,
        })
        .collect();
    (name, members)
}

impl Serialize for SessionTypedData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        DocumentJson {
            types: [DOMAIN_TYPE, ALLOWED_METHOD_TYPE, SESSION_TYPE]
                .into_iter()
                .map(type_json)
                .collect(),
            primary_type: SESSION_TYPE.0,
            domain: DomainJson {
                name: "SessionAccount.session",
                version: "0x31",
                chain_id: self.chain_id,
                revision: "1",
            },
            message: MessageJson {
                expires_at: self.session.expires_at.to_string(),
                allowed_methods: &self.session.allowed_methods,
                metadata: &self.session.metadata,
                session_key: self.session.session_key_guid,
            },
        }
        .serialize(serializer)
    }
}
