use std::sync::LazyLock;

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use starknet_crypto::poseidon_hash_many;
use starknet_types_core::felt::Felt;

use crate::error::Result;
use crate::felt::{selector_from_name, short_string, starknet_keccak};

/// SNIP-12 type hash of `Allowed Method`, used as the Merkle leaf domain tag.
pub static ALLOWED_METHOD_TYPE_HASH: LazyLock<Felt> = LazyLock::new(|| {
    starknet_keccak(
        br#""Allowed Method"("Contract Address":"ContractAddress","selector":"selector")"#,
    )
});

/// Starknet chain identifier (a short string such as `SN_MAIN`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
#[display("{_0:#x}")]
pub struct ChainId(pub Felt);

impl ChainId {
    /// `SN_MAIN`
    pub const MAINNET: Self = Self(Felt::from_hex_unchecked("0x534e5f4d41494e"));
    /// `SN_SEPOLIA`
    pub const SEPOLIA: Self = Self(Felt::from_hex_unchecked("0x534e5f5345504f4c4941"));

    /// Builds a chain ID from its short-string name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` if `name` is not a valid short string.
    pub fn from_name(name: &str) -> Result<Self> {
        short_string(name).map(Self)
    }

    #[must_use]
    pub fn as_felt(&self) -> Felt {
        self.0
    }
}

/// One `(contract, selector)` pair a session may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllowedMethod {
    #[serde(rename = "Contract Address")]
    pub contract_address: Felt,
    pub selector: Felt,
}

impl AllowedMethod {
    #[must_use]
    pub fn new(contract_address: Felt, selector: Felt) -> Self {
        Self {
            contract_address,
            selector,
        }
    }

    /// Allowed method identified by entrypoint name rather than selector.
    #[must_use]
    pub fn from_entrypoint(contract_address: Felt, entrypoint: &str) -> Self {
        Self::new(contract_address, selector_from_name(entrypoint))
    }

    /// Merkle leaf committing to this method.
    #[must_use]
    pub fn leaf_hash(&self) -> Felt {
        poseidon_hash_many(&[
            *ALLOWED_METHOD_TYPE_HASH,
            self.contract_address,
            self.selector,
        ])
    }

    /// Whether `call` targets this method.
    #[must_use]
    pub fn matches(&self, call: &Call) -> bool {
        self.contract_address == call.to && self.selector == call.selector
    }
}

/// A single contract invocation inside a multicall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    #[serde(rename = "contractAddress")]
    pub to: Felt,
    pub selector: Felt,
    pub calldata: Vec<Felt>,
}

impl Call {
    #[must_use]
    pub fn new(to: Felt, entrypoint: &str, calldata: Vec<Felt>) -> Self {
        Self {
            to,
            selector: selector_from_name(entrypoint),
            calldata,
        }
    }
}
