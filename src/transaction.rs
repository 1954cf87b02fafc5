//! Invoke transaction details and version-specific transaction hashes.

use serde::{Deserialize, Serialize};
use starknet_crypto::{pedersen_hash, poseidon_hash_many};
use starknet_types_core::felt::Felt;

use crate::codec::{felt_to_u128, felt_to_u64};
use crate::error::{Error, Result};
use crate::types::{Call, ChainId};

/// `"invoke"`
const INVOKE_PREFIX: Felt = Felt::from_hex_unchecked("0x696e766f6b65");
/// `"L1_GAS"`
const L1_GAS: u64 = 0x4c31_5f47_4153;
/// `"L2_GAS"`
const L2_GAS: u64 = 0x4c32_5f47_4153;
/// `"L1_DATA"`
const L1_DATA: u64 = 0x4c_315f_4441_5441;

pub const VERSION_1: Felt = Felt::ONE;
/// Fee-estimation variant of v1: `2^128 + 1`.
pub const VERSION_1_QUERY: Felt = Felt::from_hex_unchecked("0x100000000000000000000000000000001");
pub const VERSION_3: Felt = Felt::THREE;
/// Fee-estimation variant of v3: `2^128 + 3`.
pub const VERSION_3_QUERY: Felt = Felt::from_hex_unchecked("0x100000000000000000000000000000003");

/// Data-availability mode for nonce and fee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataAvailabilityMode {
    #[default]
    L1,
    L2,
}

impl DataAvailabilityMode {
    /// Integer code used in the transaction hash.
    #[must_use]
    pub fn code(self) -> u64 {
        match self {
            Self::L1 => 0,
            Self::L2 => 1,
        }
    }
}

/// Upper bound on one resource's consumption and unit price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceBound {
    pub max_amount: u64,
    pub max_price_per_unit: u128,
}

impl ResourceBound {
    /// Packs `name << 192 | max_amount << 128 | max_price_per_unit`.
    fn hash_word(&self, name: u64) -> Felt {
        let mut buf = [0u8; 32];
        buf[..8].copy_from_slice(&name.to_be_bytes());
        buf[8..16].copy_from_slice(&self.max_amount.to_be_bytes());
        buf[16..].copy_from_slice(&self.max_price_per_unit.to_be_bytes());
        Felt::from_bytes_be(&buf)
    }

    /// Scales both bounds by `numerator / denominator`, saturating.
    #[must_use]
    pub fn scaled(&self, numerator: u64, denominator: u64) -> Self {
        let amount = u128::from(self.max_amount) * u128::from(numerator) / u128::from(denominator);
        Self {
            max_amount: u64::try_from(amount).unwrap_or(u64::MAX),
            max_price_per_unit: self
                .max_price_per_unit
                .saturating_mul(u128::from(numerator))
                / u128::from(denominator),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceBounds {
    pub l1_gas: ResourceBound,
    pub l2_gas: ResourceBound,
    /// Present from RPC 0.8 onwards; omitted from the fee hash when `None`.
    pub l1_data_gas: Option<ResourceBound>,
}

impl ResourceBounds {
    #[must_use]
    pub fn scaled(&self, numerator: u64, denominator: u64) -> Self {
        Self {
            l1_gas: self.l1_gas.scaled(numerator, denominator),
            l2_gas: self.l2_gas.scaled(numerator, denominator),
            l1_data_gas: self.l1_data_gas.map(|b| b.scaled(numerator, denominator)),
        }
    }
}

/// Details for a legacy (v1) invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2SignerDetails {
    pub wallet_address: Felt,
    pub chain_id: ChainId,
    pub nonce: Felt,
    pub max_fee: Felt,
    /// Fee-estimation (query) version rather than an executable one.
    pub query: bool,
}

/// Details for a v3 invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V3SignerDetails {
    pub wallet_address: Felt,
    pub chain_id: ChainId,
    pub nonce: Felt,
    pub resource_bounds: ResourceBounds,
    pub tip: u64,
    pub paymaster_data: Vec<Felt>,
    pub account_deployment_data: Vec<Felt>,
    pub nonce_data_availability_mode: DataAvailabilityMode,
    pub fee_data_availability_mode: DataAvailabilityMode,
    pub query: bool,
}

impl V3SignerDetails {
    /// Executable v3 details with L1 data-availability modes and no tip.
    #[must_use]
    pub fn new(
        wallet_address: Felt,
        chain_id: ChainId,
        nonce: Felt,
        resource_bounds: ResourceBounds,
    ) -> Self {
        Self {
            wallet_address,
            chain_id,
            nonce,
            resource_bounds,
            tip: 0,
            paymaster_data: Vec::new(),
            account_deployment_data: Vec::new(),
            nonce_data_availability_mode: DataAvailabilityMode::L1,
            fee_data_availability_mode: DataAvailabilityMode::L1,
            query: false,
        }
    }
}

/// Transaction details a signer needs, by transaction version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSignerDetails", into = "RawSignerDetails")]
pub enum SignerDetails {
    V2(V2SignerDetails),
    V3(V3SignerDetails),
}

impl SignerDetails {
    #[must_use]
    pub fn wallet_address(&self) -> Felt {
        match self {
            Self::V2(d) => d.wallet_address,
            Self::V3(d) => d.wallet_address,
        }
    }

    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        match self {
            Self::V2(d) => d.chain_id,
            Self::V3(d) => d.chain_id,
        }
    }

    #[must_use]
    pub fn nonce(&self) -> Felt {
        match self {
            Self::V2(d) => d.nonce,
            Self::V3(d) => d.nonce,
        }
    }

    /// Version felt as it appears in the transaction.
    #[must_use]
    pub fn version(&self) -> Felt {
        match self {
            Self::V2(d) if d.query => VERSION_1_QUERY,
            Self::V2(_) => VERSION_1,
            Self::V3(d) if d.query => VERSION_3_QUERY,
            Self::V3(_) => VERSION_3,
        }
    }

    /// Hash of an invoke of `calldata` with these details.
    #[must_use]
    pub fn transaction_hash(&self, calldata: &[Felt]) -> Felt {
        match self {
            Self::V2(d) => compute_hash_on_elements(&[
                INVOKE_PREFIX,
                self.version(),
                d.wallet_address,
                Felt::ZERO,
                compute_hash_on_elements(calldata),
                d.max_fee,
                d.chain_id.as_felt(),
                d.nonce,
            ]),
            Self::V3(d) => {
                let data_availability = Felt::from(
                    (d.nonce_data_availability_mode.code() << 32)
                        + d.fee_data_availability_mode.code(),
                );
                poseidon_hash_many(&[
                    INVOKE_PREFIX,
                    self.version(),
                    d.wallet_address,
                    fee_field_hash(d.tip, &d.resource_bounds),
                    poseidon_hash_many(&d.paymaster_data),
                    d.chain_id.as_felt(),
                    d.nonce,
                    data_availability,
                    poseidon_hash_many(&d.account_deployment_data),
                    poseidon_hash_many(calldata),
                ])
            }
        }
    }
}

fn fee_field_hash(tip: u64, bounds: &ResourceBounds) -> Felt {
    let mut fields = vec![
        Felt::from(tip),
        bounds.l1_gas.hash_word(L1_GAS),
        bounds.l2_gas.hash_word(L2_GAS),
    ];
    if let Some(data_gas) = &bounds.l1_data_gas {
        fields.push(data_gas.hash_word(L1_DATA));
    }
    poseidon_hash_many(&fields)
}

/// Pedersen hash chain over `data`, terminated by its length.
#[must_use]
pub fn compute_hash_on_elements(data: &[Felt]) -> Felt {
    let acc = data
        .iter()
        .fold(Felt::ZERO, |acc, x| pedersen_hash(&acc, x));
    pedersen_hash(&acc, &Felt::from(data.len() as u64))
}

/// Calldata for a Cairo 1 account's `__execute__`:
/// `[n_calls, (to, selector, calldata_len, ...calldata)*]`.
#[must_use]
pub fn execute_calldata(calls: &[Call]) -> Vec<Felt> {
    let mut out = vec![Felt::from(calls.len() as u64)];
    for call in calls {
        out.push(call.to);
        out.push(call.selector);
        out.push(Felt::from(call.calldata.len() as u64));
        out.extend_from_slice(&call.calldata);
    }
    out
}

/// Computes the transaction hash `calls` would be signed under.
#[must_use]
pub fn transaction_hash(calls: &[Call], details: &SignerDetails) -> Felt {
    details.transaction_hash(&execute_calldata(calls))
}

// Wire form

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawResourceBound {
    max_amount: Felt,
    max_price_per_unit: Felt,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawResourceBounds {
    l1_gas: RawResourceBound,
    l2_gas: RawResourceBound,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    l1_data_gas: Option<RawResourceBound>,
}

/// Signer details as exchanged with JavaScript tooling and the guardian.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignerDetails {
    wallet_address: Felt,
    chain_id: ChainId,
    nonce: Felt,
    version: Felt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_fee: Option<Felt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_bounds: Option<RawResourceBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tip: Option<Felt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    paymaster_data: Option<Vec<Felt>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    account_deployment_data: Option<Vec<Felt>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nonce_data_availability_mode: Option<DataAvailabilityMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fee_data_availability_mode: Option<DataAvailabilityMode>,
}

impl From<ResourceBound> for RawResourceBound {
    fn from(b: ResourceBound) -> Self {
        Self {
            max_amount: Felt::from(b.max_amount),
            max_price_per_unit: Felt::from(b.max_price_per_unit),
        }
    }
}

impl TryFrom<RawResourceBound> for ResourceBound {
    type Error = Error;

    fn try_from(raw: RawResourceBound) -> Result<Self> {
        Ok(Self {
            max_amount: felt_to_u64(raw.max_amount)?,
            max_price_per_unit: felt_to_u128(raw.max_price_per_unit)?,
        })
    }
}

impl From<SignerDetails> for RawSignerDetails {
    fn from(details: SignerDetails) -> Self {
        let version = details.version();
        match details {
            SignerDetails::V2(d) => Self {
                wallet_address: d.wallet_address,
                chain_id: d.chain_id,
                nonce: d.nonce,
                version,
                max_fee: Some(d.max_fee),
                resource_bounds: None,
                tip: None,
                paymaster_data: None,
                account_deployment_data: None,
                nonce_data_availability_mode: None,
                fee_data_availability_mode: None,
            },
            SignerDetails::V3(d) => Self {
                wallet_address: d.wallet_address,
                chain_id: d.chain_id,
                nonce: d.nonce,
                version,
                max_fee: None,
                resource_bounds: Some(RawResourceBounds {
                    l1_gas: d.resource_bounds.l1_gas.into(),
                    l2_gas: d.resource_bounds.l2_gas.into(),
                    l1_data_gas: d.resource_bounds.l1_data_gas.map(Into::into),
                }),
                tip: Some(Felt::from(d.tip)),
                paymaster_data: Some(d.paymaster_data),
                account_deployment_data: Some(d.account_deployment_data),
                nonce_data_availability_mode: Some(d.nonce_data_availability_mode),
                fee_data_availability_mode: Some(d.fee_data_availability_mode),
            },
        }
    }
}

impl TryFrom<RawSignerDetails> for SignerDetails {
    type Error = Error;

    fn try_from(raw: RawSignerDetails) -> Result<Self> {
        let query = match raw.version {
            v if v == VERSION_1 || v == VERSION_3 => false,
            v if v == VERSION_1_QUERY || v == VERSION_3_QUERY => true,
            v => return Err(Error::UnsupportedVersion(v)),
        };

        if raw.version == VERSION_1 || raw.version == VERSION_1_QUERY {
            let max_fee = raw
                .max_fee
                .ok_or_else(|| Error::Encoding("v1 signer details require maxFee".into()))?;
            return Ok(Self::V2(V2SignerDetails {
                wallet_address: raw.wallet_address,
                chain_id: raw.chain_id,
                nonce: raw.nonce,
                max_fee,
                query,
            }));
        }

        let bounds = raw
            .resource_bounds
            .ok_or_else(|| Error::Encoding("v3 signer details require resourceBounds".into()))?;
        Ok(Self::V3(V3SignerDetails {
            wallet_address: raw.wallet_address,
            chain_id: raw.chain_id,
            nonce: raw.nonce,
            resource_bounds: ResourceBounds {
                l1_gas: bounds.l1_gas.try_into()?,
                l2_gas: bounds.l2_gas.try_into()?,
                l1_data_gas: bounds.l1_data_gas.map(TryInto::try_into).transpose()?,
            },
            tip: raw.tip.map(felt_to_u64).transpose()?.unwrap_or(0),
            paymaster_data: raw.paymaster_data.unwrap_or_default(),
            account_deployment_data: raw.account_deployment_data.unwrap_or_default(),
            nonce_data_availability_mode: raw.nonce_data_availability_mode.unwrap_or_default(),
            fee_data_availability_mode: raw.fee_data_availability_mode.unwrap_or_default(),
            query,
        }))
    }
}
