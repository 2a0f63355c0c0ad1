// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::error::{BridgeError, BridgeResult};
use candid::{CandidType, Nat, Principal};
use ethers::types::{Address as EthAddress, U256};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Width of the cross-chain recipient encoding carried in lock events and
/// signed messages. ICP principals (at most 29 raw bytes) are zero-padded on
/// the right to this width.
pub const CROSS_CHAIN_ADDRESS_WIDTH: usize = 32;

/// Raw byte length of a principal recovered from a 32-byte word.
pub const PRINCIPAL_RAW_LEN: usize = 29;

/// One supported asset: the ICP ledger principal, its EVM counterpart, and
/// the ICP-side decimal count. The EVM side's decimals are discovered lazily
/// from the token contract and cached for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMapping {
    pub icp_token: Principal,
    pub eth_token: EthAddress,
    pub icp_decimals: u8,
}

/// Static, bidirectional token mapping table. Built once from config;
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TokenMap {
    by_icp: HashMap<Principal, TokenMapping>,
    by_eth: HashMap<EthAddress, TokenMapping>,
}

impl TokenMap {
    pub fn new(mappings: Vec<TokenMapping>) -> Self {
        let mut by_icp = HashMap::new();
        let mut by_eth = HashMap::new();
        for mapping in mappings {
            by_icp.insert(mapping.icp_token, mapping.clone());
            by_eth.insert(mapping.eth_token, mapping);
        }
        Self { by_icp, by_eth }
    }

    /// Parse `{ "<principal>": "<eth address>" }` pairs from config.
    /// ICP-side decimals default to 0 (ICP ledger amounts are integral).
    pub fn from_config_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> BridgeResult<Self> {
        let mut mappings = Vec::new();
        for (icp, eth) in pairs {
            let icp_token = Principal::from_text(icp)
                .map_err(|e| BridgeError::Generic(format!("invalid principal {icp}: {e}")))?;
            let eth_token: EthAddress = eth
                .parse()
                .map_err(|e| BridgeError::Generic(format!("invalid eth address {eth}: {e}")))?;
            mappings.push(TokenMapping {
                icp_token,
                eth_token,
                icp_decimals: 0,
            });
        }
        Ok(Self::new(mappings))
    }

    pub fn resolve_icp(&self, icp_token: &Principal) -> Option<&TokenMapping> {
        self.by_icp.get(icp_token)
    }

    pub fn resolve_eth(&self, eth_token: &EthAddress) -> Option<&TokenMapping> {
        self.by_eth.get(eth_token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenMapping> {
        self.by_icp.values()
    }

    pub fn len(&self) -> usize {
        self.by_icp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_icp.is_empty()
    }
}

/// Destination-side view of a transfer, as reported by the bridge canister.
#[derive(Debug, Clone, PartialEq, Eq, CandidType, Deserialize, Serialize)]
pub struct TransferStatus {
    pub completed: bool,
    pub timestamp: u64,
}

/// A transfer locked on the ICP side awaiting release on the EVM side.
#[derive(Debug, Clone, CandidType, Deserialize)]
pub struct PendingTransfer {
    pub id: String,
    pub token: Principal,
    pub amount: Nat,
    pub sender: Principal,
    pub recipient: String,
    pub timestamp: u64,
    pub completed: bool,
    pub signature: Option<Vec<u8>>,
}

/// Argument record for the canister's `lockTokens` entry point.
#[derive(Debug, Clone, CandidType, Deserialize)]
pub struct LockRequest {
    pub token: Principal,
    pub amount: Nat,
    pub recipient: String,
}

/// Result record of the canister's `lockTokens` entry point.
#[derive(Debug, Clone, CandidType, Deserialize)]
pub struct LockReceipt {
    #[serde(rename = "txId")]
    pub tx_id: String,
}

/// `variant { ok; err: text }` as returned by canister mutations.
#[derive(Debug, Clone, CandidType, Deserialize)]
pub enum CanisterAck {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "err")]
    Err(String),
}

impl CanisterAck {
    pub fn into_result(self) -> BridgeResult<()> {
        match self {
            CanisterAck::Ok => Ok(()),
            CanisterAck::Err(msg) => Err(BridgeError::CanisterRejection(msg)),
        }
    }
}

/// Rescale an amount between decimal bases, truncating toward zero.
///
/// `amount_dst = amount_src * 10^(to - from)`. The shrinking direction loses
/// dust; the growing direction errors instead of silently overflowing.
pub fn rescale_amount(amount: U256, from_decimals: u8, to_decimals: u8) -> BridgeResult<U256> {
    if to_decimals >= from_decimals {
        let exp = U256::from(to_decimals - from_decimals);
        let factor = U256::from(10)
            .checked_pow(exp)
            .ok_or_else(|| BridgeError::AmountOverflow(format!("10^{exp} exceeds 256 bits")))?;
        amount.checked_mul(factor).ok_or_else(|| {
            BridgeError::AmountOverflow(format!(
                "{amount} * 10^{} exceeds 256 bits",
                to_decimals - from_decimals
            ))
        })
    } else {
        let exp = U256::from(from_decimals - to_decimals);
        let factor = U256::from(10)
            .checked_pow(exp)
            .ok_or_else(|| BridgeError::AmountOverflow(format!("10^{exp} exceeds 256 bits")))?;
        Ok(amount / factor)
    }
}

/// Zero-pad a principal's raw bytes on the right to a 32-byte word.
pub fn principal_to_bytes32(principal: &Principal) -> [u8; CROSS_CHAIN_ADDRESS_WIDTH] {
    let raw = principal.as_slice();
    let mut word = [0u8; CROSS_CHAIN_ADDRESS_WIDTH];
    word[..raw.len()].copy_from_slice(raw);
    word
}

/// Reinterpret the low 29 bytes of a 32-byte word as a principal.
///
/// This is the inverse of [`principal_to_bytes32`] for self-authenticating
/// principals, whose raw form is exactly 29 bytes.
pub fn bytes32_to_principal(word: &[u8; CROSS_CHAIN_ADDRESS_WIDTH]) -> BridgeResult<Principal> {
    Principal::try_from_slice(&word[..PRINCIPAL_RAW_LEN])
        .map_err(|e| BridgeError::InvalidRecipient(format!("{e}")))
}

/// Convert a candid `Nat` into a `U256`, erroring past 256 bits.
pub fn nat_to_u256(value: &Nat) -> BridgeResult<U256> {
    let bytes = value.0.to_bytes_be();
    if bytes.len() > 32 {
        return Err(BridgeError::AmountOverflow(format!(
            "nat of {} bytes exceeds 256 bits",
            bytes.len()
        )));
    }
    Ok(U256::from_big_endian(&bytes))
}

/// Convert a `U256` into a candid `Nat` (always succeeds).
pub fn u256_to_nat(value: U256) -> Nat {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    Nat(BigUint::from_bytes_be(&bytes))
}
