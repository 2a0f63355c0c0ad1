// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Signature production for relay messages.
//!
//! Each submitted transfer carries an attestation from this single
//! validator: a packed-keccak digest of the transfer fields, signed as an
//! EIP-191 personal message so the destination contract can `ecrecover` it.
//! Threshold enforcement across validators, if any, happens on-chain and is
//! not this module's concern.

use crate::error::{BridgeError, BridgeResult};
use ethers::abi::Token;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address as EthAddress, U256};
use ethers::utils::keccak256;

pub struct ValidatorSigner {
    wallet: LocalWallet,
}

impl ValidatorSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    pub fn from_private_key_hex(key: &str) -> BridgeResult<Self> {
        let wallet: LocalWallet = key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| BridgeError::SigningError(format!("invalid validator key: {e}")))?;
        Ok(Self { wallet })
    }

    /// EVM address of the signing key; must be registered in the bridge
    /// contract's validator set for signatures to be accepted.
    pub fn address(&self) -> EthAddress {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }

    /// Attest a Base→ICP transfer.
    ///
    /// Binds `(token, amount, recipient-as-32-bytes, timestamp)`; the
    /// timestamp is wall clock at signing time and serves only as replay
    /// entropy, never as ordering authority.
    pub async fn sign_lock_attestation(
        &self,
        token: EthAddress,
        amount: U256,
        recipient: [u8; 32],
        timestamp_ms: u64,
    ) -> BridgeResult<Vec<u8>> {
        let packed = ethers::abi::encode_packed(&[
            Token::Address(token),
            Token::Uint(amount),
            Token::FixedBytes(recipient.to_vec()),
            Token::Uint(U256::from(timestamp_ms)),
        ])
        .map_err(|e| BridgeError::SerializationError(format!("{e}")))?;
        self.sign_digest(keccak256(packed)).await
    }

    /// Sign the deterministic release payload for an ICP→Base transfer:
    /// `(transferId, recipient, amount)`.
    pub async fn sign_release_payload(
        &self,
        transfer_id: &str,
        recipient: EthAddress,
        amount: U256,
    ) -> BridgeResult<Vec<u8>> {
        let packed = ethers::abi::encode_packed(&[
            Token::String(transfer_id.to_string()),
            Token::Address(recipient),
            Token::Uint(amount),
        ])
        .map_err(|e| BridgeError::SerializationError(format!("{e}")))?;
        self.sign_digest(keccak256(packed)).await
    }

    // Sign the 32-byte digest as an EIP-191 personal message, yielding the
    // 65-byte r||s||v form the contract's recovery expects.
    async fn sign_digest(&self, digest: [u8; 32]) -> BridgeResult<Vec<u8>> {
        let signature = self
            .wallet
            .sign_message(digest)
            .await
            .map_err(|e| BridgeError::SigningError(format!("{e}")))?;
        Ok(signature.to_vec())
    }
}
