// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sanitized form of the `TokensLocked` event emitted by the EVM bridge
//! contract. Raw logs are decoded here so every downstream driver (backfill,
//! live watch, periodic re-scan, manual reprocess) works with one type.

use crate::abi::TokensLockedFilter;
use crate::error::{BridgeError, BridgeResult};
use ethers::contract::EthLogDecode;
use ethers::types::{Address as EthAddress, Log, TxHash, U256};

/// A lock of funds observed on the EVM side, keyed by the lock transaction
/// hash. The hash is the transfer's identity for deduplication: stable
/// across retries and across all delivery paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthLockEvent {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub token: EthAddress,
    pub amount: U256,
    pub recipient: [u8; 32],
}

impl EthLockEvent {
    /// Transfer id as used in the dedup set and canister calls.
    pub fn transfer_id(&self) -> String {
        format!("{:?}", self.tx_hash)
    }

    /// Decode a raw provider log into a lock event.
    ///
    /// The caller is responsible for having filtered on the bridge contract
    /// address; logs without a block number or transaction hash are provider
    /// bugs and rejected.
    pub fn try_from_log(log: Log) -> BridgeResult<Self> {
        let block_number = log
            .block_number
            .ok_or_else(|| {
                BridgeError::ProviderError("provider returned log without block_number".into())
            })?
            .as_u64();
        let tx_hash = log.transaction_hash.ok_or_else(|| {
            BridgeError::ProviderError("provider returned log without transaction_hash".into())
        })?;
        let raw = ethers::abi::RawLog {
            topics: log.topics,
            data: log.data.to_vec(),
        };
        let decoded =
            TokensLockedFilter::decode_log(&raw).map_err(|_| BridgeError::NotALockEvent)?;
        Ok(Self {
            tx_hash,
            block_number,
            token: decoded.token,
            amount: decoded.amount,
            recipient: decoded.recipient,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::lock_event_log;

    #[test]
    fn test_decode_lock_event_log() {
        let token: EthAddress = "0x0038e47E67bf538E62C95387Bf80B3f1CF14340f"
            .parse()
            .unwrap();
        let tx_hash = TxHash::from_low_u64_be(0xabc);
        let mut recipient = [0u8; 32];
        recipient[..4].copy_from_slice(&[1, 2, 3, 4]);

        let log = lock_event_log(token, U256::exp10(18), recipient, tx_hash, 42);
        let event = EthLockEvent::try_from_log(log).unwrap();

        assert_eq!(event.tx_hash, tx_hash);
        assert_eq!(event.block_number, 42);
        assert_eq!(event.token, token);
        assert_eq!(event.amount, U256::exp10(18));
        assert_eq!(event.recipient, recipient);
    }

    #[test]
    fn test_decode_rejects_foreign_log() {
        // a log with an unrelated topic0 is not a lock event
        let mut log = lock_event_log(
            EthAddress::zero(),
            U256::one(),
            [0u8; 32],
            TxHash::zero(),
            1,
        );
        log.topics[0] = ethers::types::H256::random();
        assert_eq!(
            EthLockEvent::try_from_log(log).unwrap_err(),
            BridgeError::NotALockEvent
        );
    }

    #[test]
    fn test_decode_rejects_pending_log() {
        // logs from pending transactions carry no block number
        let mut log = lock_event_log(
            EthAddress::zero(),
            U256::one(),
            [0u8; 32],
            TxHash::zero(),
            1,
        );
        log.block_number = None;
        assert!(matches!(
            EthLockEvent::try_from_log(log).unwrap_err(),
            BridgeError::ProviderError(_)
        ));
    }

    #[test]
    fn test_transfer_id_is_0x_hex() {
        let log = lock_event_log(
            EthAddress::zero(),
            U256::one(),
            [0u8; 32],
            TxHash::from_low_u64_be(0xabc),
            1,
        );
        let event = EthLockEvent::try_from_log(log).unwrap();
        let id = event.transfer_id();
        assert!(id.starts_with("0x"));
        assert_eq!(id.len(), 66);
    }
}
