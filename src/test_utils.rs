// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for pipeline tests: canned lock events, an in-memory
//! fake of the EVM-side ledger operations, and pre-wired orchestrator /
//! executor instances over isolated temp stores.

use crate::abi::TokensLockedFilter;
use crate::crypto::ValidatorSigner;
use crate::error::BridgeResult;
use crate::eth_client::{EthBridgeOps, ReleaseRequest};
use crate::events::EthLockEvent;
use crate::metrics::BridgeMetrics;
use crate::mock_canister_client::MockCanisterClient;
use crate::orchestrator::TransferOrchestrator;
use crate::release_executor::{NonceManager, ReleaseExecutor};
use crate::store::BridgeStore;
use crate::ttl_cache::StatusCache;
use crate::types::{principal_to_bytes32, PendingTransfer, TokenMap, TokenMapping};
use candid::{Nat, Principal};
use ethers::contract::EthEvent;
use ethers::types::{Address as EthAddress, Log, TxHash, H256, U256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub type TestOrchestrator = Arc<TransferOrchestrator<MockCanisterClient, FakeEthOps>>;
pub type TestReleaseExecutor = Arc<ReleaseExecutor<MockCanisterClient, FakeEthOps>>;

// anvil's first well-known dev key
pub const TEST_VALIDATOR_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// The fixed (principal, eth address) pair wired into test token maps.
pub fn test_token_pair() -> (Principal, EthAddress) {
    (
        test_recipient_principal(),
        "0x0038e47E67bf538E62C95387Bf80B3f1CF14340f".parse().unwrap(),
    )
}

pub fn test_recipient_principal() -> Principal {
    Principal::self_authenticating(b"chain-fusion-bridge-test-key")
}

/// Build a raw provider log carrying a `TokensLocked` event.
pub fn lock_event_log(
    token: EthAddress,
    amount: U256,
    recipient: [u8; 32],
    tx_hash: TxHash,
    block_number: u64,
) -> Log {
    let data = ethers::abi::encode(&[
        ethers::abi::Token::Uint(amount),
        ethers::abi::Token::FixedBytes(recipient.to_vec()),
    ]);
    Log {
        address: EthAddress::repeat_byte(0xbb),
        topics: vec![TokensLockedFilter::signature(), H256::from(token)],
        data: data.into(),
        block_number: Some(block_number.into()),
        transaction_hash: Some(tx_hash),
        ..Default::default()
    }
}

/// A decoded lock event addressed to the test principal.
pub fn test_lock_event(token: EthAddress, amount: U256, block_number: u64) -> EthLockEvent {
    EthLockEvent {
        tx_hash: TxHash::random(),
        block_number,
        token,
        amount,
        recipient: principal_to_bytes32(&test_recipient_principal()),
    }
}

pub fn pending_transfer(id: &str, amount: Nat, recipient: &str) -> PendingTransfer {
    PendingTransfer {
        id: id.to_string(),
        token: test_recipient_principal(),
        amount,
        sender: Principal::anonymous(),
        recipient: recipient.to_string(),
        timestamp: 1_700_000_000,
        completed: false,
        signature: None,
    }
}

fn test_token_map() -> Arc<TokenMap> {
    let (icp_token, eth_token) = test_token_pair();
    Arc::new(TokenMap::new(vec![TokenMapping {
        icp_token,
        eth_token,
        icp_decimals: 0,
    }]))
}

fn test_signer() -> Arc<ValidatorSigner> {
    Arc::new(ValidatorSigner::from_private_key_hex(TEST_VALIDATOR_KEY).unwrap())
}

/// An isolated store over a temp dir that lives for the whole test process.
pub async fn test_store() -> Arc<BridgeStore> {
    let dir = tempfile::tempdir().unwrap();
    let store = BridgeStore::load(
        dir.path().join("last_processed_block.txt"),
        dir.path().join("processed_transfers.json"),
        0,
    )
    .await
    .unwrap();
    // keep the temp dir alive for the remainder of the test run
    std::mem::forget(dir);
    Arc::new(store)
}

pub async fn test_orchestrator(
    canister: Arc<MockCanisterClient>,
    eth: Arc<FakeEthOps>,
) -> TestOrchestrator {
    Arc::new(TransferOrchestrator::new(
        test_store().await,
        canister,
        eth,
        test_token_map(),
        Arc::new(StatusCache::with_default_ttl()),
        test_signer(),
        Arc::new(BridgeMetrics::new_for_testing()),
    ))
}

pub async fn test_release_executor(
    canister: Arc<MockCanisterClient>,
    eth: Arc<FakeEthOps>,
) -> TestReleaseExecutor {
    Arc::new(ReleaseExecutor::new(
        canister,
        eth,
        test_store().await,
        test_token_map(),
        test_signer(),
        Arc::new(NonceManager::new()),
        Arc::new(BridgeMetrics::new_for_testing()),
    ))
}

/// In-memory stand-in for the EVM ledger operations used by the pipelines.
#[derive(Default)]
pub struct FakeEthOps {
    decimals: Mutex<HashMap<EthAddress, u8>>,
    balances: Mutex<HashMap<EthAddress, U256>>,
    transaction_count: Mutex<u64>,
    submissions: Mutex<Vec<(ReleaseRequest, u64)>>,
    submit_responses: Mutex<VecDeque<BridgeResult<TxHash>>>,
}

impl FakeEthOps {
    pub fn set_decimals(&self, token: EthAddress, decimals: u8) {
        self.decimals.lock().unwrap().insert(token, decimals);
    }

    pub fn set_balance(&self, token: EthAddress, balance: U256) {
        self.balances.lock().unwrap().insert(token, balance);
    }

    pub fn set_transaction_count(&self, count: u64) {
        *self.transaction_count.lock().unwrap() = count;
    }

    pub fn push_submit_response(&self, response: BridgeResult<TxHash>) {
        self.submit_responses.lock().unwrap().push_back(response);
    }

    pub fn submissions(&self) -> Vec<(ReleaseRequest, u64)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EthBridgeOps for FakeEthOps {
    async fn token_decimals(&self, token: EthAddress) -> BridgeResult<u8> {
        Ok(self
            .decimals
            .lock()
            .unwrap()
            .get(&token)
            .copied()
            .unwrap_or(18))
    }

    async fn bridge_token_balance(&self, token: EthAddress) -> BridgeResult<U256> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&token)
            .copied()
            .unwrap_or_default())
    }

    async fn transaction_count(&self) -> BridgeResult<u64> {
        Ok(*self.transaction_count.lock().unwrap())
    }

    async fn submit_release(&self, release: ReleaseRequest, nonce: u64) -> BridgeResult<TxHash> {
        self.submissions.lock().unwrap().push((release, nonce));
        if let Some(response) = self.submit_responses.lock().unwrap().pop_front() {
            return response;
        }
        Ok(TxHash::random())
    }
}
