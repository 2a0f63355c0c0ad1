// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! A mock implementation of the bridge canister client.

use crate::error::{BridgeError, BridgeResult};
use crate::icp_client::BridgeCanisterClient;
use crate::types::{LockReceipt, LockRequest, PendingTransfer, TransferStatus};
use async_trait::async_trait;
use candid::{Nat, Principal};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// One recorded `processBaseToICPTransfer` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCredit {
    pub tx_hash: String,
    pub token: Principal,
    pub recipient: Principal,
    pub amount: Nat,
    pub signature_count: usize,
}

// Mock client used in test environments.
#[derive(Clone, Default)]
pub struct MockCanisterClient {
    statuses: Arc<Mutex<HashMap<String, BridgeResult<Option<TransferStatus>>>>>,
    pending: Arc<Mutex<Vec<PendingTransfer>>>,
    credit_calls: Arc<Mutex<Vec<RecordedCredit>>>,
    credit_responses: Arc<Mutex<VecDeque<BridgeResult<()>>>>,
    wildcard_credit_response: Arc<Mutex<Option<BridgeResult<()>>>>,
    mark_processed_calls: Arc<Mutex<Vec<String>>>,
    mark_processed_response: Arc<Mutex<Option<BridgeResult<()>>>>,
    cycle_balance: Arc<Mutex<Nat>>,
    token_balances: Arc<Mutex<HashMap<(Principal, Principal), Nat>>>,
}

impl MockCanisterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_transfer_status(&self, id: &str, status: BridgeResult<Option<TransferStatus>>) {
        self.statuses.lock().unwrap().insert(id.to_string(), status);
    }

    pub fn set_pending_transfers(&self, transfers: Vec<PendingTransfer>) {
        *self.pending.lock().unwrap() = transfers;
    }

    pub fn push_credit_response(&self, response: BridgeResult<()>) {
        self.credit_responses.lock().unwrap().push_back(response);
    }

    /// Response used for credit calls when the queue is empty.
    pub fn set_wildcard_credit_response(&self, response: BridgeResult<()>) {
        *self.wildcard_credit_response.lock().unwrap() = Some(response);
    }

    pub fn set_mark_processed_response(&self, response: BridgeResult<()>) {
        *self.mark_processed_response.lock().unwrap() = Some(response);
    }

    pub fn set_token_balance(&self, token: Principal, owner: Principal, balance: Nat) {
        self.token_balances
            .lock()
            .unwrap()
            .insert((token, owner), balance);
    }

    pub fn credit_calls(&self) -> Vec<RecordedCredit> {
        self.credit_calls.lock().unwrap().clone()
    }

    pub fn mark_processed_calls(&self) -> Vec<String> {
        self.mark_processed_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeCanisterClient for MockCanisterClient {
    async fn lock_tokens(&self, _request: LockRequest) -> BridgeResult<LockReceipt> {
        Err(BridgeError::InternalError(
            "lock_tokens is not mocked".to_string(),
        ))
    }

    async fn get_transfer_status(&self, id: &str) -> BridgeResult<Option<TransferStatus>> {
        self.statuses
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or(Ok(None))
    }

    async fn process_base_to_icp_transfer(
        &self,
        tx_hash: &str,
        token: Principal,
        recipient: Principal,
        amount: Nat,
        signatures: Vec<Vec<u8>>,
    ) -> BridgeResult<()> {
        self.credit_calls.lock().unwrap().push(RecordedCredit {
            tx_hash: tx_hash.to_string(),
            token,
            recipient,
            amount,
            signature_count: signatures.len(),
        });
        if let Some(response) = self.credit_responses.lock().unwrap().pop_front() {
            return response;
        }
        self.wildcard_credit_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Ok(()))
    }

    async fn get_pending_transfers(&self) -> BridgeResult<Vec<PendingTransfer>> {
        Ok(self.pending.lock().unwrap().clone())
    }

    async fn mark_transfer_processed(&self, id: &str) -> BridgeResult<()> {
        self.mark_processed_calls
            .lock()
            .unwrap()
            .push(id.to_string());
        self.mark_processed_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Ok(()))
    }

    async fn get_cycle_balance(&self) -> BridgeResult<Nat> {
        Ok(self.cycle_balance.lock().unwrap().clone())
    }

    async fn get_token_balance(&self, token: Principal, owner: Principal) -> BridgeResult<Nat> {
        Ok(self
            .token_balances
            .lock()
            .unwrap()
            .get(&(token, owner))
            .cloned()
            .unwrap_or_else(|| Nat::from(0u64)))
    }
}
