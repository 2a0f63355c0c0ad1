// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! A mock request handler for router tests.

use crate::error::{BridgeError, BridgeResult};
use crate::server::handler::{
    BaseStatus, BridgeRequestHandlerTrait, IcpStatus, ProcessedResponse, ReprocessRequest,
    ReprocessResponse, StatusResponse, VerifyResponse,
};
use async_trait::async_trait;
use axum::Json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockBridgeRequestHandler {
    processed: Arc<Mutex<Vec<String>>>,
    verify_error: Arc<Mutex<Option<BridgeError>>>,
    reprocess_requests: Arc<Mutex<Vec<(u64, u64)>>>,
}

impl MockBridgeRequestHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_processed(&self, ids: Vec<String>) {
        *self.processed.lock().unwrap() = ids;
    }

    pub fn set_verify_error(&self, error: BridgeError) {
        *self.verify_error.lock().unwrap() = Some(error);
    }

    pub fn reprocess_requests(&self) -> Vec<(u64, u64)> {
        self.reprocess_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeRequestHandlerTrait for MockBridgeRequestHandler {
    async fn handle_status(&self) -> BridgeResult<Json<StatusResponse>> {
        Ok(Json(StatusResponse {
            base: BaseStatus {
                connected: true,
                chain_id: "84532".to_string(),
                current_block: "1000".to_string(),
                address: "0x0000000000000000000000000000000000000001".to_string(),
                bridge_address: "0x0000000000000000000000000000000000000002".to_string(),
                is_validator: true,
                required_signatures: "1".to_string(),
                last_processed_block: "990".to_string(),
            },
            icp: IcpStatus {
                connected: true,
                cycle_balance: Some("1000000".to_string()),
                error: None,
            },
            tokens: BTreeMap::new(),
            processed_transfers_count: self.processed.lock().unwrap().len(),
            current_nonce: "7".to_string(),
        }))
    }

    async fn handle_processed(&self) -> BridgeResult<Json<ProcessedResponse>> {
        let processed = self.processed.lock().unwrap().clone();
        Ok(Json(ProcessedResponse {
            processed_count: processed.len(),
            processed,
        }))
    }

    async fn handle_verify(&self, id: String) -> BridgeResult<Json<VerifyResponse>> {
        if let Some(error) = self.verify_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(Json(VerifyResponse {
            id,
            base_token: None,
            icp_token: None,
            recipient: None,
            icp_recipient: None,
            amount: None,
            status: None,
            current_balance: None,
            is_processed: false,
        }))
    }

    async fn handle_reprocess(
        &self,
        request: ReprocessRequest,
    ) -> BridgeResult<Json<ReprocessResponse>> {
        self.reprocess_requests
            .lock()
            .unwrap()
            .push((request.from_block, request.to_block));
        Ok(Json(ReprocessResponse {
            message: "queued".to_string(),
            events_will_be_processed: true,
        }))
    }
}
