// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::error::{BridgeError, BridgeResult};
use crate::eth_client::{EthBridgeOps, EthClient};
use crate::eth_syncer::ReprocessRange;
use crate::icp_client::BridgeCanisterClient;
use crate::orchestrator::TransferOrchestrator;
use crate::release_executor::NonceManager;
use crate::store::BridgeStore;
use crate::types::{bytes32_to_principal, TokenMap};
use async_trait::async_trait;
use axum::Json;
use ethers::providers::JsonRpcClient;
use ethers::types::TxHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Base-side connectivity and registration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseStatus {
    pub connected: bool,
    pub chain_id: String,
    pub current_block: String,
    pub address: String,
    pub bridge_address: String,
    pub is_validator: bool,
    pub required_signatures: String,
    pub last_processed_block: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcpStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /status` response. Numeric fields wider than JSON's safe integer
/// range are serialized as decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub base: BaseStatus,
    pub icp: IcpStatus,
    pub tokens: BTreeMap<String, TokenBalanceStatus>,
    pub processed_transfers_count: usize,
    pub current_nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedResponse {
    pub processed_count: usize,
    pub processed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStatusView {
    pub completed: bool,
    pub timestamp: String,
}

/// `GET /verify/:id` response: a best-effort diagnostic snapshot, not
/// authoritative state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icp_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icp_recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    pub status: Option<TransferStatusView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_balance: Option<String>,
    pub is_processed: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessRequest {
    pub from_block: u64,
    pub to_block: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessResponse {
    pub message: String,
    pub events_will_be_processed: bool,
}

#[async_trait]
pub trait BridgeRequestHandlerTrait {
    async fn handle_status(&self) -> BridgeResult<Json<StatusResponse>>;
    async fn handle_processed(&self) -> BridgeResult<Json<ProcessedResponse>>;
    async fn handle_verify(&self, id: String) -> BridgeResult<Json<VerifyResponse>>;
    async fn handle_reprocess(
        &self,
        request: ReprocessRequest,
    ) -> BridgeResult<Json<ReprocessResponse>>;
}

pub struct BridgeRequestHandler<P: JsonRpcClient, C> {
    eth_client: Arc<EthClient<P>>,
    canister: Arc<C>,
    orchestrator: Arc<TransferOrchestrator<C, EthClient<P>>>,
    store: Arc<BridgeStore>,
    token_map: Arc<TokenMap>,
    nonce: Arc<NonceManager>,
    reprocess_tx: mpsc::Sender<ReprocessRange>,
}

impl<P, C> BridgeRequestHandler<P, C>
where
    P: JsonRpcClient + 'static,
    C: BridgeCanisterClient + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        eth_client: Arc<EthClient<P>>,
        canister: Arc<C>,
        orchestrator: Arc<TransferOrchestrator<C, EthClient<P>>>,
        store: Arc<BridgeStore>,
        token_map: Arc<TokenMap>,
        nonce: Arc<NonceManager>,
        reprocess_tx: mpsc::Sender<ReprocessRange>,
    ) -> Self {
        Self {
            eth_client,
            canister,
            orchestrator,
            store,
            token_map,
            nonce,
            reprocess_tx,
        }
    }
}

#[async_trait]
impl<P, C> BridgeRequestHandlerTrait for BridgeRequestHandler<P, C>
where
    P: JsonRpcClient + 'static,
    C: BridgeCanisterClient + 'static,
{
    async fn handle_status(&self) -> BridgeResult<Json<StatusResponse>> {
        let chain_id = self.eth_client.get_chain_id().await?;
        let current_block = self.eth_client.latest_block().await?;
        let is_validator = self.eth_client.is_registered_validator().await?;
        let required_signatures = self.eth_client.required_signatures().await?;

        let icp = match self.canister.get_cycle_balance().await {
            Ok(balance) => IcpStatus {
                connected: true,
                cycle_balance: Some(balance.0.to_string()),
                error: None,
            },
            Err(e) => IcpStatus {
                connected: false,
                cycle_balance: None,
                error: Some(format!("{e:?}")),
            },
        };

        let mut tokens = BTreeMap::new();
        for mapping in self.token_map.iter() {
            let entry = match self.eth_client.bridge_token_balance(mapping.eth_token).await {
                Ok(balance) => TokenBalanceStatus {
                    bridge_balance: Some(balance.to_string()),
                    error: None,
                },
                Err(e) => TokenBalanceStatus {
                    bridge_balance: None,
                    error: Some(format!("{e:?}")),
                },
            };
            tokens.insert(mapping.icp_token.to_string(), entry);
        }

        let current_nonce = match self.nonce.current().await {
            Some(nonce) => nonce.to_string(),
            None => "Not initialized".to_string(),
        };

        Ok(Json(StatusResponse {
            base: BaseStatus {
                connected: true,
                chain_id: chain_id.to_string(),
                current_block: current_block.to_string(),
                address: format!("{:?}", self.eth_client.validator_address()),
                bridge_address: format!("{:?}", self.eth_client.bridge_address()),
                is_validator,
                required_signatures: required_signatures.to_string(),
                last_processed_block: self.store.checkpoint().await.to_string(),
            },
            icp,
            tokens,
            processed_transfers_count: self.store.processed_count().await,
            current_nonce,
        }))
    }

    async fn handle_processed(&self) -> BridgeResult<Json<ProcessedResponse>> {
        let processed = self.store.processed_snapshot().await;
        Ok(Json(ProcessedResponse {
            processed_count: processed.len(),
            processed,
        }))
    }

    async fn handle_verify(&self, id: String) -> BridgeResult<Json<VerifyResponse>> {
        let is_processed = self.store.is_processed(&id).await;
        // forced-fresh lookup: diagnostics must not read a stale cache entry
        let status = self
            .orchestrator
            .transfer_status(&id, true)
            .await
            .map(|s| TransferStatusView {
                completed: s.completed,
                timestamp: s.timestamp.to_string(),
            });

        let mut response = VerifyResponse {
            id: id.clone(),
            base_token: None,
            icp_token: None,
            recipient: None,
            icp_recipient: None,
            amount: None,
            status,
            current_balance: None,
            is_processed,
        };

        // Base-originated ids are lock transaction hashes; enrich those with
        // the on-chain event and the recipient's destination-side balance.
        if let Ok(tx_hash) = TxHash::from_str(&id) {
            let event = self.eth_client.get_lock_event_by_tx_hash(tx_hash).await?;
            response.base_token = Some(format!("{:?}", event.token));
            response.recipient = Some(format!("0x{}", hex::encode(event.recipient)));
            response.amount = Some(event.amount.to_string());

            let mapping = self
                .token_map
                .resolve_eth(&event.token)
                .ok_or_else(|| BridgeError::UnmappedToken(format!("{:?}", event.token)))?;
            response.icp_token = Some(mapping.icp_token.to_string());

            match bytes32_to_principal(&event.recipient) {
                Ok(principal) => {
                    response.icp_recipient = Some(principal.to_string());
                    match self
                        .canister
                        .get_token_balance(mapping.icp_token, principal)
                        .await
                    {
                        Ok(balance) => response.current_balance = Some(balance.0.to_string()),
                        Err(e) => warn!("Balance query for {} failed: {:?}", principal, e),
                    }
                }
                Err(e) => warn!("Recipient of {} is not a principal: {:?}", id, e),
            }
        }

        Ok(Json(response))
    }

    async fn handle_reprocess(
        &self,
        request: ReprocessRequest,
    ) -> BridgeResult<Json<ReprocessResponse>> {
        if request.from_block > request.to_block {
            return Err(BridgeError::Generic(format!(
                "fromBlock {} is past toBlock {}",
                request.from_block, request.to_block
            )));
        }
        self.reprocess_tx
            .send(ReprocessRange {
                from_block: request.from_block,
                to_block: request.to_block,
            })
            .await
            .map_err(|_| {
                BridgeError::InternalError("reprocess worker is not running".to_string())
            })?;
        Ok(Json(ReprocessResponse {
            message: format!(
                "Reprocessing of blocks {} to {} queued successfully",
                request.from_block, request.to_block
            ),
            events_will_be_processed: true,
        }))
    }
}
