// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Client for the ICP bridge canister.
//!
//! The canister interface is narrow (seven entry points), so the client is a
//! trait with one production implementation over `ic_agent::Agent` and a
//! mock used by pipeline tests. Candid encoding/decoding happens here;
//! callers only see domain types.

use crate::error::{BridgeError, BridgeResult};
use crate::types::{CanisterAck, LockReceipt, LockRequest, PendingTransfer, TransferStatus};
use async_trait::async_trait;
use candid::{Decode, Encode, Nat, Principal};
use ic_agent::identity::{AnonymousIdentity, BasicIdentity, Secp256k1Identity};
use ic_agent::{Agent, AgentError};
use tracing::{info, warn};

/// Operations the relay needs from the bridge canister.
#[async_trait]
pub trait BridgeCanisterClient: Send + Sync {
    async fn lock_tokens(&self, request: LockRequest) -> BridgeResult<LockReceipt>;

    /// Destination-side status of a transfer. `Ok(None)` means the canister
    /// does not know the id — which is *not* evidence of completion.
    async fn get_transfer_status(&self, id: &str) -> BridgeResult<Option<TransferStatus>>;

    async fn process_base_to_icp_transfer(
        &self,
        tx_hash: &str,
        token: Principal,
        recipient: Principal,
        amount: Nat,
        signatures: Vec<Vec<u8>>,
    ) -> BridgeResult<()>;

    async fn get_pending_transfers(&self) -> BridgeResult<Vec<PendingTransfer>>;

    async fn mark_transfer_processed(&self, id: &str) -> BridgeResult<()>;

    async fn get_cycle_balance(&self) -> BridgeResult<Nat>;

    async fn get_token_balance(&self, token: Principal, owner: Principal) -> BridgeResult<Nat>;
}

pub struct IcpBridgeClient {
    agent: Agent,
    canister_id: Principal,
}

impl IcpBridgeClient {
    /// Connect to the bridge canister.
    ///
    /// Identity material is a PEM string (Secp256k1 or Ed25519). Without
    /// one the agent runs anonymously, which the canister will reject for
    /// mutations — useful only for read-side tooling, hence the warning.
    /// A PEM that fails to parse is a startup-fatal error.
    pub async fn connect(
        host: &str,
        canister_id: &str,
        identity_pem: Option<&str>,
    ) -> anyhow::Result<Self> {
        let canister_id = Principal::from_text(canister_id)?;
        let builder = Agent::builder().with_url(host);
        let agent = match identity_pem {
            Some(pem) => match Secp256k1Identity::from_pem(pem.as_bytes()) {
                Ok(identity) => builder.with_identity(identity).build()?,
                Err(_) => {
                    let identity = BasicIdentity::from_pem(pem.as_bytes()).map_err(|e| {
                        anyhow::anyhow!("identity PEM is neither Secp256k1 nor Ed25519: {e}")
                    })?;
                    builder.with_identity(identity).build()?
                }
            },
            None => {
                warn!("No ICP identity configured, using the anonymous identity");
                builder.with_identity(AnonymousIdentity).build()?
            }
        };

        // The IC mainnet root key ships with the agent; anything else
        // (local replica, testnets) must be fetched.
        if !is_mainnet_host(host) {
            agent.fetch_root_key().await?;
        }

        info!(
            "IcpBridgeClient connected: host={}, canister={}",
            host, canister_id
        );
        Ok(Self { agent, canister_id })
    }

    pub fn canister_id(&self) -> Principal {
        self.canister_id
    }

    async fn query(&self, method: &str, arg: Vec<u8>) -> Result<Vec<u8>, AgentError> {
        self.agent
            .query(&self.canister_id, method)
            .with_arg(arg)
            .call()
            .await
    }

    async fn update(&self, method: &str, arg: Vec<u8>) -> Result<Vec<u8>, AgentError> {
        self.agent
            .update(&self.canister_id, method)
            .with_arg(arg)
            .call_and_wait()
            .await
    }
}

fn is_mainnet_host(host: &str) -> bool {
    host.starts_with("https://ic0.app") || host.starts_with("https://icp0.io")
}

// Canister rejects carry an application-level message; everything else on
// the agent path is transport and therefore transient.
fn map_agent_error(method: &str, e: AgentError) -> BridgeError {
    match e {
        AgentError::CertifiedReject(reject) | AgentError::UncertifiedReject(reject) => {
            BridgeError::CanisterRejection(format!("{method}: {}", reject.reject_message))
        }
        other => BridgeError::TransientCanisterError(format!("{method}: {other}")),
    }
}

fn encode_error(e: candid::Error) -> BridgeError {
    BridgeError::SerializationError(format!("candid encode: {e}"))
}

fn decode_error(method: &str, e: candid::Error) -> BridgeError {
    BridgeError::SerializationError(format!("candid decode for {method}: {e}"))
}

#[async_trait]
impl BridgeCanisterClient for IcpBridgeClient {
    async fn lock_tokens(&self, request: LockRequest) -> BridgeResult<LockReceipt> {
        let arg = Encode!(&request).map_err(encode_error)?;
        let raw = self
            .update("lockTokens", arg)
            .await
            .map_err(|e| map_agent_error("lockTokens", e))?;
        Decode!(&raw, LockReceipt).map_err(|e| decode_error("lockTokens", e))
    }

    async fn get_transfer_status(&self, id: &str) -> BridgeResult<Option<TransferStatus>> {
        let arg = Encode!(&id).map_err(encode_error)?;
        match self.query("getTransferStatus", arg).await {
            Ok(raw) => Decode!(&raw, TransferStatus)
                .map(Some)
                .map_err(|e| decode_error("getTransferStatus", e)),
            // The canister rejects lookups for ids it has never seen; that
            // is "unknown", not "failed" and not "completed=false".
            Err(AgentError::CertifiedReject(_)) | Err(AgentError::UncertifiedReject(_)) => {
                Ok(None)
            }
            Err(other) => Err(BridgeError::TransientCanisterError(format!(
                "getTransferStatus: {other}"
            ))),
        }
    }

    async fn process_base_to_icp_transfer(
        &self,
        tx_hash: &str,
        token: Principal,
        recipient: Principal,
        amount: Nat,
        signatures: Vec<Vec<u8>>,
    ) -> BridgeResult<()> {
        let arg =
            Encode!(&tx_hash, &token, &recipient, &amount, &signatures).map_err(encode_error)?;
        let raw = self
            .update("processBaseToICPTransfer", arg)
            .await
            .map_err(|e| map_agent_error("processBaseToICPTransfer", e))?;
        Decode!(&raw, CanisterAck)
            .map_err(|e| decode_error("processBaseToICPTransfer", e))?
            .into_result()
    }

    async fn get_pending_transfers(&self) -> BridgeResult<Vec<PendingTransfer>> {
        let arg = Encode!().map_err(encode_error)?;
        let raw = self
            .query("getPendingTransfers", arg)
            .await
            .map_err(|e| map_agent_error("getPendingTransfers", e))?;
        Decode!(&raw, Vec<PendingTransfer>).map_err(|e| decode_error("getPendingTransfers", e))
    }

    async fn mark_transfer_processed(&self, id: &str) -> BridgeResult<()> {
        let arg = Encode!(&id).map_err(encode_error)?;
        let raw = self
            .update("markTransferProcessed", arg)
            .await
            .map_err(|e| map_agent_error("markTransferProcessed", e))?;
        Decode!(&raw, CanisterAck)
            .map_err(|e| decode_error("markTransferProcessed", e))?
            .into_result()
    }

    async fn get_cycle_balance(&self) -> BridgeResult<Nat> {
        let arg = Encode!().map_err(encode_error)?;
        let raw = self
            .query("getCycleBalance", arg)
            .await
            .map_err(|e| map_agent_error("getCycleBalance", e))?;
        Decode!(&raw, Nat).map_err(|e| decode_error("getCycleBalance", e))
    }

    async fn get_token_balance(&self, token: Principal, owner: Principal) -> BridgeResult<Nat> {
        let arg = Encode!(&token, &owner).map_err(encode_error)?;
        let raw = self
            .update("getTokenBalance", arg)
            .await
            .map_err(|e| map_agent_error("getTokenBalance", e))?;
        Decode!(&raw, Nat).map_err(|e| decode_error("getTokenBalance", e))
    }
}
