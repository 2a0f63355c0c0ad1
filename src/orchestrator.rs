// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! The lock-event handler and Base→ICP relay pipeline.
//!
//! Every delivery path (historical backfill, live watch, periodic re-scan,
//! manual reprocess) funnels into [`TransferOrchestrator::handle_lock_event`];
//! there is exactly one implementation of the relay sequence. Redundant
//! delivery is expected and safe: the dedup set, the destination-status
//! gate and a per-id in-flight marker together guarantee at most one credit
//! submission per lock transaction.

use crate::error::{BridgeError, BridgeResult};
use crate::eth_client::EthBridgeOps;
use crate::events::EthLockEvent;
use crate::icp_client::BridgeCanisterClient;
use crate::metrics::BridgeMetrics;
use crate::store::BridgeStore;
use crate::ttl_cache::StatusCache;
use crate::types::{bytes32_to_principal, rescale_amount, u256_to_nat, TokenMap, TransferStatus};
use crate::crypto::ValidatorSigner;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct TransferOrchestrator<C, E> {
    store: Arc<BridgeStore>,
    canister: Arc<C>,
    eth: Arc<E>,
    token_map: Arc<TokenMap>,
    status_cache: Arc<StatusCache>,
    signer: Arc<ValidatorSigner>,
    // Ids with a relay currently in progress. Guards the window between the
    // dedup check and the dedup write when two drivers deliver the same
    // event concurrently.
    in_flight: Mutex<HashSet<String>>,
    metrics: Arc<BridgeMetrics>,
}

impl<C, E> TransferOrchestrator<C, E>
where
    C: BridgeCanisterClient,
    E: EthBridgeOps,
{
    pub fn new(
        store: Arc<BridgeStore>,
        canister: Arc<C>,
        eth: Arc<E>,
        token_map: Arc<TokenMap>,
        status_cache: Arc<StatusCache>,
        signer: Arc<ValidatorSigner>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            store,
            canister,
            eth,
            token_map,
            status_cache,
            signer,
            in_flight: Mutex::new(HashSet::new()),
            metrics,
        }
    }

    /// Handle one observed lock event. Idempotent under redundant delivery.
    pub async fn handle_lock_event(&self, event: &EthLockEvent) -> BridgeResult<()> {
        let id = event.transfer_id();

        if self.store.is_processed(&id).await {
            debug!("Transfer {} already relayed, skipping", id);
            self.metrics.already_processed_skips.inc();
            return Ok(());
        }

        if !self.begin(&id).await {
            debug!("Transfer {} already in flight, skipping duplicate delivery", id);
            return Ok(());
        }
        let result = self.process_locked(&id, event).await;
        self.finish(&id).await;

        match &result {
            Ok(()) => {}
            Err(e) if e.is_retryable() => {
                warn!(
                    "Transfer {} not relayed ({}), eligible for retry on next cycle: {:?}",
                    id,
                    e.error_type(),
                    e
                );
                self.metrics
                    .err_forward_relay
                    .with_label_values(&[e.error_type()])
                    .inc();
            }
            Err(e) => {
                warn!("Transfer {} is permanently unrelayable: {:?}", id, e);
                self.metrics
                    .err_forward_relay
                    .with_label_values(&[e.error_type()])
                    .inc();
            }
        }
        result
    }

    // Runs with the in-flight marker held for `id`.
    async fn process_locked(&self, id: &str, event: &EthLockEvent) -> BridgeResult<()> {
        // Re-check under the marker: another driver may have completed the
        // relay between our dedup check and marker acquisition.
        if self.store.is_processed(id).await {
            return Ok(());
        }

        // Idempotency gate: the destination's own view of the transfer is
        // authoritative. A completed transfer was relayed by a prior run or
        // another actor; a failed or unknown lookup is NOT evidence of
        // completion and we proceed.
        if let Some(status) = self.transfer_status(id, false).await {
            if status.completed {
                info!(
                    "Transfer {} already completed on destination, recording without relay",
                    id
                );
                self.store.mark_processed(id).await?;
                return Ok(());
            }
        }

        let mapping = self
            .token_map
            .resolve_eth(&event.token)
            .cloned()
            .ok_or_else(|| BridgeError::UnmappedToken(format!("{:?}", event.token)))?;

        let eth_decimals = self.eth.token_decimals(event.token).await?;
        let icp_amount = rescale_amount(event.amount, eth_decimals, mapping.icp_decimals)?;
        let recipient = bytes32_to_principal(&event.recipient)?;

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let signature = self
            .signer
            .sign_lock_attestation(event.token, event.amount, event.recipient, timestamp_ms)
            .await?;

        info!(
            "Relaying transfer {}: token {:?} -> {}, amount {} -> {}, recipient {}",
            id, event.token, mapping.icp_token, event.amount, icp_amount, recipient
        );
        self.canister
            .process_base_to_icp_transfer(
                id,
                mapping.icp_token,
                recipient,
                u256_to_nat(icp_amount),
                vec![signature],
            )
            .await?;

        // Added only after the destination confirmed the credit. A crash
        // before this point re-delivers the event; the status gate above
        // keeps re-delivery from double-crediting.
        self.store.mark_processed(id).await?;
        self.metrics.forward_relay_success.inc();
        self.metrics
            .processed_transfers_total
            .set(self.store.processed_count().await as i64);
        info!("Transfer {} relayed to ICP", id);
        Ok(())
    }

    /// Destination-side transfer status, cached for [`crate::ttl_cache::STATUS_CACHE_TTL`].
    ///
    /// `force_refresh` bypasses the cache (used by the verification
    /// surface). Returns `None` on unknown id *and* on query failure —
    /// a miss is never a negative result.
    pub async fn transfer_status(&self, id: &str, force_refresh: bool) -> Option<TransferStatus> {
        if !force_refresh {
            if let Some(status) = self.status_cache.get_if_fresh(id).await {
                return Some(status);
            }
        }
        match self.canister.get_transfer_status(id).await {
            Ok(Some(status)) => {
                self.status_cache.insert(id, status.clone()).await;
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Status query for {} failed: {:?}", id, e);
                None
            }
        }
    }

    async fn begin(&self, id: &str) -> bool {
        self.in_flight.lock().await.insert(id.to_string())
    }

    async fn finish(&self, id: &str) {
        self.in_flight.lock().await.remove(id);
    }
}
