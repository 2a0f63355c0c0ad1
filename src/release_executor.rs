// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! The ICP→Base release pipeline.
//!
//! A timer polls the canister's pending-transfer list; each pending entry is
//! validated, balance-checked against the bridge contract's custodial
//! holdings, signed and submitted as a `releaseTokens` transaction under an
//! explicitly managed nonce. Completion is acknowledged back to the canister
//! best-effort — the canister's own `completed` flag remains the idempotency
//! backstop if the acknowledgement is lost.

use crate::error::{BridgeError, BridgeResult};
use crate::eth_client::{is_nonce_error, EthBridgeOps, ReleaseRequest};
use crate::icp_client::BridgeCanisterClient;
use crate::metrics::BridgeMetrics;
use crate::store::BridgeStore;
use crate::types::{nat_to_u256, rescale_amount, PendingTransfer, TokenMap};
use crate::crypto::ValidatorSigner;
use ethers::types::Address as EthAddress;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const RELEASE_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Locally tracked transaction nonce for the validator account.
///
/// Seeded once from the chain's transaction count, then incremented for
/// every submission attempt regardless of outcome (optimistic reservation).
/// Two concurrent reverse-pipeline cycles must never reuse a value, so the
/// counter state is read-modify-written under one lock.
#[derive(Default)]
pub struct NonceManager {
    next: Mutex<Option<u64>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next nonce, seeding from `fetch_count` on first use.
    pub async fn reserve<F, Fut>(&self, fetch_count: F) -> BridgeResult<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BridgeResult<u64>>,
    {
        let mut next = self.next.lock().await;
        let current = match *next {
            Some(n) => n,
            None => {
                let seeded = fetch_count().await?;
                info!("Nonce counter seeded from chain transaction count: {}", seeded);
                seeded
            }
        };
        *next = Some(current + 1);
        Ok(current)
    }

    /// Reset the counter after a detected conflict.
    pub async fn resync(&self, fresh_count: u64) {
        let mut next = self.next.lock().await;
        warn!(
            "Nonce counter resynced: {:?} -> {}",
            next.map(|n| n.to_string()),
            fresh_count
        );
        *next = Some(fresh_count);
    }

    /// The next value that would be handed out, if seeded.
    pub async fn current(&self) -> Option<u64> {
        *self.next.lock().await
    }
}

pub struct ReleaseExecutor<C, E> {
    canister: Arc<C>,
    eth: Arc<E>,
    store: Arc<BridgeStore>,
    token_map: Arc<TokenMap>,
    signer: Arc<ValidatorSigner>,
    nonce: Arc<NonceManager>,
    metrics: Arc<BridgeMetrics>,
}

impl<C, E> ReleaseExecutor<C, E>
where
    C: BridgeCanisterClient + 'static,
    E: EthBridgeOps + 'static,
{
    pub fn new(
        canister: Arc<C>,
        eth: Arc<E>,
        store: Arc<BridgeStore>,
        token_map: Arc<TokenMap>,
        signer: Arc<ValidatorSigner>,
        nonce: Arc<NonceManager>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            canister,
            eth,
            store,
            token_map,
            signer,
            nonce,
            metrics,
        }
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RELEASE_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                self.run_cycle().await;
            }
        })
    }

    /// One poll of the pending-transfer list. Failures are logged and left
    /// for the next cycle; there is no backoff beyond the fixed interval.
    pub async fn run_cycle(&self) {
        let pending = match self.canister.get_pending_transfers().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!("Listing pending transfers failed: {:?}", e);
                return;
            }
        };
        debug!("Found {} pending transfers", pending.len());

        for transfer in pending {
            if self.store.is_processed(&transfer.id).await {
                debug!("Transfer {} already processed, skipping", transfer.id);
                continue;
            }
            if transfer.completed {
                // Completed on the canister by another actor; record it so
                // future polls skip without a lookup.
                if let Err(e) = self.store.mark_processed(&transfer.id).await {
                    warn!("Recording completed transfer {} failed: {:?}", transfer.id, e);
                }
                continue;
            }
            if let Err(e) = self.release_one(&transfer).await {
                self.metrics
                    .err_reverse_relay
                    .with_label_values(&[e.error_type()])
                    .inc();
                if e.is_retryable() {
                    warn!(
                        "Release of {} failed ({}), will retry next poll: {:?}",
                        transfer.id,
                        e.error_type(),
                        e
                    );
                } else {
                    // Listed again every poll and skipped every time; an
                    // accepted, logged no-op rather than a silent drop.
                    warn!("Transfer {} is permanently unrelayable: {:?}", transfer.id, e);
                }
            }
        }

        if let Some(nonce) = self.nonce.current().await {
            self.metrics.current_nonce.set(nonce as i64);
        }
    }

    async fn release_one(&self, transfer: &PendingTransfer) -> BridgeResult<()> {
        let mapping = self
            .token_map
            .resolve_icp(&transfer.token)
            .cloned()
            .ok_or_else(|| BridgeError::UnmappedToken(transfer.token.to_string()))?;

        let recipient: EthAddress = transfer
            .recipient
            .parse()
            .map_err(|_| BridgeError::InvalidRecipient(transfer.recipient.clone()))?;

        let eth_decimals = self.eth.token_decimals(mapping.eth_token).await?;
        let icp_amount = nat_to_u256(&transfer.amount)?;
        let eth_amount = rescale_amount(icp_amount, mapping.icp_decimals, eth_decimals)?;

        // Custodial balance gate: skip (retryably) until the bridge holds
        // enough of the token to cover the release.
        let balance = self.eth.bridge_token_balance(mapping.eth_token).await?;
        if balance < eth_amount {
            return Err(BridgeError::InsufficientCustodialBalance {
                required: eth_amount.to_string(),
                available: balance.to_string(),
            });
        }

        let signature = self
            .signer
            .sign_release_payload(&transfer.id, recipient, eth_amount)
            .await?;
        let request = ReleaseRequest {
            token: mapping.eth_token,
            recipient,
            amount: eth_amount,
            transfer_id: transfer.id.clone(),
            signatures: vec![signature],
        };

        let nonce = self
            .nonce
            .reserve(|| async { self.eth.transaction_count().await })
            .await?;
        info!(
            "Releasing {} on Base: token {:?}, recipient {:?}, amount {} (icp amount {}), nonce {}",
            transfer.id, mapping.eth_token, recipient, eth_amount, icp_amount, nonce
        );

        match self.eth.submit_release(request, nonce).await {
            Ok(tx_hash) => {
                info!("Release of {} confirmed: {:?}", transfer.id, tx_hash);
            }
            Err(e) => {
                if matches!(e, BridgeError::NonceConflict(_))
                    || matches!(&e, BridgeError::TransientProviderError(m) if is_nonce_error(m))
                {
                    match self.eth.transaction_count().await {
                        Ok(fresh) => {
                            self.nonce.resync(fresh).await;
                            self.metrics.nonce_resyncs.inc();
                        }
                        Err(count_err) => {
                            warn!("Nonce resync query failed: {:?}", count_err);
                        }
                    }
                }
                return Err(e);
            }
        }

        // The relay itself is final once mined; record before the
        // acknowledgement so a lost ack cannot cause a re-release.
        self.store.mark_processed(&transfer.id).await?;
        self.metrics.reverse_relay_success.inc();
        self.metrics
            .processed_transfers_total
            .set(self.store.processed_count().await as i64);

        // Best-effort acknowledgement; the canister's completed flag is the
        // backstop for future polls if this fails.
        if let Err(e) = self.canister.mark_transfer_processed(&transfer.id).await {
            warn!(
                "Could not mark transfer {} processed on canister: {:?}",
                transfer.id, e
            );
        }
        Ok(())
    }
}
