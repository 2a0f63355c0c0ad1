// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Lock-event ingestion from the EVM side.
//!
//! Three drivers feed the one orchestrator handler:
//! - a historical backfill over `[checkpoint, head]` in fixed-size chunks,
//! - a standing log-filter watch for live events,
//! - a periodic re-scan of `[checkpoint, head]` as a safety net against
//!   missed live deliveries.
//!
//! Redundant delivery across drivers is expected; the orchestrator's dedup
//! guard makes it safe (at the cost of one status query per re-seen event).
//! Operator-requested reprocessing runs through the same backfill pass —
//! never a separate code path.

use crate::error::BridgeResult;
use crate::eth_client::{EthBridgeOps, EthClient};
use crate::events::EthLockEvent;
use crate::icp_client::BridgeCanisterClient;
use crate::metrics::BridgeMetrics;
use crate::orchestrator::TransferOrchestrator;
use crate::store::BridgeStore;
use ethers::providers::JsonRpcClient;
use ethers::types::Log;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Providers reject overly wide `eth_getLogs` ranges; scans are chunked.
pub const BACKFILL_CHUNK_SIZE: u64 = 5_000;
pub const RESCAN_INTERVAL: Duration = Duration::from_secs(30);
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// An operator-supplied block range for manual reprocessing.
#[derive(Debug, Clone, Copy)]
pub struct ReprocessRange {
    pub from_block: u64,
    pub to_block: u64,
}

pub struct EthSyncer<P: JsonRpcClient, C, E> {
    eth_client: Arc<EthClient<P>>,
    orchestrator: Arc<TransferOrchestrator<C, E>>,
    store: Arc<BridgeStore>,
    metrics: Arc<BridgeMetrics>,
}

impl<P, C, E> EthSyncer<P, C, E>
where
    P: JsonRpcClient + 'static,
    C: BridgeCanisterClient + 'static,
    E: EthBridgeOps + 'static,
{
    pub fn new(
        eth_client: Arc<EthClient<P>>,
        orchestrator: Arc<TransferOrchestrator<C, E>>,
        store: Arc<BridgeStore>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            eth_client,
            orchestrator,
            store,
            metrics,
        }
    }

    /// Run the initial backfill, then spawn the live watch, the periodic
    /// re-scan and the reprocess listener.
    pub async fn run(
        self: Arc<Self>,
        mut reprocess_rx: mpsc::Receiver<ReprocessRange>,
    ) -> BridgeResult<Vec<JoinHandle<()>>> {
        let head = self.eth_client.latest_block().await?;
        let checkpoint = self.store.checkpoint().await;
        if head > checkpoint {
            info!(
                "Processing historical events from block {} to {}",
                checkpoint, head
            );
            self.backfill_pass(checkpoint, head).await;
        }

        let mut handles = Vec::new();

        let live = self.clone();
        handles.push(tokio::spawn(async move {
            loop {
                match live.eth_client.watch_lock_events().await {
                    Ok(mut stream) => {
                        info!("Live lock-event watch established");
                        while let Some(log) = stream.next().await {
                            live.deliver_live_log(log).await;
                        }
                        warn!("Live lock-event watch ended, re-establishing");
                    }
                    Err(e) => {
                        warn!("Establishing lock-event watch failed: {:?}", e);
                    }
                }
                tokio::time::sleep(WATCH_RETRY_DELAY).await;
            }
        }));

        let rescan = self.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RESCAN_INTERVAL);
            // the first tick fires immediately and would repeat the initial
            // backfill back to back
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let checkpoint = rescan.store.checkpoint().await;
                match rescan.eth_client.latest_block().await {
                    Ok(head) if head > checkpoint => {
                        rescan.backfill_pass(checkpoint, head).await;
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Periodic re-scan head query failed: {:?}", e),
                }
            }
        }));

        let reprocess = self.clone();
        handles.push(tokio::spawn(async move {
            while let Some(range) = reprocess_rx.recv().await {
                info!(
                    "Manual reprocessing of blocks {} to {}",
                    range.from_block, range.to_block
                );
                reprocess
                    .backfill_pass(range.from_block, range.to_block)
                    .await;
            }
        }));

        Ok(handles)
    }

    /// Scan `[from, to]` in chunks and hand every decoded lock event to the
    /// orchestrator. Failed chunk queries are logged and skipped within the
    /// pass (the periodic re-scan will not revisit skipped chunks —
    /// operators recover them with `/reprocess`). The checkpoint advances
    /// once the range has been consumed, but never past an event whose
    /// relay failed retryably: holding it back keeps the next re-scan
    /// re-delivering that event instead of silently losing it.
    pub async fn backfill_pass(&self, from: u64, to: u64) {
        let mut advance_to = to;
        for (start, end) in chunk_ranges(from, to, BACKFILL_CHUNK_SIZE) {
            let events = match self.eth_client.get_lock_events_in_range(start, end).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(
                        "Fetching lock events in [{}, {}] failed, skipping chunk: {:?}",
                        start, end, e
                    );
                    continue;
                }
            };
            if !events.is_empty() {
                info!("Found {} lock events in [{}, {}]", events.len(), start, end);
            }
            for event in events {
                self.metrics.eth_watcher_received_events.inc();
                // failures are logged and counted inside the handler;
                // abandoned (non-retryable) events do not hold the
                // checkpoint back
                if let Err(e) = self.orchestrator.handle_lock_event(&event).await {
                    if e.is_retryable() {
                        advance_to = advance_to.min(event.block_number.saturating_sub(1));
                    }
                }
            }
        }
        if let Err(e) = self.store.advance_checkpoint(advance_to).await {
            warn!("Persisting checkpoint {} failed: {:?}", advance_to, e);
        } else {
            self.metrics
                .last_synced_eth_block
                .set(self.store.checkpoint().await as i64);
        }
    }

    async fn deliver_live_log(&self, log: Log) {
        self.metrics.eth_watcher_received_events.inc();
        let event = match EthLockEvent::try_from_log(log) {
            Ok(event) => event,
            Err(e) => {
                self.metrics.eth_watcher_unrecognized_events.inc();
                warn!("Undecodable log from live watch: {:?}", e);
                return;
            }
        };
        let block = event.block_number;
        let advance = match self.orchestrator.handle_lock_event(&event).await {
            // Checkpoint advances only after the handler completed, so a
            // crash mid-handling re-delivers the event instead of silently
            // skipping it.
            Ok(()) => true,
            // abandoned for good; nothing to come back for
            Err(e) if !e.is_retryable() => true,
            // leave the checkpoint behind the event so the periodic
            // re-scan retries it
            Err(_) => false,
        };
        if advance {
            if let Err(e) = self.store.advance_checkpoint(block).await {
                warn!("Persisting checkpoint {} failed: {:?}", block, e);
            } else {
                self.metrics
                    .last_synced_eth_block
                    .set(self.store.checkpoint().await as i64);
            }
        }
    }
}

/// Split an inclusive block range into inclusive chunks of at most `size`.
fn chunk_ranges(from: u64, to: u64, size: u64) -> Vec<(u64, u64)> {
    assert!(size > 0);
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(size - 1).min(to);
        ranges.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ranges_exact_and_partial() {
        assert_eq!(chunk_ranges(0, 0, 5_000), vec![(0, 0)]);
        assert_eq!(chunk_ranges(0, 4_999, 5_000), vec![(0, 4_999)]);
        assert_eq!(
            chunk_ranges(0, 5_000, 5_000),
            vec![(0, 4_999), (5_000, 5_000)]
        );
        assert_eq!(
            chunk_ranges(100, 12_000, 5_000),
            vec![(100, 5_099), (5_100, 10_099), (10_100, 12_000)]
        );
    }

    #[test]
    fn test_chunk_ranges_empty_when_inverted() {
        assert!(chunk_ranges(10, 9, 5_000).is_empty());
    }

    #[test]
    fn test_chunk_ranges_cover_range_without_overlap() {
        let ranges = chunk_ranges(7, 23_456, 5_000);
        let mut expected_next = 7;
        for (start, end) in &ranges {
            assert_eq!(*start, expected_next);
            assert!(end >= start);
            expected_next = end + 1;
        }
        assert_eq!(expected_next, 23_457);
    }
}
