// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Durable checkpoint and dedup state.
//!
//! Two small files are the node's only persistence: a plain-text
//! last-scanned-block file and a JSON array of transfer ids already relayed.
//! Everything idempotent about the relay hangs off this store, so writes are
//! flushed before the mutating call returns.
//!
//! Instances are injected (`Arc<BridgeStore>`) into every driver rather than
//! living in process-wide statics, so tests run against isolated stores.

use crate::error::{BridgeError, BridgeResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// How far behind the current head a first run starts scanning. Transfers
/// older than this horizon at first startup are not backfilled.
pub const BACKFILL_HORIZON_BLOCKS: u64 = 20_000;

#[derive(Debug)]
pub struct BridgeStore {
    checkpoint_path: PathBuf,
    processed_path: PathBuf,
    processed: RwLock<HashSet<String>>,
    checkpoint: RwLock<u64>,
}

impl BridgeStore {
    /// Load persisted state, seeding a missing checkpoint to
    /// `current_head - BACKFILL_HORIZON_BLOCKS`.
    pub async fn load(
        checkpoint_path: impl AsRef<Path>,
        processed_path: impl AsRef<Path>,
        current_head: u64,
    ) -> BridgeResult<Self> {
        let checkpoint_path = checkpoint_path.as_ref().to_path_buf();
        let processed_path = processed_path.as_ref().to_path_buf();

        let processed = match tokio::fs::read_to_string(&processed_path).await {
            Ok(raw) => serde_json::from_str::<Vec<String>>(&raw)
                .map_err(|e| {
                    BridgeError::StorageError(format!(
                        "corrupt processed-transfers file {}: {e}",
                        processed_path.display()
                    ))
                })?
                .into_iter()
                .collect::<HashSet<_>>(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                return Err(BridgeError::StorageError(format!(
                    "reading {}: {e}",
                    processed_path.display()
                )))
            }
        };

        let checkpoint = match tokio::fs::read_to_string(&checkpoint_path).await {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|e| {
                BridgeError::StorageError(format!(
                    "corrupt checkpoint file {}: {e}",
                    checkpoint_path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let seeded = current_head.saturating_sub(BACKFILL_HORIZON_BLOCKS);
                info!(
                    "No persisted checkpoint, seeding to {} (head {} - horizon {})",
                    seeded, current_head, BACKFILL_HORIZON_BLOCKS
                );
                seeded
            }
            Err(e) => {
                return Err(BridgeError::StorageError(format!(
                    "reading {}: {e}",
                    checkpoint_path.display()
                )))
            }
        };

        info!(
            "Bridge store loaded: {} processed transfers, checkpoint {}",
            processed.len(),
            checkpoint
        );
        Ok(Self {
            checkpoint_path,
            processed_path,
            processed: RwLock::new(processed),
            checkpoint: RwLock::new(checkpoint),
        })
    }

    pub async fn is_processed(&self, id: &str) -> bool {
        self.processed.read().await.contains(id)
    }

    /// Record a transfer as relayed, durably. Idempotent: marking the same
    /// id twice is a no-op that skips the disk write.
    pub async fn mark_processed(&self, id: &str) -> BridgeResult<()> {
        let mut processed = self.processed.write().await;
        if !processed.insert(id.to_string()) {
            return Ok(());
        }
        let snapshot: Vec<&String> = processed.iter().collect();
        let raw = serde_json::to_string(&snapshot)
            .map_err(|e| BridgeError::SerializationError(format!("{e}")))?;
        tokio::fs::write(&self.processed_path, raw)
            .await
            .map_err(|e| {
                BridgeError::StorageError(format!(
                    "writing {}: {e}",
                    self.processed_path.display()
                ))
            })
    }

    pub async fn processed_count(&self) -> usize {
        self.processed.read().await.len()
    }

    pub async fn processed_snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.processed.read().await.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn checkpoint(&self) -> u64 {
        *self.checkpoint.read().await
    }

    /// Advance the persisted checkpoint. Monotonic: attempts to move it
    /// backwards are logged and ignored, so the checkpoint never decreases
    /// across any sequence of scan passes or restarts.
    pub async fn advance_checkpoint(&self, block: u64) -> BridgeResult<()> {
        let mut checkpoint = self.checkpoint.write().await;
        if block <= *checkpoint {
            if block < *checkpoint {
                warn!(
                    "Ignoring checkpoint regression: {} < current {}",
                    block, *checkpoint
                );
            }
            return Ok(());
        }
        tokio::fs::write(&self.checkpoint_path, block.to_string())
            .await
            .map_err(|e| {
                BridgeError::StorageError(format!(
                    "writing {}: {e}",
                    self.checkpoint_path.display()
                ))
            })?;
        *checkpoint = block;
        Ok(())
    }
}
