// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! TTL cache for destination-side transfer status lookups.
//!
//! Every delivery path re-checks the canister's view of a transfer before
//! relaying, and the periodic re-scan makes those checks repetitive; this
//! cache bounds the resulting query volume. A miss (or an expired entry) is
//! never evidence about the transfer — callers fall through to a live query.

use crate::types::TransferStatus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const STATUS_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry {
    status: TransferStatus,
    fetched_at: Instant,
}

#[derive(Debug)]
pub struct StatusCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(STATUS_CACHE_TTL)
    }

    /// Return the cached status if present and younger than the TTL.
    pub async fn get_if_fresh(&self, id: &str) -> Option<TransferStatus> {
        let entries = self.entries.read().await;
        if let Some(entry) = entries.get(id) {
            if entry.fetched_at.elapsed() < self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.status.clone());
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub async fn insert(&self, id: &str, status: TransferStatus) {
        let mut entries = self.entries.write().await;
        entries.insert(
            id.to_string(),
            CacheEntry {
                status,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub async fn invalidate(&self, id: &str) {
        self.entries.write().await.remove(id);
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
