// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::config::BridgeNodeConfig;
use crate::eth_syncer::EthSyncer;
use crate::metrics::BridgeMetrics;
use crate::orchestrator::TransferOrchestrator;
use crate::release_executor::{NonceManager, ReleaseExecutor};
use crate::server::{handler::BridgeRequestHandler, run_server};
use crate::store::BridgeStore;
use crate::ttl_cache::StatusCache;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const REPROCESS_QUEUE_DEPTH: usize = 16;

/// Wire up and start every driver: the event watcher, the forward
/// orchestrator, the release executor and the control server. Returns the
/// long-running task handles; there is no graceful-shutdown handshake —
/// termination relies on the persisted checkpoint/dedup state for safe
/// resumption.
pub async fn run_bridge_node(
    config: BridgeNodeConfig,
    prometheus_registry: prometheus::Registry,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let metrics = Arc::new(BridgeMetrics::new(&prometheus_registry));
    let server_config = config.validate().await?;

    let current_head = server_config
        .eth_client
        .latest_block()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to query Base head: {:?}", e))?;
    let store = Arc::new(
        BridgeStore::load(
            &server_config.checkpoint_file,
            &server_config.processed_file,
            current_head,
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load bridge store: {:?}", e))?,
    );
    metrics
        .processed_transfers_total
        .set(store.processed_count().await as i64);

    match server_config.eth_client.is_registered_validator().await {
        Ok(true) => info!("Validator is registered in the bridge contract"),
        Ok(false) => warn!(
            "WARNING: {:?} is not registered as a validator in the bridge contract!",
            server_config.eth_client.validator_address()
        ),
        Err(e) => warn!("Could not check validator registration: {:?}", e),
    }

    let status_cache = Arc::new(StatusCache::with_default_ttl());
    let nonce = Arc::new(NonceManager::new());

    let orchestrator = Arc::new(TransferOrchestrator::new(
        store.clone(),
        server_config.canister.clone(),
        server_config.eth_client.clone(),
        server_config.token_map.clone(),
        status_cache,
        server_config.signer.clone(),
        metrics.clone(),
    ));

    let mut handles = Vec::new();

    let executor = Arc::new(ReleaseExecutor::new(
        server_config.canister.clone(),
        server_config.eth_client.clone(),
        store.clone(),
        server_config.token_map.clone(),
        server_config.signer.clone(),
        nonce.clone(),
        metrics.clone(),
    ));
    handles.push(executor.start());

    let (reprocess_tx, reprocess_rx) = mpsc::channel(REPROCESS_QUEUE_DEPTH);
    let syncer = Arc::new(EthSyncer::new(
        server_config.eth_client.clone(),
        orchestrator.clone(),
        store.clone(),
        metrics.clone(),
    ));
    handles.extend(
        syncer
            .run(reprocess_rx)
            .await
            .map_err(|e| anyhow::anyhow!("Starting event watcher failed: {:?}", e))?,
    );

    let socket_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        server_config.server_listen_port,
    );
    handles.push(run_server(
        &socket_address,
        BridgeRequestHandler::new(
            server_config.eth_client,
            server_config.canister,
            orchestrator,
            store,
            server_config.token_map,
            nonce,
            reprocess_tx,
        ),
        metrics,
        Arc::new(prometheus_registry),
    ));

    info!("Validator started successfully");
    Ok(handles)
}
