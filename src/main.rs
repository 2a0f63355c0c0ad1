// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use chain_fusion_bridge::config::BridgeNodeConfig;
use chain_fusion_bridge::node::run_bridge_node;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = env!("CARGO_BIN_NAME"))]
#[clap(version = env!("CARGO_PKG_VERSION"))]
#[clap(about = "Relay validator between a Base bridge contract and an ICP bridge canister")]
struct Args {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BridgeNodeConfig::from_env()?;
    let prometheus_registry = prometheus::Registry::new();

    let handles = run_bridge_node(config, prometheus_registry).await?;
    for handle in handles {
        handle
            .await
            .map_err(|e| anyhow::anyhow!("Task join error: {}", e))?;
    }
    Ok(())
}
