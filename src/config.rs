// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::ValidatorSigner;
use crate::eth_client::EthClient;
use crate::icp_client::IcpBridgeClient;
use crate::types::TokenMap;
use anyhow::anyhow;
use ethers::providers::Http;
use ethers::types::Address as EthAddress;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_ICP_HOST: &str = "http://localhost:4943";
pub const DEFAULT_BASE_RPC: &str = "https://sepolia.base.org";
const DEFAULT_SERVER_PORT: u16 = 3000;
const DEFAULT_CHECKPOINT_FILE: &str = "last_processed_block.txt";
const DEFAULT_PROCESSED_FILE: &str = "processed_transfers.json";

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct IcpConfig {
    // Replica endpoint the agent talks to.
    pub host: String,
    // The bridge canister id (principal text form).
    pub canister_id: String,
    // PEM-encoded identity (Secp256k1 or Ed25519) for canister calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_pem: Option<String>,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EthConfig {
    // Rpc url for the Base fullnode, used for queries and submissions.
    pub rpc_url: String,
    // The bridge contract address on Base.
    pub bridge_address: String,
    // The expected chain id, validated at connect time when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_chain_id: Option<u64>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeNodeConfig {
    // The port the status server listens on.
    pub server_listen_port: u16,
    // Durable state layout (checkpoint + dedup set).
    pub checkpoint_file: PathBuf,
    pub processed_file: PathBuf,
    // Hex private key of the validator's EVM signing identity.
    pub validator_private_key: String,
    // ICP configuration
    pub icp: IcpConfig,
    // Base configuration
    pub eth: EthConfig,
    // Static token mapping: ICP ledger principal -> Base token address.
    pub token_mappings: BTreeMap<String, String>,
}

impl BridgeNodeConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Environment-shaped construction with an injectable lookup, so tests
    /// do not mutate process globals.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let validator_private_key = lookup("VALIDATOR_PRIVATE_KEY")
            .ok_or_else(|| anyhow!("VALIDATOR_PRIVATE_KEY not found in environment variables"))?;

        let canister_id = lookup("BRIDGE_CANISTER_ID")
            .ok_or_else(|| anyhow!("BRIDGE_CANISTER_ID not found in environment variables"))?;

        let token_mappings = match lookup("TOKEN_MAPPINGS") {
            Some(raw) => serde_json::from_str::<BTreeMap<String, String>>(&raw)
                .map_err(|e| anyhow!("TOKEN_MAPPINGS is not a JSON object of pairs: {e}"))?,
            None => {
                // single-pair fallback for simple deployments
                let icp_token = lookup("ICP_TOKEN_ID");
                let eth_token = lookup("BASE_TOKEN_ADDRESS");
                match (icp_token, eth_token) {
                    (Some(icp), Some(eth)) => BTreeMap::from_iter(vec![(icp, eth)]),
                    _ => {
                        return Err(anyhow!(
                            "no token mappings configured: set TOKEN_MAPPINGS or \
                             ICP_TOKEN_ID + BASE_TOKEN_ADDRESS"
                        ))
                    }
                }
            }
        };

        let server_listen_port = match lookup("PORT") {
            Some(raw) => raw.parse().map_err(|e| anyhow!("invalid PORT: {e}"))?,
            None => DEFAULT_SERVER_PORT,
        };
        let expected_chain_id = match lookup("BASE_CHAIN_ID") {
            Some(raw) => Some(raw.parse().map_err(|e| anyhow!("invalid BASE_CHAIN_ID: {e}"))?),
            None => None,
        };

        Ok(Self {
            server_listen_port,
            checkpoint_file: lookup("LAST_BLOCK_FILE")
                .unwrap_or_else(|| DEFAULT_CHECKPOINT_FILE.to_string())
                .into(),
            processed_file: lookup("PROCESSED_TRANSFERS_FILE")
                .unwrap_or_else(|| DEFAULT_PROCESSED_FILE.to_string())
                .into(),
            validator_private_key,
            icp: IcpConfig {
                host: lookup("ICP_HOST").unwrap_or_else(|| DEFAULT_ICP_HOST.to_string()),
                canister_id,
                identity_pem: lookup("ICP_IDENTITY_PEM"),
            },
            eth: EthConfig {
                rpc_url: lookup("BASE_RPC").unwrap_or_else(|| DEFAULT_BASE_RPC.to_string()),
                bridge_address: lookup("BASE_BRIDGE_ADDRESS")
                    .ok_or_else(|| anyhow!("BASE_BRIDGE_ADDRESS not found in environment variables"))?,
                expected_chain_id,
            },
            token_mappings,
        })
    }

    /// Validate the configuration and construct the runtime clients.
    /// Any failure here is startup-fatal; there is no partial startup.
    pub async fn validate(&self) -> anyhow::Result<BridgeServerConfig> {
        info!("Starting config validation");

        let signer = ValidatorSigner::from_private_key_hex(&self.validator_private_key)
            .map_err(|e| anyhow!("validator signing key rejected: {e:?}"))?;
        info!("Validator address: {:?}", signer.address());

        let token_map = TokenMap::from_config_pairs(
            self.token_mappings
                .iter()
                .map(|(icp, eth)| (icp.as_str(), eth.as_str())),
        )
        .map_err(|e| anyhow!("token mapping table rejected: {e:?}"))?;
        if token_map.is_empty() {
            warn!("Token mapping table is empty; every observed transfer will be abandoned");
        }

        let bridge_address: EthAddress = self
            .eth
            .bridge_address
            .parse()
            .map_err(|e| anyhow!("invalid bridge address {}: {e}", self.eth.bridge_address))?;

        let eth_client = EthClient::new(
            &self.eth.rpc_url,
            bridge_address,
            signer.wallet().clone(),
            self.eth.expected_chain_id,
        )
        .await?;

        let canister = IcpBridgeClient::connect(
            &self.icp.host,
            &self.icp.canister_id,
            self.icp.identity_pem.as_deref(),
        )
        .await?;

        info!("Config validation complete");
        Ok(BridgeServerConfig {
            server_listen_port: self.server_listen_port,
            checkpoint_file: self.checkpoint_file.clone(),
            processed_file: self.processed_file.clone(),
            signer: Arc::new(signer),
            token_map: Arc::new(token_map),
            eth_client: Arc::new(eth_client),
            canister: Arc::new(canister),
        })
    }
}

pub struct BridgeServerConfig {
    pub server_listen_port: u16,
    pub checkpoint_file: PathBuf,
    pub processed_file: PathBuf,
    pub signer: Arc<ValidatorSigner>,
    pub token_map: Arc<TokenMap>,
    pub eth_client: Arc<EthClient<Http>>,
    pub canister: Arc<IcpBridgeClient>,
}
