// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use crate::abi::{BaseBridge, Erc20, TokensLockedFilter};
use crate::error::{BridgeError, BridgeResult};
use crate::events::EthLockEvent;
use ethers::contract::EthEvent;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{FilterWatcher, Http, JsonRpcClient, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address as EthAddress, Eip1559TransactionRequest, Filter, Log, TxHash, U256};
use tap::TapFallible;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Fixed, conservative submission parameters. Deliberately not sampled from
/// network conditions: predictable fees over fast inclusion.
pub const RELEASE_GAS_LIMIT: u64 = 500_000;
pub const RELEASE_MAX_FEE_PER_GAS_WEI: u64 = 1_500_000_000; // 1.5 gwei
pub const RELEASE_MAX_PRIORITY_FEE_PER_GAS_WEI: u64 = 1_000_000_000; // 1 gwei

/// Fallback when a token contract's `decimals()` call fails.
const DEFAULT_TOKEN_DECIMALS: u8 = 18;

type EthSigner<P> = SignerMiddleware<Provider<P>, LocalWallet>;

/// A release to submit to the bridge contract.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub token: EthAddress,
    pub recipient: EthAddress,
    pub amount: U256,
    pub transfer_id: String,
    pub signatures: Vec<Vec<u8>>,
}

/// Ledger operations the transfer pipelines need from the EVM side.
///
/// Pipelines depend on this trait rather than on `EthClient` directly so
/// tests can run them against an in-memory fake.
#[async_trait::async_trait]
pub trait EthBridgeOps: Send + Sync {
    /// Token decimals, lazily discovered and cached for the process
    /// lifetime (decimals are immutable per token contract).
    async fn token_decimals(&self, token: EthAddress) -> BridgeResult<u8>;

    /// Custodial balance held by the bridge contract for `token`.
    async fn bridge_token_balance(&self, token: EthAddress) -> BridgeResult<U256>;

    /// Current transaction count of the validator account (nonce source).
    async fn transaction_count(&self) -> BridgeResult<u64>;

    /// Submit `releaseTokens` with an explicit nonce. Returns the
    /// transaction hash once the transaction is mined successfully.
    async fn submit_release(&self, release: ReleaseRequest, nonce: u64) -> BridgeResult<TxHash>;
}

pub struct EthClient<P: JsonRpcClient> {
    provider: Arc<Provider<P>>,
    signer: Arc<EthSigner<P>>,
    bridge: BaseBridge<EthSigner<P>>,
    bridge_address: EthAddress,
    decimals_cache: RwLock<HashMap<EthAddress, u8>>,
}

impl EthClient<Http> {
    pub async fn new(
        rpc_url: &str,
        bridge_address: EthAddress,
        wallet: LocalWallet,
        expected_chain_id: Option<u64>,
    ) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?
            .interval(std::time::Duration::from_millis(2000));
        let chain_id = provider.get_chainid().await?.as_u64();
        if let Some(expected) = expected_chain_id {
            if chain_id != expected {
                return Err(anyhow::anyhow!(
                    "Chain ID mismatch: expected {}, got {}. This could indicate connecting to the wrong network!",
                    expected,
                    chain_id
                ));
            }
        }
        let self_ = Self::with_provider(provider, bridge_address, wallet.with_chain_id(chain_id));
        self_.describe().await?;
        Ok(self_)
    }
}

impl<P: JsonRpcClient + Clone + 'static> EthClient<P> {
    pub fn with_provider(
        provider: Provider<P>,
        bridge_address: EthAddress,
        wallet: LocalWallet,
    ) -> Self {
        let signer = Arc::new(SignerMiddleware::new(provider.clone(), wallet));
        let bridge = BaseBridge::new(bridge_address, signer.clone());
        Self {
            provider: Arc::new(provider),
            signer,
            bridge,
            bridge_address,
            decimals_cache: RwLock::new(HashMap::new()),
        }
    }
}

impl<P: JsonRpcClient + 'static> EthClient<P> {
    pub fn bridge_address(&self) -> EthAddress {
        self.bridge_address
    }

    pub fn validator_address(&self) -> EthAddress {
        self.signer.signer().address()
    }

    pub async fn get_chain_id(&self) -> BridgeResult<u64> {
        Ok(self.provider.get_chainid().await?.as_u64())
    }

    pub async fn latest_block(&self) -> BridgeResult<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    // Log connection info at startup
    async fn describe(&self) -> anyhow::Result<()> {
        let chain_id = self.provider.get_chainid().await?;
        let block_number = self.provider.get_block_number().await?;
        info!(
            "EthClient connected to chain {}, current block: {}, bridge contract: {:?}",
            chain_id, block_number, self.bridge_address
        );
        Ok(())
    }

    /// Whether the signing key is registered in the contract's validator
    /// set. Signatures from unregistered keys are rejected on-chain.
    pub async fn is_registered_validator(&self) -> BridgeResult<bool> {
        self.bridge
            .validators(self.validator_address())
            .call()
            .await
            .map_err(|e| BridgeError::ProviderError(format!("validators(): {e}")))
    }

    /// Signature threshold configured in the bridge contract.
    pub async fn required_signatures(&self) -> BridgeResult<u64> {
        let threshold = self
            .bridge
            .required_signatures()
            .call()
            .await
            .map_err(|e| BridgeError::ProviderError(format!("requiredSignatures(): {e}")))?;
        Ok(threshold.as_u64())
    }

    fn lock_event_filter(&self) -> Filter {
        Filter::new()
            .address(self.bridge_address)
            .topic0(TokensLockedFilter::signature())
    }

    // Note: query may fail if range is too big. Callsite is responsible
    // for chunking the query.
    pub async fn get_lock_events_in_range(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> BridgeResult<Vec<EthLockEvent>> {
        let filter = self
            .lock_event_filter()
            .from_block(start_block)
            .to_block(end_block);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(BridgeError::from)
            .tap_err(|e| {
                warn!(
                    "get_lock_events_in_range failed. Filter: {:?}. Error {:?}",
                    filter, e
                )
            })?;

        // Safeguard check that all logs come from the bridge contract
        if logs.iter().any(|log| log.address != self.bridge_address) {
            return Err(BridgeError::ProviderError(format!(
                "Provider returned logs from a different contract (expected: {:?})",
                self.bridge_address
            )));
        }

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            match EthLockEvent::try_from_log(log) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping undecodable log in lock-event query: {:?}", e),
            }
        }
        Ok(events)
    }

    /// Standing filter over new lock events (live delivery path).
    pub async fn watch_lock_events(&self) -> BridgeResult<FilterWatcher<'_, P, Log>> {
        self.provider
            .watch(&self.lock_event_filter())
            .await
            .map_err(BridgeError::from)
    }

    /// Look up the lock event carried by a specific transaction, for the
    /// verification surface.
    pub async fn get_lock_event_by_tx_hash(&self, tx_hash: TxHash) -> BridgeResult<EthLockEvent> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(BridgeError::from)?
            .ok_or(BridgeError::TxNotFound)?;
        let signature = TokensLockedFilter::signature();
        for log in receipt.logs {
            if log.address == self.bridge_address && log.topics.first() == Some(&signature) {
                return EthLockEvent::try_from_log(log);
            }
        }
        Err(BridgeError::NotALockEvent)
    }
}

#[async_trait::async_trait]
impl<P: JsonRpcClient + 'static> EthBridgeOps for EthClient<P> {
    async fn token_decimals(&self, token: EthAddress) -> BridgeResult<u8> {
        if let Some(decimals) = self.decimals_cache.read().await.get(&token) {
            return Ok(*decimals);
        }
        let decimals = match Erc20::new(token, self.signer.clone()).decimals().call().await {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    "decimals() failed for token {:?}, assuming {}: {e}",
                    token, DEFAULT_TOKEN_DECIMALS
                );
                DEFAULT_TOKEN_DECIMALS
            }
        };
        self.decimals_cache.write().await.insert(token, decimals);
        Ok(decimals)
    }

    async fn bridge_token_balance(&self, token: EthAddress) -> BridgeResult<U256> {
        Erc20::new(token, self.signer.clone())
            .balance_of(self.bridge_address)
            .call()
            .await
            .map_err(|e| BridgeError::ProviderError(format!("balanceOf(): {e}")))
    }

    async fn transaction_count(&self) -> BridgeResult<u64> {
        let count = self
            .provider
            .get_transaction_count(self.validator_address(), None)
            .await?;
        Ok(count.as_u64())
    }

    async fn submit_release(&self, release: ReleaseRequest, nonce: u64) -> BridgeResult<TxHash> {
        let signatures: Vec<ethers::types::Bytes> = release
            .signatures
            .iter()
            .cloned()
            .map(Into::into)
            .collect();
        let calldata = self
            .bridge
            .release_tokens(
                release.token,
                release.recipient,
                release.amount,
                release.transfer_id.clone(),
                signatures,
            )
            .calldata()
            .ok_or_else(|| {
                BridgeError::InternalError("releaseTokens calldata encoding failed".to_string())
            })?;

        let tx = Eip1559TransactionRequest::new()
            .to(self.bridge_address)
            .data(calldata)
            .nonce(nonce)
            .gas(RELEASE_GAS_LIMIT)
            .max_fee_per_gas(U256::from(RELEASE_MAX_FEE_PER_GAS_WEI))
            .max_priority_fee_per_gas(U256::from(RELEASE_MAX_PRIORITY_FEE_PER_GAS_WEI));

        let pending = self
            .signer
            .send_transaction(tx, None)
            .await
            .map_err(|e| classify_submission_error(format!("{e}")))?;
        let tx_hash = *pending;
        info!(
            "Release submitted: transfer_id={}, nonce={}, tx_hash={:?}",
            release.transfer_id, nonce, tx_hash
        );

        let receipt = pending
            .await
            .map_err(BridgeError::from)?
            .ok_or_else(|| BridgeError::EthTxFailure(format!("{tx_hash:?} dropped from mempool")))?;
        if receipt.status == Some(0.into()) {
            return Err(BridgeError::EthTxFailure(format!(
                "{tx_hash:?} reverted in block {:?}",
                receipt.block_number
            )));
        }
        Ok(receipt.transaction_hash)
    }
}

/// Nonce desynchronization is only observable through error-message
/// inspection; the provider surfaces it as an opaque JSON-RPC error.
pub fn is_nonce_error(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("nonce") || lowered.contains("replacement transaction underpriced")
}

fn classify_submission_error(message: String) -> BridgeError {
    if is_nonce_error(&message) {
        BridgeError::NonceConflict(message)
    } else {
        BridgeError::TransientProviderError(message)
    }
}
