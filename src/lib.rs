// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Relay validator between two mutually-unaware ledgers: a Base (EVM)
//! bridge contract and an ICP bridge canister.
//!
//! Users lock funds on one side; this process observes the event, converts
//! and re-signs the intent, and releases equivalent funds on the other
//! side. There is no escrow, no shared database and no atomic cross-chain
//! commit — safety comes from a persisted checkpoint/dedup store and from
//! treating the destination ledger's own `completed` flag as the final
//! arbiter of whether a transfer happened.

pub mod abi;
pub mod config;
pub mod crypto;
pub mod error;
pub mod eth_client;
pub mod eth_syncer;
pub mod events;
pub mod icp_client;
pub mod metrics;
pub mod node;
pub mod orchestrator;
pub mod release_executor;
pub mod server;
pub mod store;
pub mod ttl_cache;
pub mod types;

#[cfg(test)]
pub mod mock_canister_client;

#[cfg(test)]
pub mod test_utils;
