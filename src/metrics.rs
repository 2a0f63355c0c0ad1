// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Registry,
};

const LATENCY_SEC_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10., 20., 30., 60., 120.,
];

#[derive(Clone, Debug)]
pub struct BridgeMetrics {
    pub(crate) requests_received: IntCounterVec,
    pub(crate) requests_ok: IntCounterVec,
    pub(crate) err_requests: IntCounterVec,
    pub(crate) requests_inflight: IntGaugeVec,
    pub(crate) request_latency: HistogramVec,

    pub(crate) eth_watcher_received_events: IntCounter,
    pub(crate) eth_watcher_unrecognized_events: IntCounter,
    pub(crate) last_synced_eth_block: IntGauge,

    pub(crate) already_processed_skips: IntCounter,
    pub(crate) forward_relay_success: IntCounter,
    pub(crate) err_forward_relay: IntCounterVec,
    pub(crate) reverse_relay_success: IntCounter,
    pub(crate) err_reverse_relay: IntCounterVec,

    pub(crate) processed_transfers_total: IntGauge,
    pub(crate) current_nonce: IntGauge,
    pub(crate) nonce_resyncs: IntCounter,
}

impl BridgeMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            requests_received: register_int_counter_vec_with_registry!(
                "bridge_requests_received",
                "Total requests received by the control surface, by route",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_ok: register_int_counter_vec_with_registry!(
                "bridge_requests_ok",
                "Total successful control-surface requests, by route",
                &["type"],
                registry,
            )
            .unwrap(),
            err_requests: register_int_counter_vec_with_registry!(
                "bridge_err_requests",
                "Total failed control-surface requests, by route",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_inflight: register_int_gauge_vec_with_registry!(
                "bridge_requests_inflight",
                "In-flight control-surface requests, by route",
                &["type"],
                registry,
            )
            .unwrap(),
            request_latency: register_histogram_vec_with_registry!(
                "bridge_request_latency",
                "Control-surface request latency in seconds, by route",
                &["type"],
                LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            eth_watcher_received_events: register_int_counter_with_registry!(
                "bridge_eth_watcher_received_events",
                "Total lock events delivered by any watcher driver",
                registry,
            )
            .unwrap(),
            eth_watcher_unrecognized_events: register_int_counter_with_registry!(
                "bridge_eth_watcher_unrecognized_events",
                "Total logs the watcher could not decode as lock events",
                registry,
            )
            .unwrap(),
            last_synced_eth_block: register_int_gauge_with_registry!(
                "bridge_last_synced_eth_block",
                "Highest fully scanned Base block (persisted checkpoint)",
                registry,
            )
            .unwrap(),
            already_processed_skips: register_int_counter_with_registry!(
                "bridge_already_processed_skips",
                "Deliveries skipped because the transfer id was already relayed",
                registry,
            )
            .unwrap(),
            forward_relay_success: register_int_counter_with_registry!(
                "bridge_forward_relay_success",
                "Base to ICP transfers credited on the canister",
                registry,
            )
            .unwrap(),
            err_forward_relay: register_int_counter_vec_with_registry!(
                "bridge_err_forward_relay",
                "Base to ICP relay failures, by error type",
                &["error_type"],
                registry,
            )
            .unwrap(),
            reverse_relay_success: register_int_counter_with_registry!(
                "bridge_reverse_relay_success",
                "ICP to Base releases mined on the bridge contract",
                registry,
            )
            .unwrap(),
            err_reverse_relay: register_int_counter_vec_with_registry!(
                "bridge_err_reverse_relay",
                "ICP to Base release failures, by error type",
                &["error_type"],
                registry,
            )
            .unwrap(),
            processed_transfers_total: register_int_gauge_with_registry!(
                "bridge_processed_transfers_total",
                "Size of the persisted dedup set",
                registry,
            )
            .unwrap(),
            current_nonce: register_int_gauge_with_registry!(
                "bridge_current_nonce",
                "Next nonce the release pipeline will hand out",
                registry,
            )
            .unwrap(),
            nonce_resyncs: register_int_counter_with_registry!(
                "bridge_nonce_resyncs",
                "Nonce counter resyncs after detected conflicts",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_cleanly() {
        let registry = Registry::new();
        let metrics = BridgeMetrics::new(&registry);
        metrics.eth_watcher_received_events.inc();
        metrics
            .err_forward_relay
            .with_label_values(&["unmapped_token"])
            .inc();
        metrics.last_synced_eth_block.set(123);

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "bridge_eth_watcher_received_events"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "bridge_last_synced_eth_block"));
    }

    #[test]
    fn test_duplicate_registration_is_isolated_per_registry() {
        // two registries must not collide (each test constructs its own)
        let _a = BridgeMetrics::new_for_testing();
        let _b = BridgeMetrics::new_for_testing();
    }
}
