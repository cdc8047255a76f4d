// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the fleet manager.
//!
//! All metrics share the namespace prefix `fleet_manager_` and are exposed through
//! the `/metrics` route of the agent API.
//!
//! # Metrics Categories
//!
//! - **Worker Metrics** - reconciler ticks, their outcome and duration
//! - **Fleet Metrics** - instances per status, capacity used and provisioning wait per
//!   cluster
//! - **Operation Metrics** - deletions, deprovisions, promotions
//! - **Data-Plane Metrics** - agent reports and DNS changes
//!
//! # Example
//!
//! ```rust,no_run
//! use fleet_manager::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("accepted_dinosaur", std::time::Duration::from_millis(40));
//! ```

use crate::constants::METRICS_NAMESPACE;
use crate::models::{DinosaurRegionCount, DinosaurStatusCount};
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Worker Metrics
// ============================================================================

/// Total number of reconciler ticks by worker and outcome
///
/// Labels:
/// - `worker`: Reconciler name (e.g., `accepted_dinosaur`)
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciler ticks by worker and status",
    );
    let counter = CounterVec::new(opts, &["worker", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciler ticks in seconds
///
/// Labels:
/// - `worker`: Reconciler name
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciler ticks in seconds by worker",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["worker"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Fleet Metrics
// ============================================================================

/// Number of instances per lifecycle status
///
/// Labels:
/// - `status`: Request status (`accepted`, `ready`, ...)
pub static DINOSAUR_STATUS_COUNT: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dinosaur_status_count"),
        "Number of dinosaur instances per status",
    );
    let gauge = GaugeVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Number of instances per region, instance type and cluster
///
/// Labels:
/// - `region`: Cloud region
/// - `instance_type`: `standard` or `eval`
/// - `cluster_id`: Hosting cluster (empty before placement)
pub static CLUSTER_CAPACITY_USED: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_cluster_capacity_used"),
        "Number of dinosaur instances per region, instance type and cluster",
    );
    let gauge = GaugeVec::new(opts, &["region", "instance_type", "cluster_id"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Longest time an instance of the cluster has been waiting in `provisioning`
///
/// Labels:
/// - `cluster_id`: Hosting cluster
pub static PROVISIONING_WAIT_SECONDS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dinosaur_provisioning_wait_seconds"),
        "Longest wait of a provisioning dinosaur instance per cluster in seconds",
    );
    let gauge = GaugeVec::new(opts, &["cluster_id"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Operation Metrics
// ============================================================================

/// Total number of instance operations by kind and outcome
///
/// Labels:
/// - `operation`: `delete`, `deprovision`, `promote`
/// - `outcome`: `success`, `error`
pub static DINOSAUR_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dinosaur_operations_total"),
        "Total number of dinosaur operations by operation and outcome",
    );
    let counter = CounterVec::new(opts, &["operation", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Data-Plane Metrics
// ============================================================================

/// Total number of agent reports by kind and outcome
///
/// Labels:
/// - `kind`: `cluster` or `dinosaur`
/// - `outcome`: `processed`, `ignored`, `error`
pub static DATAPLANE_REPORTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dataplane_reports_total"),
        "Total number of data-plane status reports by kind and outcome",
    );
    let counter = CounterVec::new(opts, &["kind", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of DNS change batches by action and outcome
///
/// Labels:
/// - `action`: `CREATE`, `DELETE`
/// - `outcome`: `success`, `suppressed`, `error`
pub static DNS_CHANGES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dns_changes_total"),
        "Total number of DNS change batches by action and outcome",
    );
    let counter = CounterVec::new(opts, &["action", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a reconciler tick that finished without item errors
pub fn record_reconciliation_success(worker: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[worker, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[worker])
        .observe(duration.as_secs_f64());
}

/// Record a reconciler tick that reported at least one item error
pub fn record_reconciliation_error(worker: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[worker, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[worker])
        .observe(duration.as_secs_f64());
}

/// Publish the number of instances per status
pub fn update_dinosaur_status_counts(counts: &[DinosaurStatusCount]) {
    for c in counts {
        DINOSAUR_STATUS_COUNT
            .with_label_values(&[c.status.as_str()])
            .set(c.count as f64);
    }
}

/// Publish the instance counts per region, instance type and cluster.
///
/// Series of clusters that no longer host instances are dropped.
pub fn update_cluster_capacity_used(counts: &[DinosaurRegionCount]) {
    CLUSTER_CAPACITY_USED.reset();
    for c in counts {
        CLUSTER_CAPACITY_USED
            .with_label_values(&[&c.region, c.instance_type.as_str(), &c.cluster_id])
            .set(c.count as f64);
    }
}

/// Publish the longest provisioning wait per cluster.
///
/// Clusters without provisioning instances are dropped.
pub fn update_provisioning_wait(waits: &BTreeMap<String, Duration>) {
    PROVISIONING_WAIT_SECONDS.reset();
    for (cluster_id, wait) in waits {
        PROVISIONING_WAIT_SECONDS
            .with_label_values(&[cluster_id.as_str()])
            .set(wait.as_secs_f64());
    }
}

/// Record the outcome of an instance operation, `count` times
pub fn record_dinosaur_operation(operation: &str, success: bool, count: usize) {
    let outcome = if success { "success" } else { "error" };
    DINOSAUR_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc_by(count as f64);
}

/// Record an agent report
pub fn record_dataplane_report(kind: &str, outcome: &str) {
    DATAPLANE_REPORTS_TOTAL
        .with_label_values(&[kind, outcome])
        .inc();
}

/// Record a DNS change batch
pub fn record_dns_change(action: &str, outcome: &str) {
    DNS_CHANGES_TOTAL.with_label_values(&[action, outcome]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DinosaurStatus, InstanceType};

    #[test]
    fn test_record_reconciliation_success() {
        let worker = "test_worker_success";
        record_reconciliation_success(worker, Duration::from_millis(500));

        let counter = RECONCILIATION_TOTAL.with_label_values(&[worker, "success"]);
        assert!(counter.get() > 0.0);

        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&[worker]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_record_reconciliation_error() {
        let worker = "test_worker_error";
        record_reconciliation_error(worker, Duration::from_millis(250));

        let counter = RECONCILIATION_TOTAL.with_label_values(&[worker, "error"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn test_update_dinosaur_status_counts() {
        update_dinosaur_status_counts(&[
            DinosaurStatusCount {
                status: DinosaurStatus::Deprovision,
                count: 3,
            },
            DinosaurStatusCount {
                status: DinosaurStatus::Failed,
                count: 0,
            },
        ]);

        #[allow(clippy::float_cmp)]
        {
            assert_eq!(
                DINOSAUR_STATUS_COUNT
                    .with_label_values(&["deprovision"])
                    .get(),
                3.0
            );
            assert_eq!(
                DINOSAUR_STATUS_COUNT.with_label_values(&["failed"]).get(),
                0.0,
                "statuses without instances are still published"
            );
        }
    }

    #[test]
    fn test_update_cluster_capacity_used() {
        update_cluster_capacity_used(&[DinosaurRegionCount {
            region: "metrics-test-region".to_string(),
            instance_type: InstanceType::Eval,
            cluster_id: "metrics-test-cluster".to_string(),
            count: 2,
        }]);

        #[allow(clippy::float_cmp)]
        {
            assert_eq!(
                CLUSTER_CAPACITY_USED
                    .with_label_values(&["metrics-test-region", "eval", "metrics-test-cluster"])
                    .get(),
                2.0
            );
        }
    }

    #[test]
    fn test_gather_metrics() {
        record_reconciliation_success("gather_test", Duration::from_millis(100));
        record_dns_change("CREATE", "success");

        let metrics = gather_metrics().unwrap();
        assert!(metrics.contains("fleet_manager_reconciliations_total"));
        assert!(metrics.contains("fleet_manager_dns_changes_total"));
    }
}
