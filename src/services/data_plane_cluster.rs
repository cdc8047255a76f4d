// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster status reports pushed by data-plane agents.

use super::clusters::ClusterService;
use crate::errors::{Result, ServiceError};
use crate::metrics::record_dataplane_report;
use crate::models::{ClusterStatus, DataPlaneClusterStatus, OperatorVersion};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

const REPORT_KIND: &str = "cluster";

/// Compare two version strings by their numeric components.
///
/// Digit runs are compared as numbers, everything else lexically, so `1.10.0` sorts
/// after `1.9.2` and `operator-0.2.0` after `operator-0.1.9`.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn parts(v: &str) -> Vec<(bool, &str)> {
        let mut out = Vec::new();
        let mut start = 0;
        let bytes = v.as_bytes();
        for i in 1..=bytes.len() {
            if i == bytes.len() || bytes[i].is_ascii_digit() != bytes[start].is_ascii_digit() {
                out.push((bytes[start].is_ascii_digit(), &v[start..i]));
                start = i;
            }
        }
        out
    }

    let (pa, pb) = (parts(a), parts(b));
    for ((a_num, a_part), (b_num, b_part)) in pa.iter().zip(pb.iter()) {
        let ord = if *a_num && *b_num {
            let a_trim = a_part.trim_start_matches('0');
            let b_trim = b_part.trim_start_matches('0');
            a_trim.len().cmp(&b_trim.len()).then_with(|| a_trim.cmp(b_trim))
        } else {
            a_part.cmp(b_part)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    pa.len().cmp(&pb.len())
}

/// Applies cluster status reports.
pub struct DataPlaneClusterService {
    cluster_service: Arc<dyn ClusterService>,
}

impl DataPlaneClusterService {
    #[must_use]
    pub fn new(cluster_service: Arc<dyn ClusterService>) -> Self {
        Self { cluster_service }
    }

    /// Apply the report of the agent of `cluster_id`.
    ///
    /// A cluster whose agent is not ready waits for it in
    /// `waiting_for_fleetshard_operator` and keeps its stored operator versions. A ready
    /// agent makes the cluster `ready` and its advertised operator versions replace the
    /// stored ones, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a bad-request error if the cluster does not exist, or the error of the
    /// failed write.
    pub async fn update_dataplane_cluster_status(
        &self,
        cluster_id: &str,
        report: &DataPlaneClusterStatus,
    ) -> Result<()> {
        let Some(mut cluster) = self.cluster_service.find_cluster_by_id(cluster_id).await? else {
            return Err(ServiceError::bad_request(format!(
                "Cluster agent with ID '{cluster_id}' not found"
            )));
        };

        if !cluster.status.can_process_status_reports() {
            debug!(
                cluster_id = %cluster_id,
                status = %cluster.status,
                "cluster cannot process status reports yet, ignoring report"
            );
            record_dataplane_report(REPORT_KIND, "ignored");
            return Ok(());
        }

        if !report.is_ready() {
            debug!(cluster_id = %cluster_id, "fleetshard operator not ready");
            if cluster.status == ClusterStatus::WaitingForFleetshardOperator {
                record_dataplane_report(REPORT_KIND, "unchanged");
                return Ok(());
            }
            self.cluster_service
                .update_status(cluster_id, ClusterStatus::WaitingForFleetshardOperator)
                .await?;
            record_dataplane_report(REPORT_KIND, "processed");
            return Ok(());
        }

        let mut versions: Vec<OperatorVersion> = report.available_operator_versions.clone();
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));

        if cluster.status == ClusterStatus::Ready && cluster.available_operator_versions == versions
        {
            record_dataplane_report(REPORT_KIND, "unchanged");
            return Ok(());
        }

        if cluster.status != ClusterStatus::Ready {
            info!(
                cluster_id = %cluster_id,
                from = %cluster.status,
                to = %ClusterStatus::Ready,
                "updating cluster status"
            );
        }
        cluster.status = ClusterStatus::Ready;
        cluster.available_operator_versions = versions;
        self.cluster_service.update(&cluster).await?;
        record_dataplane_report(REPORT_KIND, "processed");
        Ok(())
    }
}
