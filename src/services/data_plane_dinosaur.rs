// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Instance status reports pushed by data-plane agents.
//!
//! Each agent periodically reports every instance of its cluster. A report is reduced
//! to a [`ReportedStatus`] from its `Ready` condition, and the status decides what
//! happens to the stored request:
//!
//! | Reported | Effect |
//! |----------|--------|
//! | ready | store the routes, then mark `ready` once the routes are published |
//! | error | mark `failed` with the condition message, unless already failed |
//! | deleted | move to `deleting` |
//! | rejected | regenerate the placement id of a `provisioning` request |
//! | unknown, installing | nothing |
//!
//! Version fields are refreshed from every report. Failures of one instance are
//! logged and never stop the rest of the batch.

use super::clusters::ClusterService;
use super::dinosaur::DinosaurService;
use crate::constants::DEFAULT_INGRESS_DNS_NAME_PREFIX;
use crate::errors::{ErrorCode, Result, ServiceError};
use crate::metrics::record_dataplane_report;
use crate::models::{
    new_id, ready_condition, Cluster, DataPlaneCondition, DataPlaneDinosaurStatus,
    DataPlaneRoute, DinosaurRequest, DinosaurRoute, DinosaurStatus,
};
use crate::status_reasons::{
    reported_failure_reason, CONDITION_STATUS_TRUE, CONDITION_STATUS_UNKNOWN,
    CONDITION_TYPE_READY, REASON_APP_UPDATING, REASON_DELETED, REASON_ERROR,
    REASON_INSTALLING, REASON_OPERATOR_UPDATING, REASON_REJECTED,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Metric label of instance reports.
const REPORT_KIND: &str = "dinosaur";

/// Coarse state of an instance derived from an agent report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedStatus {
    Ready,
    Unknown,
    Installing,
    Deleted,
    Error,
    Rejected,
}

/// Reduce a condition list to a [`ReportedStatus`].
///
/// The first `Ready` condition that decides wins: a `True` status means ready and an
/// `Unknown` status means unknown whatever the reason. Otherwise the reason decides.
/// Conditions that decide nothing are skipped, and installing is the default.
#[must_use]
pub fn get_status(conditions: &[DataPlaneCondition]) -> ReportedStatus {
    for c in conditions
        .iter()
        .filter(|c| c.condition_type.eq_ignore_ascii_case(CONDITION_TYPE_READY))
    {
        if c.status.eq_ignore_ascii_case(CONDITION_STATUS_TRUE) {
            return ReportedStatus::Ready;
        }
        if c.status.eq_ignore_ascii_case(CONDITION_STATUS_UNKNOWN) {
            return ReportedStatus::Unknown;
        }
        let reason = &c.reason;
        if reason.eq_ignore_ascii_case(REASON_INSTALLING) {
            return ReportedStatus::Installing;
        }
        if reason.eq_ignore_ascii_case(REASON_DELETED) {
            return ReportedStatus::Deleted;
        }
        if reason.eq_ignore_ascii_case(REASON_ERROR) {
            return ReportedStatus::Error;
        }
        if reason.eq_ignore_ascii_case(REASON_REJECTED) {
            return ReportedStatus::Rejected;
        }
    }
    ReportedStatus::Installing
}

/// Build the stored routes of an instance from the routes its agent reported.
///
/// Every router must live under `base_domain`. A route with a prefix is published as
/// `{prefix}-{host}`, a route without one as the host itself.
///
/// # Errors
///
/// Returns a message naming the first router outside `base_domain`.
pub fn build_routes(
    reported: &[DataPlaneRoute],
    host: &str,
    base_domain: &str,
) -> std::result::Result<Vec<DinosaurRoute>, String> {
    reported
        .iter()
        .map(|r| {
            if !r.router.ends_with(base_domain) {
                return Err(format!(
                    "router domain is not valid. router = {}, expected domain = {base_domain}",
                    r.router
                ));
            }
            let domain = if r.prefix.is_empty() {
                host.to_string()
            } else {
                format!("{}-{host}", r.prefix)
            };
            Ok(DinosaurRoute {
                domain,
                router: r.router.clone(),
            })
        })
        .collect()
}

/// Applies instance status reports.
pub struct DataPlaneDinosaurService {
    dinosaur_service: Arc<dyn DinosaurService>,
    cluster_service: Arc<dyn ClusterService>,
}

impl DataPlaneDinosaurService {
    #[must_use]
    pub fn new(
        dinosaur_service: Arc<dyn DinosaurService>,
        cluster_service: Arc<dyn ClusterService>,
    ) -> Self {
        Self {
            dinosaur_service,
            cluster_service,
        }
    }

    /// Apply a batch of instance reports from the agent of `cluster_id`.
    ///
    /// Reports from a cluster that cannot process them yet are ignored.
    ///
    /// # Errors
    ///
    /// Returns a bad-request error if the cluster does not exist. Failures of single
    /// instances are logged, never returned.
    pub async fn update_dataplane_dinosaur_status(
        &self,
        cluster_id: &str,
        reports: &[DataPlaneDinosaurStatus],
    ) -> Result<()> {
        let cluster = self
            .cluster_service
            .find_cluster_by_id(cluster_id)
            .await?
            .ok_or_else(|| {
                ServiceError::bad_request(format!("Cluster id {cluster_id} not found"))
            })?;

        if !cluster.status.can_process_status_reports() {
            debug!(
                cluster_id = %cluster_id,
                status = %cluster.status,
                "cluster cannot process status reports yet"
            );
            record_dataplane_report(REPORT_KIND, "ignored");
            return Ok(());
        }

        for report in reports {
            let dinosaur = match self.dinosaur_service.get_by_id(&report.dinosaur_id).await {
                Ok(d) => d,
                Err(e) => {
                    error!(
                        dinosaur_id = %report.dinosaur_id,
                        error = %e,
                        "failed to get dinosaur by id"
                    );
                    continue;
                }
            };
            if dinosaur.cluster_id != cluster_id {
                warn!(
                    dinosaur_id = %dinosaur.id,
                    dinosaur_cluster_id = %dinosaur.cluster_id,
                    cluster_id = %cluster_id,
                    "cluster id of the dinosaur does not match the reporting cluster"
                );
                continue;
            }

            if let Err(e) = self.apply_status(&dinosaur, report, &cluster).await {
                error!(dinosaur_id = %dinosaur.id, error = %e, "error updating dinosaur status");
            }
            if let Err(e) = self.set_version_fields(&dinosaur, report).await {
                error!(
                    dinosaur_id = %dinosaur.id,
                    error = %e,
                    "error updating dinosaur version fields"
                );
            }
        }
        record_dataplane_report(REPORT_KIND, "processed");
        Ok(())
    }

    async fn apply_status(
        &self,
        dinosaur: &DinosaurRequest,
        report: &DataPlaneDinosaurStatus,
        cluster: &Cluster,
    ) -> Result<()> {
        match get_status(&report.conditions) {
            ReportedStatus::Ready => {
                self.persist_routes(dinosaur, report, cluster).await?;
                self.set_ready(dinosaur).await
            }
            ReportedStatus::Error => {
                let message = ready_condition(&report.conditions)
                    .map(|c| c.message.clone())
                    .unwrap_or_default();
                self.set_failed(dinosaur, &message).await
            }
            ReportedStatus::Deleted => {
                self.dinosaur_service
                    .update_status(&dinosaur.id, DinosaurStatus::Deleting)
                    .await?;
                Ok(())
            }
            ReportedStatus::Rejected => self.reassign(dinosaur).await,
            ReportedStatus::Unknown => {
                info!(dinosaur_id = %dinosaur.id, "dinosaur status is unknown");
                Ok(())
            }
            ReportedStatus::Installing => {
                debug!(dinosaur_id = %dinosaur.id, "dinosaur is still installing");
                Ok(())
            }
        }
    }

    /// Store the routes of the instance. Routes are stored once; later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns a bad-request error if a router is outside the cluster domain.
    pub async fn persist_routes(
        &self,
        dinosaur: &DinosaurRequest,
        report: &DataPlaneDinosaurStatus,
        cluster: &Cluster,
    ) -> Result<()> {
        if dinosaur.routes.is_some() {
            debug!(dinosaur_id = %dinosaur.id, "routes already stored");
            return Ok(());
        }

        let cluster_dns = self
            .cluster_service
            .get_cluster_dns(&cluster.id)
            .await
            .map_err(|e| {
                ServiceError::with_cause(
                    e.code,
                    &e,
                    format!("failed to get DNS entry for cluster {}", cluster.id),
                )
            })?;
        let prefix = format!("{DEFAULT_INGRESS_DNS_NAME_PREFIX}.");
        let base_domain = cluster_dns.strip_prefix(&prefix).unwrap_or(&cluster_dns);

        let routes = build_routes(&report.routes, &dinosaur.host, base_domain).map_err(|e| {
            ServiceError::with_cause(ErrorCode::BadRequest, e, "routes are not valid")
        })?;

        info!(dinosaur_id = %dinosaur.id, count = routes.len(), "storing routes");
        self.dinosaur_service
            .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
                if d.routes.is_none() {
                    d.routes = Some(routes.clone());
                }
            })
            .await?;
        Ok(())
    }

    async fn set_ready(&self, dinosaur: &DinosaurRequest) -> Result<()> {
        if !dinosaur.routes_created {
            debug!(dinosaur_id = %dinosaur.id, "routes are not created yet");
            return Ok(());
        }
        let changed = self
            .dinosaur_service
            .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
                d.failed_reason.clear();
                d.status = DinosaurStatus::Ready;
            })
            .await
            .map_err(|e| {
                ServiceError::with_cause(
                    e.code,
                    &e,
                    format!("failed to update status ready for dinosaur cluster {}", dinosaur.id),
                )
            })?;
        if changed && dinosaur.status != DinosaurStatus::Ready {
            info!(dinosaur_id = %dinosaur.id, "dinosaur is ready");
        }
        Ok(())
    }

    async fn set_failed(&self, dinosaur: &DinosaurRequest, message: &str) -> Result<()> {
        if dinosaur.status == DinosaurStatus::Failed {
            return Ok(());
        }
        let reason = reported_failure_reason(message);
        self.dinosaur_service
            .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
                d.status = DinosaurStatus::Failed;
                d.failed_reason.clone_from(&reason);
            })
            .await?;
        error!(
            dinosaur_id = %dinosaur.id,
            cluster_id = %dinosaur.cluster_id,
            message = %message,
            "dinosaur reported as failed by the fleetshard operator"
        );
        Ok(())
    }

    async fn reassign(&self, dinosaur: &DinosaurRequest) -> Result<()> {
        if dinosaur.status != DinosaurStatus::Provisioning {
            info!(
                dinosaur_id = %dinosaur.id,
                status = %dinosaur.status,
                "dinosaur is rejected outside provisioning, ignoring"
            );
            return Ok(());
        }
        let placement_id = new_id();
        self.dinosaur_service
            .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
                if d.status == DinosaurStatus::Provisioning {
                    d.placement_id.clone_from(&placement_id);
                }
            })
            .await?;
        info!(
            dinosaur_id = %dinosaur.id,
            placement_id = %placement_id,
            "dinosaur rejected, placement regenerated"
        );
        Ok(())
    }

    async fn set_version_fields(
        &self,
        dinosaur: &DinosaurRequest,
        report: &DataPlaneDinosaurStatus,
    ) -> Result<()> {
        let mut app_version = dinosaur.actual_app_version.clone();
        let mut operator_version = dinosaur.actual_operator_version.clone();
        let mut app_upgrading = dinosaur.app_upgrading;
        let mut operator_upgrading = dinosaur.operator_upgrading;

        if !report.app_version.is_empty() && report.app_version != app_version {
            info!(
                dinosaur_id = %dinosaur.id,
                from = %app_version,
                to = %report.app_version,
                "updating dinosaur version"
            );
            app_version.clone_from(&report.app_version);
        }
        if !report.operator_version.is_empty() && report.operator_version != operator_version {
            info!(
                dinosaur_id = %dinosaur.id,
                from = %operator_version,
                to = %report.operator_version,
                "updating dinosaur operator version"
            );
            operator_version.clone_from(&report.operator_version);
        }
        if let Some(ready) = ready_condition(&report.conditions) {
            operator_upgrading = ready.reason == REASON_OPERATOR_UPDATING;
            app_upgrading = ready.reason == REASON_APP_UPDATING;
        }

        let needs_update = app_version != dinosaur.actual_app_version
            || operator_version != dinosaur.actual_operator_version
            || app_upgrading != dinosaur.app_upgrading
            || operator_upgrading != dinosaur.operator_upgrading;
        if !needs_update {
            return Ok(());
        }

        self.dinosaur_service
            .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
                d.actual_app_version.clone_from(&app_version);
                d.actual_operator_version.clone_from(&operator_version);
                d.app_upgrading = app_upgrading;
                d.operator_upgrading = operator_upgrading;
            })
            .await
            .map_err(|e| {
                ServiceError::with_cause(
                    e.code,
                    &e,
                    format!(
                        "failed to update actual version fields for dinosaur cluster {}",
                        dinosaur.id
                    ),
                )
            })?;
        Ok(())
    }
}
