// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Placement of accepted requests.
//!
//! Every tick, each `accepted` request is offered to the
//! [`ClusterPlacementStrategy`]. When a cluster qualifies the request is assigned to it,
//! its desired operator and application versions are resolved and it moves to
//! `preparing`. When none qualifies the request is left untouched until the next tick.

use super::Reconcile;
use crate::config::DataplaneClusterConfig;
use crate::constants::WORKER_ACCEPTED;
use crate::errors::ServiceError;
use crate::models::{Cluster, DinosaurRequest, DinosaurStatus};
use crate::services::{ClusterPlacementStrategy, DinosaurService};
use crate::status_reasons::FAILED_REASON_NO_OPERATOR_VERSION;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct AcceptedDinosaurReconciler {
    dinosaur_service: Arc<dyn DinosaurService>,
    placement: Arc<dyn ClusterPlacementStrategy>,
    dataplane_config: Arc<DataplaneClusterConfig>,
}

impl AcceptedDinosaurReconciler {
    #[must_use]
    pub fn new(
        dinosaur_service: Arc<dyn DinosaurService>,
        placement: Arc<dyn ClusterPlacementStrategy>,
        dataplane_config: Arc<DataplaneClusterConfig>,
    ) -> Self {
        Self {
            dinosaur_service,
            placement,
            dataplane_config,
        }
    }

    /// Operator version to install on `cluster`: the configured override, else the
    /// newest version the cluster reports as ready.
    fn desired_operator_version(&self, cluster: &Cluster) -> Option<String> {
        self.dataplane_config
            .operator_version_override(&cluster.id)
            .map(ToString::to_string)
            .or_else(|| {
                cluster
                    .ready_operator_versions()
                    .last()
                    .map(|v| v.version.clone())
            })
    }

    /// Place one accepted request.
    ///
    /// # Errors
    ///
    /// Returns an error if placement fails, if no operator or application version
    /// can be resolved, or if the request cannot be persisted.
    pub async fn reconcile_accepted_dinosaur(
        &self,
        dinosaur: &DinosaurRequest,
    ) -> anyhow::Result<()> {
        let Some(cluster) = self
            .placement
            .find_cluster(dinosaur)
            .await
            .with_context(|| {
                format!("failed to find cluster for dinosaur request {}", dinosaur.id)
            })?
        else {
            warn!(
                dinosaur_id = %dinosaur.id,
                region = %dinosaur.region,
                "no available cluster found for dinosaur request"
            );
            return Ok(());
        };

        let Some(operator_version) = self.desired_operator_version(&cluster) else {
            let id = dinosaur.id.clone();
            let cluster_id = cluster.id.clone();
            self.dinosaur_service
                .update_fields(&id, &|d: &mut DinosaurRequest| {
                    d.cluster_id.clone_from(&cluster_id);
                    d.status = DinosaurStatus::Failed;
                    d.failed_reason = FAILED_REASON_NO_OPERATOR_VERSION.to_string();
                })
                .await
                .with_context(|| format!("failed to update failed dinosaur {id}"))?;
            return Err(anyhow!(ServiceError::general(FAILED_REASON_NO_OPERATOR_VERSION)))
                .with_context(|| format!("dinosaur {id} failed on cluster {}", cluster.id));
        };

        let app_version = cluster
            .available_operator_versions
            .iter()
            .find(|v| v.version == operator_version)
            .and_then(|v| v.app_versions.last())
            .cloned()
            .ok_or_else(|| anyhow!("failed to get dinosaur version {}", dinosaur.id))?;

        self.dinosaur_service
            .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
                d.cluster_id.clone_from(&cluster.id);
                d.desired_operator_version.clone_from(&operator_version);
                d.desired_app_version.clone_from(&app_version);
                d.status = DinosaurStatus::Preparing;
            })
            .await
            .with_context(|| {
                format!("failed to update dinosaur {} with cluster details", dinosaur.id)
            })?;

        info!(
            dinosaur_id = %dinosaur.id,
            cluster_id = %cluster.id,
            operator_version = %operator_version,
            app_version = %app_version,
            "dinosaur request placed"
        );
        Ok(())
    }
}

#[async_trait]
impl Reconcile for AcceptedDinosaurReconciler {
    fn name(&self) -> &'static str {
        WORKER_ACCEPTED
    }

    async fn reconcile(&self) -> Vec<anyhow::Error> {
        let dinosaurs = match self
            .dinosaur_service
            .list_by_status(&[DinosaurStatus::Accepted])
            .await
        {
            Ok(dinosaurs) => dinosaurs,
            Err(e) => return vec![anyhow!(e).context("failed to list accepted dinosaurs")],
        };
        debug!(count = dinosaurs.len(), "reconciling accepted dinosaurs");

        let mut errors = Vec::new();
        for dinosaur in &dinosaurs {
            if let Err(e) = self.reconcile_accepted_dinosaur(dinosaur).await {
                error!(
                    dinosaur_id = %dinosaur.id,
                    error = %e,
                    "failed to reconcile accepted dinosaur"
                );
                errors.push(e);
            }
        }
        errors
    }
}
