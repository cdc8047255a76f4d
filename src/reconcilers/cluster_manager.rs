// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Lifecycle of data-plane clusters.
//!
//! Each tick runs these steps in order, each collecting its own errors:
//!
//! 1. **Configuration** - with manual scaling, register configured clusters missing
//!    from the store and deprovision stored clusters that left the configuration,
//!    once they host no instance
//! 2. **Deprovisioning** - delete empty clusters at their provider, then move them
//!    to `cleanup`
//! 3. **Cleanup** - soft delete the cluster rows
//! 4. **Accepted** - create the cluster at its provider (`provisioning`)
//! 5. **Provisioning** - refresh the cluster from its provider (`provisioned`)
//! 6. **Provisioned** - resolve the ingress domain, apply the cluster resources and
//!    install the operator and the fleetshard agent; once both are ready the cluster
//!    waits for its agent (`waiting_for_fleetshard_operator`)
//!
//! From there the agent takes over through the data-plane cluster status protocol.

use super::Reconcile;
use crate::config::{DataplaneClusterConfig, ManualCluster};
use crate::constants::{
    CLUSTER_RESOURCE_SET, FLEETSHARD_NAMESPACE, FLEETSHARD_PARAM_CLUSTER_ID,
    WORKER_CLUSTER_MANAGER,
};
use crate::models::{Cluster, ClusterStatus};
use crate::providers::{Parameter, ResourceSet};
use crate::services::ClusterService;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// New cluster row for a configured cluster.
fn cluster_from_config(config: &ManualCluster) -> Cluster {
    let mut cluster = Cluster::new(&config.cluster_id, &config.cloud_provider, &config.region);
    cluster.multi_az = config.multi_az;
    cluster.status = config.status;
    cluster.provider_type = config.provider_type;
    cluster.cluster_dns.clone_from(&config.cluster_dns);
    cluster.supported_instance_type.clone_from(&config.supported_instance_type);
    cluster
}

/// Resources every cluster carries before its operators are installed.
fn cluster_resources() -> ResourceSet {
    ResourceSet {
        name: CLUSTER_RESOURCE_SET.to_string(),
        resources: vec![json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": FLEETSHARD_NAMESPACE },
        })],
    }
}

/// Run `step` over every cluster in `status`, collecting the errors.
macro_rules! for_each_cluster {
    ($self:ident, $status:expr, $step:ident) => {{
        let mut errors = Vec::new();
        match $self.cluster_service.list_by_status($status).await {
            Ok(clusters) => {
                for cluster in &clusters {
                    if let Err(e) = $self.$step(cluster).await {
                        error!(
                            cluster_id = %cluster.id,
                            status = %$status,
                            error = %e,
                            "failed to reconcile cluster"
                        );
                        errors.push(e);
                    }
                }
            }
            Err(e) => {
                errors.push(anyhow!(e).context(format!("failed to list {} clusters", $status)))
            }
        }
        errors
    }};
}

pub struct ClusterManager {
    cluster_service: Arc<dyn ClusterService>,
    dataplane_config: Arc<DataplaneClusterConfig>,
}

impl ClusterManager {
    #[must_use]
    pub fn new(
        cluster_service: Arc<dyn ClusterService>,
        dataplane_config: Arc<DataplaneClusterConfig>,
    ) -> Self {
        Self {
            cluster_service,
            dataplane_config,
        }
    }

    /// Align the stored clusters with the configured ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or a cluster cannot be registered
    /// or deprovisioned.
    pub async fn reconcile_clusters_with_config(&self) -> anyhow::Result<()> {
        if !self.dataplane_config.is_manual_scaling_enabled() {
            debug!("manual cluster configuration reconciliation is skipped as it is disabled");
            return Ok(());
        }

        let known: HashSet<String> = self
            .cluster_service
            .list_all_cluster_ids()
            .await
            .context("failed to retrieve cluster ids from clusters")?
            .into_iter()
            .collect();

        for config in self.dataplane_config.missing_clusters(&known) {
            self.cluster_service
                .register_cluster(&cluster_from_config(config))
                .await
                .with_context(|| {
                    format!("failed to register new cluster {} with config file", config.cluster_id)
                })?;
            info!(cluster_id = %config.cluster_id, "registered a new cluster with config file");
        }

        let excess: Vec<String> = known
            .into_iter()
            .filter(|id| self.dataplane_config.cluster(id).is_none())
            .collect();
        if excess.is_empty() {
            return Ok(());
        }

        let counts = self
            .cluster_service
            .find_instance_count(&excess)
            .await
            .with_context(|| format!("failed to find dinosaur count of clusters {excess:?}"))?;
        let mut to_deprovision = Vec::new();
        for count in counts {
            if count.count > 0 {
                info!(
                    cluster_id = %count.cluster_id,
                    count = count.count,
                    "excess cluster is not deleted while it hosts dinosaurs"
                );
            } else {
                to_deprovision.push(count.cluster_id);
            }
        }
        if to_deprovision.is_empty() {
            return Ok(());
        }

        let changed = self
            .cluster_service
            .update_multi_cluster_status(&to_deprovision, ClusterStatus::Deprovisioning)
            .await
            .with_context(|| format!("failed to deprovision clusters {to_deprovision:?}"))?;
        if changed > 0 {
            info!(clusters = ?to_deprovision, "deprovisioning clusters not found in config file");
        }
        Ok(())
    }

    async fn reconcile_deprovisioning_cluster(&self, cluster: &Cluster) -> anyhow::Result<()> {
        let counts = self
            .cluster_service
            .find_instance_count(std::slice::from_ref(&cluster.id))
            .await
            .with_context(|| format!("failed to find dinosaur count of cluster {}", cluster.id))?;
        if counts.iter().any(|c| c.count > 0) {
            debug!(cluster_id = %cluster.id, "cluster still hosts dinosaurs, waiting");
            return Ok(());
        }

        if !self.cluster_service.delete(cluster).await? {
            return Ok(());
        }
        info!(cluster_id = %cluster.id, "cluster has been removed from its provider");
        self.cluster_service
            .update_status(&cluster.id, ClusterStatus::Cleanup)
            .await
            .with_context(|| {
                format!(
                    "failed to update deprovisioning cluster {} status to 'cleanup'",
                    cluster.id,
                )
            })
    }

    async fn reconcile_cleanup_cluster(&self, cluster: &Cluster) -> anyhow::Result<()> {
        self.cluster_service
            .delete_by_cluster_id(&cluster.id)
            .await
            .with_context(|| {
                format!("failed to soft delete cluster {} from the store", cluster.id)
            })?;
        info!(cluster_id = %cluster.id, "cluster deleted");
        Ok(())
    }

    async fn reconcile_accepted_cluster(&self, cluster: &Cluster) -> anyhow::Result<()> {
        let created = self
            .cluster_service
            .create(cluster)
            .await
            .with_context(|| format!("failed to create cluster for request {}", cluster.id))?;
        info!(cluster_id = %cluster.id, status = %created.status, "cluster creation requested");
        Ok(())
    }

    async fn reconcile_provisioning_cluster(&self, cluster: &Cluster) -> anyhow::Result<()> {
        let checked = self
            .cluster_service
            .check_cluster_status(cluster)
            .await
            .with_context(|| format!("failed to check status of cluster {}", cluster.id))?;
        if checked.status != cluster.status {
            info!(
                cluster_id = %cluster.id,
                from = %cluster.status,
                to = %checked.status,
                "cluster status changed"
            );
        }
        Ok(())
    }

    async fn reconcile_provisioned_cluster(&self, cluster: &Cluster) -> anyhow::Result<()> {
        if cluster.cluster_dns.is_empty() {
            self.cluster_service
                .get_cluster_dns(&cluster.id)
                .await
                .with_context(|| format!("failed to reconcile DNS of cluster {}", cluster.id))?;
        }

        self.cluster_service
            .apply_resources(cluster, cluster_resources())
            .await
            .with_context(|| format!("failed to apply resources for cluster {}", cluster.id))?;

        let operator_ready = self
            .cluster_service
            .install_operator(cluster)
            .await
            .with_context(|| {
                format!("failed to install dinosaur operator on cluster {}", cluster.id)
            })?;
        let params = [Parameter {
            id: FLEETSHARD_PARAM_CLUSTER_ID.to_string(),
            value: cluster.id.clone(),
        }];
        let fleetshard_ready = self
            .cluster_service
            .install_fleetshard(cluster, &params)
            .await
            .with_context(|| {
                format!("failed to install fleetshard operator on cluster {}", cluster.id)
            })?;
        debug!(
            cluster_id = %cluster.id,
            operator_ready,
            fleetshard_ready,
            "operator installation status"
        );

        if operator_ready && fleetshard_ready {
            self.cluster_service
                .update_status(&cluster.id, ClusterStatus::WaitingForFleetshardOperator)
                .await
                .with_context(|| format!("failed to update local cluster {} status", cluster.id))?;
            info!(cluster_id = %cluster.id, "cluster waiting for its fleetshard operator");
        }
        Ok(())
    }
}

#[async_trait]
impl Reconcile for ClusterManager {
    fn name(&self) -> &'static str {
        WORKER_CLUSTER_MANAGER
    }

    async fn reconcile(&self) -> Vec<anyhow::Error> {
        let mut errors = Vec::new();
        if let Err(e) = self.reconcile_clusters_with_config().await {
            error!(error = %e, "failed to reconcile configured clusters");
            errors.push(e);
        }
        errors.extend(for_each_cluster!(
            self,
            ClusterStatus::Deprovisioning,
            reconcile_deprovisioning_cluster
        ));
        errors.extend(for_each_cluster!(self, ClusterStatus::Cleanup, reconcile_cleanup_cluster));
        errors.extend(for_each_cluster!(self, ClusterStatus::Accepted, reconcile_accepted_cluster));
        errors.extend(for_each_cluster!(
            self,
            ClusterStatus::Provisioning,
            reconcile_provisioning_cluster
        ));
        errors.extend(for_each_cluster!(
            self,
            ClusterStatus::Provisioned,
            reconcile_provisioned_cluster
        ));
        errors
    }
}
