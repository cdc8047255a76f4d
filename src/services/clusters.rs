// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster service.
//!
//! Owns the [`Cluster`] rows and forwards provider work (create, status checks,
//! terraforming, deletion) to the [`Provider`](crate::providers::Provider) of each
//! cluster, selected through the [`ProviderFactory`].

use crate::errors::{ErrorCode, Result, ServiceError};
use crate::models::{
    Cluster, ClusterInstanceCount, ClusterStatus, DinosaurStatus, FindClusterCriteria,
};
use crate::providers::{
    ClusterRequest, ClusterSpec, Parameter, Provider, ProviderFactory, ResourceSet,
};
use crate::store::{ClusterStore, DinosaurStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Operations on data-plane clusters.
#[async_trait]
pub trait ClusterService: Send + Sync {
    /// Store a new cluster row.
    async fn register_cluster(&self, cluster: &Cluster) -> Result<()>;

    /// `Ok(None)` when no live cluster has the id.
    async fn find_cluster_by_id(&self, cluster_id: &str) -> Result<Option<Cluster>>;

    /// Oldest cluster matching `criteria`.
    async fn find_cluster(&self, criteria: &FindClusterCriteria) -> Result<Option<Cluster>>;

    /// Every cluster matching `criteria`, oldest first.
    async fn find_all_clusters(&self, criteria: &FindClusterCriteria) -> Result<Vec<Cluster>>;

    /// Live instances per cluster, not counting accepted requests. Every requested id
    /// gets an entry, zero if it hosts nothing.
    async fn find_instance_count(&self, cluster_ids: &[String])
        -> Result<Vec<ClusterInstanceCount>>;

    async fn list_by_status(&self, status: ClusterStatus) -> Result<Vec<Cluster>>;

    /// Ids of every live cluster, oldest first.
    async fn list_all_cluster_ids(&self) -> Result<Vec<String>>;

    /// Overwrite the stored row with `cluster`.
    async fn update(&self, cluster: &Cluster) -> Result<()>;

    async fn update_status(&self, cluster_id: &str, status: ClusterStatus) -> Result<()>;

    /// Move several clusters to `status`. Clusters in cleanup are never moved back to
    /// deprovisioning. Returns the number of clusters changed.
    async fn update_multi_cluster_status(
        &self,
        cluster_ids: &[String],
        status: ClusterStatus,
    ) -> Result<usize>;

    async fn delete_by_cluster_id(&self, cluster_id: &str) -> Result<()>;

    /// Ingress domain of the cluster, fetched from the provider and cached on first use.
    async fn get_cluster_dns(&self, cluster_id: &str) -> Result<String>;

    /// Create the cluster at its provider and persist the provider's view of it.
    async fn create(&self, cluster: &Cluster) -> Result<Cluster>;

    /// Refresh a provisioning cluster from its provider and persist the result.
    async fn check_cluster_status(&self, cluster: &Cluster) -> Result<Cluster>;

    /// Delete the cluster at its provider. Returns `true` once it is gone.
    async fn delete(&self, cluster: &Cluster) -> Result<bool>;

    async fn apply_resources(&self, cluster: &Cluster, resources: ResourceSet) -> Result<()>;

    async fn install_operator(&self, cluster: &Cluster) -> Result<bool>;

    async fn install_fleetshard(&self, cluster: &Cluster, params: &[Parameter]) -> Result<bool>;

    /// Whether `operator_version` is advertised as ready by the cluster.
    fn check_operator_version_ready(&self, cluster: &Cluster, operator_version: &str) -> bool;

    /// Whether the ready `operator_version` of the cluster can run `app_version`.
    fn is_app_version_available_in_cluster(
        &self,
        cluster: &Cluster,
        operator_version: &str,
        app_version: &str,
    ) -> bool;
}

/// [`ClusterService`] over a [`ClusterStore`].
pub struct DefaultClusterService {
    clusters: Arc<ClusterStore>,
    dinosaurs: Arc<DinosaurStore>,
    providers: ProviderFactory,
}

impl DefaultClusterService {
    #[must_use]
    pub fn new(
        clusters: Arc<ClusterStore>,
        dinosaurs: Arc<DinosaurStore>,
        providers: ProviderFactory,
    ) -> Self {
        Self {
            clusters,
            dinosaurs,
            providers,
        }
    }

    fn provider(&self, cluster: &Cluster) -> Result<Arc<dyn Provider>> {
        self.providers.get_provider(cluster.provider_type).map_err(|e| {
            ServiceError::with_cause(
                ErrorCode::General,
                &e,
                "failed to get provider implementation",
            )
        })
    }

    async fn matching(&self, criteria: &FindClusterCriteria) -> Result<Vec<Cluster>> {
        let mut matching: Vec<Cluster> = self
            .clusters
            .list()
            .await
            .map_err(|e| wrap(e, "failed to find all clusters with criteria"))?
            .into_iter()
            .filter(|c| criteria.matches(c))
            .collect();
        matching.sort_by_key(|c| c.created_at);
        Ok(matching)
    }
}

fn wrap(err: impl std::fmt::Display, reason: impl Into<String>) -> ServiceError {
    ServiceError::with_cause(ErrorCode::General, err, reason)
}

#[async_trait]
impl ClusterService for DefaultClusterService {
    async fn register_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.clusters
            .insert(cluster)
            .await
            .map_err(|e| wrap(e, "failed to register cluster job"))
    }

    async fn find_cluster_by_id(&self, cluster_id: &str) -> Result<Option<Cluster>> {
        if cluster_id.is_empty() {
            return Err(ServiceError::validation("clusterID is undefined"));
        }
        self.clusters
            .get(cluster_id)
            .await
            .map_err(|e| wrap(e, format!("failed to find cluster with id: {cluster_id}")))
    }

    async fn find_cluster(&self, criteria: &FindClusterCriteria) -> Result<Option<Cluster>> {
        Ok(self.matching(criteria).await?.into_iter().next())
    }

    async fn find_all_clusters(&self, criteria: &FindClusterCriteria) -> Result<Vec<Cluster>> {
        self.matching(criteria).await
    }

    async fn find_instance_count(
        &self,
        cluster_ids: &[String],
    ) -> Result<Vec<ClusterInstanceCount>> {
        let rows = self
            .dinosaurs
            .list()
            .await
            .map_err(|e| wrap(e, "failed to query by cluster info"))?;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for row in rows
            .iter()
            .filter(|d| d.status != DinosaurStatus::Accepted && !d.cluster_id.is_empty())
            .filter(|d| cluster_ids.is_empty() || cluster_ids.contains(&d.cluster_id))
        {
            *counts.entry(row.cluster_id.as_str()).or_default() += 1;
        }

        let mut result: Vec<ClusterInstanceCount> = counts
            .into_iter()
            .map(|(cluster_id, count)| ClusterInstanceCount {
                cluster_id: cluster_id.to_string(),
                count,
            })
            .collect();
        result.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));

        for id in cluster_ids {
            if !result.iter().any(|c| &c.cluster_id == id) {
                result.push(ClusterInstanceCount {
                    cluster_id: id.clone(),
                    count: 0,
                });
            }
        }
        Ok(result)
    }

    async fn list_by_status(&self, status: ClusterStatus) -> Result<Vec<Cluster>> {
        Ok(self
            .clusters
            .list()
            .await
            .map_err(|e| wrap(e, "failed to query by status"))?
            .into_iter()
            .filter(|c| c.status == status)
            .collect())
    }

    async fn list_all_cluster_ids(&self) -> Result<Vec<String>> {
        let mut clusters = self
            .clusters
            .list()
            .await
            .map_err(|e| wrap(e, "failed to query by cluster info"))?;
        clusters.sort_by_key(|c| c.created_at);
        Ok(clusters.into_iter().map(|c| c.id).collect())
    }

    async fn update(&self, cluster: &Cluster) -> Result<()> {
        if cluster.id.is_empty() {
            return Err(ServiceError::validation("id is undefined"));
        }
        let replacement = cluster.clone();
        let updated = self
            .clusters
            .update_where(&cluster.id, &|_: &Cluster| true, &|row: &mut Cluster| {
                let created_at = row.created_at;
                *row = replacement.clone();
                row.created_at = created_at;
            })
            .await
            .map_err(|e| wrap(e, "failed to update cluster"))?;
        if !updated {
            return Err(ServiceError::not_found(format!(
                "cluster with id='{}' not found",
                cluster.id
            )));
        }
        Ok(())
    }

    async fn update_status(&self, cluster_id: &str, status: ClusterStatus) -> Result<()> {
        if cluster_id.is_empty() {
            return Err(ServiceError::validation("id is undefined"));
        }
        self.clusters
            .update_where(cluster_id, &|_: &Cluster| true, &|row: &mut Cluster| row.status = status)
            .await
            .map_err(|e| wrap(e, "failed to update cluster status"))?;
        info!(cluster_id = %cluster_id, status = %status, "cluster status updated");
        Ok(())
    }

    async fn update_multi_cluster_status(
        &self,
        cluster_ids: &[String],
        status: ClusterStatus,
    ) -> Result<usize> {
        if cluster_ids.is_empty() {
            return Err(ServiceError::validation("ids is empty"));
        }
        let changed = self
            .clusters
            .update_many(
                &|c: &Cluster| {
                    cluster_ids.contains(&c.id)
                        && !(status == ClusterStatus::Deprovisioning
                            && c.status == ClusterStatus::Cleanup)
                },
                &|c: &mut Cluster| c.status = status,
            )
            .await
            .map_err(|e| wrap(e, format!("failed to update status: {cluster_ids:?}")))?;
        Ok(changed)
    }

    async fn delete_by_cluster_id(&self, cluster_id: &str) -> Result<()> {
        self.clusters.soft_delete(cluster_id).await.map_err(|e| {
            wrap(e, format!("Unable to delete cluster with cluster_id {cluster_id}"))
        })?;
        info!(cluster_id = %cluster_id, "cluster deleted");
        Ok(())
    }

    async fn get_cluster_dns(&self, cluster_id: &str) -> Result<String> {
        let cluster = self.find_cluster_by_id(cluster_id).await?.ok_or_else(|| {
            ServiceError::not_found(format!("cluster with id='{cluster_id}' not found"))
        })?;
        if !cluster.cluster_dns.is_empty() {
            return Ok(cluster.cluster_dns);
        }

        let dns = self
            .provider(&cluster)?
            .get_cluster_dns(&ClusterSpec::from(&cluster))
            .await
            .map_err(|e| wrap(e, "failed to get cluster DNS from provider"))?;
        let cached = dns.clone();
        self.clusters
            .update_where(cluster_id, &|_: &Cluster| true, &|row: &mut Cluster| {
                row.cluster_dns.clone_from(&cached);
            })
            .await
            .map_err(|e| wrap(e, "failed to update cluster DNS"))?;
        debug!(cluster_id = %cluster_id, cluster_dns = %dns, "cached cluster DNS");
        Ok(dns)
    }

    async fn create(&self, cluster: &Cluster) -> Result<Cluster> {
        let request = ClusterRequest {
            cloud_provider: cluster.cloud_provider.clone(),
            region: cluster.region.clone(),
            multi_az: cluster.multi_az,
        };
        let spec = self
            .provider(cluster)?
            .create(&request)
            .await
            .map_err(|e| wrap(e, "failed to create cluster"))?;

        let mut created = cluster.clone();
        created.external_id = spec.external_id;
        created.status = spec.status;
        self.update(&created).await?;
        Ok(created)
    }

    async fn check_cluster_status(&self, cluster: &Cluster) -> Result<Cluster> {
        let spec = self
            .provider(cluster)?
            .check_cluster_status(&ClusterSpec::from(cluster))
            .await
            .map_err(|e| wrap(e, "failed to check cluster status"))?;

        let mut checked = cluster.clone();
        checked.status = spec.status;
        if !spec.external_id.is_empty() && checked.external_id.is_empty() {
            checked.external_id = spec.external_id;
        }
        self.update(&checked).await?;
        Ok(checked)
    }

    async fn delete(&self, cluster: &Cluster) -> Result<bool> {
        self.provider(cluster)?
            .delete(&ClusterSpec::from(cluster))
            .await
            .map_err(|e| wrap(e, "failed to delete the cluster from the provider"))
    }

    async fn apply_resources(&self, cluster: &Cluster, resources: ResourceSet) -> Result<()> {
        let name = resources.name.clone();
        self.provider(cluster)?
            .apply_resources(&ClusterSpec::from(cluster), resources)
            .await
            .map_err(|e| wrap(e, format!("failed to apply resources {name}")))?;
        Ok(())
    }

    async fn install_operator(&self, cluster: &Cluster) -> Result<bool> {
        self.provider(cluster)?
            .install_operator(&ClusterSpec::from(cluster))
            .await
            .map_err(|e| {
                wrap(
                    e,
                    format!("failed to install dinosaur operator for cluster {}", cluster.id),
                )
            })
    }

    async fn install_fleetshard(&self, cluster: &Cluster, params: &[Parameter]) -> Result<bool> {
        self.provider(cluster)?
            .install_fleetshard(&ClusterSpec::from(cluster), params)
            .await
            .map_err(|e| {
                wrap(
                    e,
                    format!("failed to install fleetshard for cluster {}", cluster.id),
                )
            })
    }

    fn check_operator_version_ready(&self, cluster: &Cluster, operator_version: &str) -> bool {
        cluster
            .ready_operator_versions()
            .iter()
            .any(|v| v.version == operator_version)
    }

    fn is_app_version_available_in_cluster(
        &self,
        cluster: &Cluster,
        operator_version: &str,
        app_version: &str,
    ) -> bool {
        cluster
            .ready_operator_versions()
            .iter()
            .find(|v| v.version == operator_version)
            .is_some_and(|v| v.app_versions.iter().any(|a| a == app_version))
    }
}
