// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster placement strategies.
//!
//! A [`ClusterPlacementStrategy`] picks the cluster a new instance is assigned to.
//! Finding no cluster is not an error: the caller leaves the request in `accepted`
//! and tries again on its next tick. Placement never writes anything.

use super::clusters::ClusterService;
use crate::config::DataplaneClusterConfig;
use crate::errors::Result;
use crate::models::{Cluster, ClusterStatus, DinosaurRequest, FindClusterCriteria};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait ClusterPlacementStrategy: Send + Sync {
    /// Cluster the request should be placed on, `None` if no cluster qualifies.
    async fn find_cluster(&self, dinosaur: &DinosaurRequest) -> Result<Option<Cluster>>;
}

/// Pick the strategy matching the scaling mode of the data plane.
#[must_use]
pub fn new_cluster_placement_strategy(
    cluster_service: Arc<dyn ClusterService>,
    dataplane_config: Arc<DataplaneClusterConfig>,
) -> Arc<dyn ClusterPlacementStrategy> {
    if dataplane_config.is_manual_scaling_enabled() {
        Arc::new(FirstSchedulableWithinLimit::new(
            cluster_service,
            dataplane_config,
        ))
    } else {
        Arc::new(FirstReadyCluster::new(cluster_service))
    }
}

fn criteria_for(dinosaur: &DinosaurRequest) -> FindClusterCriteria {
    FindClusterCriteria {
        provider: dinosaur.cloud_provider.clone(),
        region: dinosaur.region.clone(),
        multi_az: dinosaur.multi_az,
        status: Some(ClusterStatus::Ready),
        supported_instance_type: Some(dinosaur.instance_type),
    }
}

/// Oldest ready cluster matching the request.
pub struct FirstReadyCluster {
    cluster_service: Arc<dyn ClusterService>,
}

impl FirstReadyCluster {
    #[must_use]
    pub fn new(cluster_service: Arc<dyn ClusterService>) -> Self {
        Self { cluster_service }
    }
}

#[async_trait]
impl ClusterPlacementStrategy for FirstReadyCluster {
    async fn find_cluster(&self, dinosaur: &DinosaurRequest) -> Result<Option<Cluster>> {
        self.cluster_service
            .find_cluster(&criteria_for(dinosaur))
            .await
    }
}

/// First schedulable configured cluster, in declared order, that still has room for
/// one more instance.
pub struct FirstSchedulableWithinLimit {
    cluster_service: Arc<dyn ClusterService>,
    dataplane_config: Arc<DataplaneClusterConfig>,
}

impl FirstSchedulableWithinLimit {
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
}

#[async_trait]
impl ClusterPlacementStrategy for FirstSchedulableWithinLimit {
    async fn find_cluster(&self, dinosaur: &DinosaurRequest) -> Result<Option<Cluster>> {
        let candidates = self
            .cluster_service
            .find_all_clusters(&criteria_for(dinosaur))
            .await?;

        // walk the configured list so its declared order decides
        let schedulable: Vec<&Cluster> = self
            .dataplane_config
            .clusters
            .iter()
            .filter(|m| m.schedulable)
            .filter_map(|m| candidates.iter().find(|c| c.id == m.cluster_id))
            .collect();
        if schedulable.is_empty() {
            debug!(dinosaur_id = %dinosaur.id, region = %dinosaur.region, "no schedulable cluster");
            return Ok(None);
        }

        let ids: Vec<String> = schedulable.iter().map(|c| c.id.clone()).collect();
        let counts = self.cluster_service.find_instance_count(&ids).await?;

        for cluster in schedulable {
            let count = counts
                .iter()
                .find(|c| c.cluster_id == cluster.id)
                .map_or(0, |c| c.count);
            let next = i64::try_from(count).unwrap_or(i64::MAX).saturating_add(1);
            if self
                .dataplane_config
                .is_number_of_dinosaurs_within_cluster_limit(&cluster.id, next)
            {
                return Ok(Some(cluster.clone()));
            }
        }
        Ok(None)
    }
}
