// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provider for pre-existing clusters.
//!
//! Standalone clusters are created outside the fleet manager and declared in the
//! configuration file. Every lifecycle step succeeds immediately, the ingress domain
//! comes from configuration and scaling requests are ignored.

use super::{
    ClusterRequest, ClusterSpec, ComputeNodesInfo, IdentityProviderInfo, Parameter, Provider,
    ResourceSet,
};
use crate::config::DataplaneClusterConfig;
use crate::models::ClusterStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Names of the resource sets installed by the operator and agent steps.
pub const OPERATOR_RESOURCE_SET: &str = "dinosaur-operator";
pub const FLEETSHARD_RESOURCE_SET: &str = "fleetshard-operator";

#[derive(Debug)]
pub struct StandaloneProvider {
    dataplane: Arc<DataplaneClusterConfig>,
    applied: RwLock<HashMap<String, Vec<String>>>,
}

impl StandaloneProvider {
    #[must_use]
    pub fn new(dataplane: Arc<DataplaneClusterConfig>) -> Self {
        Self {
            dataplane,
            applied: RwLock::new(HashMap::new()),
        }
    }

    /// Names of the resource sets applied to `cluster_id`, oldest first.
    #[must_use]
    pub fn applied_resource_sets(&self, cluster_id: &str) -> Vec<String> {
        self.applied
            .read()
            .map(|applied| applied.get(cluster_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn record_applied(&self, cluster_id: &str, name: &str) -> anyhow::Result<()> {
        let mut applied = self
            .applied
            .write()
            .map_err(|_| anyhow::anyhow!("standalone provider lock poisoned"))?;
        applied
            .entry(cluster_id.to_string())
            .or_default()
            .push(name.to_string());
        Ok(())
    }
}

#[async_trait]
impl Provider for StandaloneProvider {
    async fn create(&self, request: &ClusterRequest) -> anyhow::Result<ClusterSpec> {
        debug!(
            region = %request.region,
            cloud_provider = %request.cloud_provider,
            "standalone clusters already exist, nothing to create"
        );
        Ok(ClusterSpec {
            internal_id: String::new(),
            external_id: String::new(),
            status: ClusterStatus::Provisioning,
            status_details: String::new(),
        })
    }

    async fn delete(&self, spec: &ClusterSpec) -> anyhow::Result<bool> {
        info!(cluster_id = %spec.internal_id, "releasing standalone cluster");
        Ok(true)
    }

    async fn check_cluster_status(&self, spec: &ClusterSpec) -> anyhow::Result<ClusterSpec> {
        Ok(ClusterSpec {
            status: ClusterStatus::Provisioned,
            ..spec.clone()
        })
    }

    async fn add_identity_provider(
        &self,
        spec: &ClusterSpec,
        identity_provider: IdentityProviderInfo,
    ) -> anyhow::Result<IdentityProviderInfo> {
        self.record_applied(&spec.internal_id, &identity_provider.name)?;
        Ok(identity_provider)
    }

    async fn apply_resources(
        &self,
        spec: &ClusterSpec,
        resources: ResourceSet,
    ) -> anyhow::Result<ResourceSet> {
        debug!(
            cluster_id = %spec.internal_id,
            resource_set = %resources.name,
            count = resources.resources.len(),
            "applying resources"
        );
        self.record_applied(&spec.internal_id, &resources.name)?;
        Ok(resources)
    }

    async fn scale_up(&self, spec: &ClusterSpec, _increment: u32) -> anyhow::Result<ClusterSpec> {
        Ok(spec.clone())
    }

    async fn scale_down(&self, spec: &ClusterSpec, _decrement: u32) -> anyhow::Result<ClusterSpec> {
        Ok(spec.clone())
    }

    async fn set_compute_nodes(
        &self,
        spec: &ClusterSpec,
        _nodes: u32,
    ) -> anyhow::Result<ClusterSpec> {
        Ok(spec.clone())
    }

    async fn get_compute_nodes(&self, _spec: &ClusterSpec) -> anyhow::Result<ComputeNodesInfo> {
        Ok(ComputeNodesInfo::default())
    }

    async fn get_cluster_dns(&self, spec: &ClusterSpec) -> anyhow::Result<String> {
        Ok(self
            .dataplane
            .cluster(&spec.internal_id)
            .map(|c| c.cluster_dns.clone())
            .unwrap_or_default())
    }

    async fn install_operator(&self, spec: &ClusterSpec) -> anyhow::Result<bool> {
        self.apply_resources(
            spec,
            ResourceSet {
                name: OPERATOR_RESOURCE_SET.to_string(),
                resources: Vec::new(),
            },
        )
        .await?;
        Ok(true)
    }

    async fn install_fleetshard(
        &self,
        spec: &ClusterSpec,
        params: &[Parameter],
    ) -> anyhow::Result<bool> {
        let resources = params
            .iter()
            .map(|p| serde_json::json!({ "id": p.id, "value": p.value }))
            .collect();
        self.apply_resources(
            spec,
            ResourceSet {
                name: FLEETSHARD_RESOURCE_SET.to_string(),
                resources,
            },
        )
        .await?;
        Ok(true)
    }
}
