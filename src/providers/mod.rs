// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster providers.
//!
//! A [`Provider`] creates, inspects, terraforms and deletes data-plane clusters for one
//! kind of backing platform. The [`ProviderFactory`] maps a [`ProviderType`] tag to the
//! provider implementation, so the cluster service never matches on provider kinds.
//!
//! # Available Providers
//!
//! - [`standalone::StandaloneProvider`] - pre-existing clusters declared in configuration

pub mod standalone;

use crate::errors::{Result, ServiceError};
use crate::models::{Cluster, ClusterStatus, ProviderType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Request for a new cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRequest {
    pub cloud_provider: String,
    pub region: String,
    pub multi_az: bool,
}

/// Provider view of a cluster, exchanged on every provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Identifier in the fleet manager
    pub internal_id: String,
    /// Identifier at the provider
    pub external_id: String,
    pub status: ClusterStatus,
    pub status_details: String,
}

impl From<&Cluster> for ClusterSpec {
    fn from(cluster: &Cluster) -> Self {
        Self {
            internal_id: cluster.id.clone(),
            external_id: cluster.external_id.clone(),
            status: cluster.status,
            status_details: String::new(),
        }
    }
}

/// Identity provider installed on a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProviderInfo {
    pub id: String,
    pub name: String,
    pub issuer: String,
}

/// Named set of manifests applied to a cluster in one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub name: String,
    pub resources: Vec<serde_json::Value>,
}

/// Compute node counts of a cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeNodesInfo {
    pub actual: u32,
    pub desired: u32,
}

/// Key/value parameter handed to the fleetshard addon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub value: String,
}

/// Operations on the clusters of one backing platform.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Request a new cluster.
    async fn create(&self, request: &ClusterRequest) -> anyhow::Result<ClusterSpec>;

    /// Delete the cluster. Returns `true` once the provider has removed it.
    async fn delete(&self, spec: &ClusterSpec) -> anyhow::Result<bool>;

    /// Current state of a cluster being provisioned. The returned status is one of
    /// provisioning, provisioned or failed.
    async fn check_cluster_status(&self, spec: &ClusterSpec) -> anyhow::Result<ClusterSpec>;

    async fn add_identity_provider(
        &self,
        spec: &ClusterSpec,
        identity_provider: IdentityProviderInfo,
    ) -> anyhow::Result<IdentityProviderInfo>;

    async fn apply_resources(
        &self,
        spec: &ClusterSpec,
        resources: ResourceSet,
    ) -> anyhow::Result<ResourceSet>;

    async fn scale_up(&self, spec: &ClusterSpec, increment: u32) -> anyhow::Result<ClusterSpec>;

    async fn scale_down(&self, spec: &ClusterSpec, decrement: u32) -> anyhow::Result<ClusterSpec>;

    async fn set_compute_nodes(
        &self,
        spec: &ClusterSpec,
        nodes: u32,
    ) -> anyhow::Result<ClusterSpec>;

    async fn get_compute_nodes(&self, spec: &ClusterSpec) -> anyhow::Result<ComputeNodesInfo>;

    /// Ingress domain of the cluster, e.g. `apps.cluster-1.example.com`.
    async fn get_cluster_dns(&self, spec: &ClusterSpec) -> anyhow::Result<String>;

    /// Install the instance operator. Returns `true` once it is ready.
    async fn install_operator(&self, spec: &ClusterSpec) -> anyhow::Result<bool>;

    /// Install the fleetshard agent. Returns `true` once it is ready.
    async fn install_fleetshard(
        &self,
        spec: &ClusterSpec,
        params: &[Parameter],
    ) -> anyhow::Result<bool>;
}

/// Registry of providers keyed by provider type.
#[derive(Default, Clone)]
pub struct ProviderFactory {
    providers: HashMap<ProviderType, Arc<dyn Provider>>,
}

impl ProviderFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `provider_type`, replacing any previous registration.
    #[must_use]
    pub fn with_provider(
        mut self,
        provider_type: ProviderType,
        provider: Arc<dyn Provider>,
    ) -> Self {
        self.providers.insert(provider_type, provider);
        self
    }

    /// Look up the provider of `provider_type`.
    ///
    /// # Errors
    ///
    /// Returns a general error if no provider is registered for the type.
    pub fn get_provider(&self, provider_type: ProviderType) -> Result<Arc<dyn Provider>> {
        self.providers.get(&provider_type).cloned().ok_or_else(|| {
            ServiceError::general(format!("invalid provider type: {provider_type}"))
        })
    }
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
