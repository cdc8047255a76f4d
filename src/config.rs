// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration of the fleet manager.
//!
//! Configuration comes from a YAML file whose every section is optional, plus a few
//! command line flags parsed with clap.
//!
//! ```yaml
//! dinosaur:
//!   max_capacity: 100
//!   enable_external_certificate: true
//!   domain_name: dinosaur.example.com
//! dataplane:
//!   scaling_type: manual
//!   clusters:
//!     - cluster_id: cluster-1
//!       cloud_provider: aws
//!       region: us-east-1
//!       schedulable: true
//!       dinosaur_instance_limit: 5
//!       provider_type: standalone
//!       cluster_dns: apps.cluster-1.example.com
//! access_control:
//!   enable_deny_list: true
//!   deny_list: [banned-user]
//! ```

use crate::constants::{
    DEFAULT_API_ADDRESS, DEFAULT_MAX_CAPACITY, DEFAULT_MAX_DURATION_WITH_PROVISIONING_ERRS_SECS,
    DEFAULT_RECONCILE_INTERVAL_SECS,
};
use crate::models::{ClusterStatus, InstanceType, ProviderType};
use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Quota type admitting requests through the configured allow list.
pub const QUOTA_TYPE_MANAGEMENT_LIST: &str = "quota-management-list";

/// Command line of the fleet manager binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "fleet-manager", version, about = "Control plane for managed Dinosaur instances")]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address the agent API and metrics endpoint listen on (overrides the file)
    #[arg(long)]
    pub api_address: Option<String>,
}

/// Root of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub dinosaur: DinosaurConfig,
    pub dataplane: DataplaneClusterConfig,
    pub access_control: AccessControlListConfig,
    pub quota_management_list: QuotaManagementListConfig,
    pub workers: WorkerConfig,
}

impl FleetConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or fails validation.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        let config = Self::from_yaml(&raw)
            .with_context(|| format!("invalid configuration file {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML or fails validation.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(address) = &cli.api_address {
            self.workers.api_address.clone_from(address);
        }
    }

    /// Check cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for cluster in &self.dataplane.clusters {
            if cluster.cluster_id.is_empty() {
                bail!("manual cluster entries require a cluster_id");
            }
            if !seen.insert(cluster.cluster_id.as_str()) {
                bail!("duplicate manual cluster '{}'", cluster.cluster_id);
            }
            if cluster.dinosaur_instance_limit < -1 {
                bail!(
                    "cluster '{}' has invalid dinosaur_instance_limit {} (use -1 for unlimited)",
                    cluster.cluster_id,
                    cluster.dinosaur_instance_limit
                );
            }
        }
        if self.dinosaur.enable_external_certificate && self.dinosaur.domain_name.is_empty() {
            bail!("dinosaur.domain_name is required when external certificates are enabled");
        }
        if self.workers.reconcile_interval_secs == 0 {
            bail!("workers.reconcile_interval_secs must be greater than zero");
        }
        Ok(())
    }
}

// ============================================================================
// Dinosaur
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DinosaurConfig {
    /// Maximum number of instances across all regions
    pub max_capacity: i64,
    /// Quota service new requests are admitted with
    pub quota_type: String,
    pub allow_eval_instance: bool,
    /// Publish instance routes through the DNS provider under `domain_name`
    pub enable_external_certificate: bool,
    pub domain_name: String,
    /// Age after which EVAL instances are deprovisioned; 0 disables expiry
    pub eval_lifespan_hours: i64,
    /// How long a request may keep failing to prepare before it is marked failed
    pub max_duration_with_provisioning_errs_secs: u64,
}

impl Default for DinosaurConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            quota_type: QUOTA_TYPE_MANAGEMENT_LIST.to_string(),
            allow_eval_instance: true,
            enable_external_certificate: false,
            domain_name: String::new(),
            eval_lifespan_hours: 48,
            max_duration_with_provisioning_errs_secs:
                DEFAULT_MAX_DURATION_WITH_PROVISIONING_ERRS_SECS,
        }
    }
}

impl DinosaurConfig {
    #[must_use]
    pub fn max_duration_with_provisioning_errs(&self) -> Duration {
        Duration::from_secs(self.max_duration_with_provisioning_errs_secs)
    }

    #[must_use]
    pub fn is_expiry_enabled(&self) -> bool {
        self.eval_lifespan_hours > 0
    }
}

// ============================================================================
// Data Plane
// ============================================================================

/// How data-plane capacity is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingType {
    /// Clusters come from the configured list
    #[default]
    Manual,
    /// Clusters are scaled from reported capacity
    Auto,
    /// Scaling disabled, useful in testing
    None,
}

/// A cluster declared in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualCluster {
    pub cluster_id: String,
    pub cloud_provider: String,
    pub region: String,
    pub multi_az: bool,
    pub schedulable: bool,
    /// Maximum number of instances, -1 for unlimited
    pub dinosaur_instance_limit: i64,
    pub status: ClusterStatus,
    pub provider_type: ProviderType,
    pub cluster_dns: String,
    pub supported_instance_type: String,
    /// Operator version assigned to new instances, overriding the latest ready one
    pub dinosaur_operator_version: String,
}

impl Default for ManualCluster {
    fn default() -> Self {
        Self {
            cluster_id: String::new(),
            cloud_provider: "aws".to_string(),
            region: String::new(),
            multi_az: true,
            schedulable: true,
            dinosaur_instance_limit: 0,
            status: ClusterStatus::Provisioning,
            provider_type: ProviderType::Ocm,
            cluster_dns: String::new(),
            supported_instance_type: "standard,eval".to_string(),
            dinosaur_operator_version: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataplaneClusterConfig {
    pub scaling_type: ScalingType,
    /// Manual clusters in declared order; placement walks them in this order
    pub clusters: Vec<ManualCluster>,
}

impl DataplaneClusterConfig {
    #[must_use]
    pub fn is_manual_scaling_enabled(&self) -> bool {
        self.scaling_type == ScalingType::Manual
    }

    #[must_use]
    pub fn cluster(&self, cluster_id: &str) -> Option<&ManualCluster> {
        self.clusters.iter().find(|c| c.cluster_id == cluster_id)
    }

    /// Total instance limit of the clusters configured in `region`.
    #[must_use]
    pub fn capacity_for_region(&self, region: &str) -> i64 {
        self.clusters
            .iter()
            .filter(|c| c.region == region)
            .map(|c| c.dinosaur_instance_limit)
            .sum()
    }

    /// Unknown clusters and clusters with a limit of -1 accept any count.
    #[must_use]
    pub fn is_number_of_dinosaurs_within_cluster_limit(
        &self,
        cluster_id: &str,
        count: i64,
    ) -> bool {
        self.cluster(cluster_id).is_none_or(|c| {
            c.dinosaur_instance_limit == -1 || count <= c.dinosaur_instance_limit
        })
    }

    #[must_use]
    pub fn is_cluster_schedulable(&self, cluster_id: &str) -> bool {
        self.cluster(cluster_id).is_some_and(|c| c.schedulable)
    }

    #[must_use]
    pub fn cluster_supports_instance_type(
        &self,
        cluster_id: &str,
        instance_type: InstanceType,
    ) -> bool {
        self.cluster(cluster_id).is_some_and(|c| {
            c.supported_instance_type
                .split(',')
                .any(|t| t.trim() == instance_type.as_str())
        })
    }

    /// Operator version override of a configured cluster.
    #[must_use]
    pub fn operator_version_override(&self, cluster_id: &str) -> Option<&str> {
        self.cluster(cluster_id)
            .map(|c| c.dinosaur_operator_version.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Configured clusters whose id is not in `known`.
    #[must_use]
    pub fn missing_clusters<'a>(&'a self, known: &HashSet<String>) -> Vec<&'a ManualCluster> {
        self.clusters
            .iter()
            .filter(|c| !known.contains(&c.cluster_id))
            .collect()
    }
}

// ============================================================================
// Access Control
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessControlListConfig {
    pub enable_deny_list: bool,
    /// Owners whose instances are deprovisioned
    pub deny_list: Vec<String>,
}

impl AccessControlListConfig {
    #[must_use]
    pub fn denied_users(&self) -> &[String] {
        if self.enable_deny_list {
            &self.deny_list
        } else {
            &[]
        }
    }
}

// ============================================================================
// Quota Management List
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganisationQuota {
    pub id: String,
    pub max_allowed_instances: i64,
    /// Every user of the organisation is registered
    pub any_user: bool,
    pub registered_users: Vec<String>,
}

impl OrganisationQuota {
    #[must_use]
    pub fn is_user_registered(&self, username: &str) -> bool {
        self.any_user || self.registered_users.iter().any(|u| u == username)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceAccountQuota {
    pub username: String,
    pub max_allowed_instances: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaManagementListConfig {
    pub enable_instance_limit_control: bool,
    pub organisations: Vec<OrganisationQuota>,
    pub service_accounts: Vec<ServiceAccountQuota>,
}

impl QuotaManagementListConfig {
    #[must_use]
    pub fn organisation(&self, id: &str) -> Option<&OrganisationQuota> {
        self.organisations.iter().find(|o| o.id == id)
    }

    #[must_use]
    pub fn service_account(&self, username: &str) -> Option<&ServiceAccountQuota> {
        self.service_accounts.iter().find(|a| a.username == username)
    }
}

// ============================================================================
// Workers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub reconcile_interval_secs: u64,
    pub api_address: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            api_address: DEFAULT_API_ADDRESS.to_string(),
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}
