// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Data model of the fleet manager.
//!
//! - [`DinosaurRequest`] - one tenant instance and its lifecycle state
//! - [`Cluster`] - a data-plane cluster that hosts instances
//! - [`DataPlaneDinosaurStatus`] / [`DataPlaneClusterStatus`] - reports pushed by agents
//!
//! # Request Lifecycle
//!
//! ```text
//! accepted -> preparing -> provisioning -> ready -> deprovision -> deleting
//!                 ^              |
//!                 +-- rejected --+          any state -> failed
//! ```

use crate::constants::{ID_ALPHABET, ID_LENGTH};
use crate::status_reasons::{CONDITION_STATUS_TRUE, CONDITION_TYPE_READY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Generate a new 20 character identifier.
///
/// Identifiers are lowercase base32hex strings built from 100 random bits.
#[must_use]
pub fn new_id() -> String {
    let mut bits: u128 = rand::random();
    let mut id = String::with_capacity(ID_LENGTH);
    for _ in 0..ID_LENGTH {
        id.push(char::from(ID_ALPHABET[(bits & 0x1f) as usize]));
        bits >>= 5;
    }
    id
}

// ============================================================================
// Dinosaur Request
// ============================================================================

/// Lifecycle status of a [`DinosaurRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DinosaurStatus {
    Accepted,
    Preparing,
    Provisioning,
    Ready,
    Failed,
    Deprovision,
    Deleting,
}

impl DinosaurStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [DinosaurStatus; 7] = [
        Self::Accepted,
        Self::Preparing,
        Self::Provisioning,
        Self::Ready,
        Self::Deprovision,
        Self::Deleting,
        Self::Failed,
    ];

    /// Statuses of requests that are being torn down.
    pub const DELETION: [DinosaurStatus; 2] = [Self::Deleting, Self::Deprovision];

    /// Statuses of requests the agent of the hosting cluster must know about.
    pub const MANAGED: [DinosaurStatus; 4] = [
        Self::Provisioning,
        Self::Deprovision,
        Self::Ready,
        Self::Failed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Preparing => "preparing",
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Deprovision => "deprovision",
            Self::Deleting => "deleting",
        }
    }

    #[must_use]
    pub fn is_deletion(self) -> bool {
        Self::DELETION.contains(&self)
    }
}

impl fmt::Display for DinosaurStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DinosaurStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown dinosaur status '{s}'"))
    }
}

/// Instance class. EVAL instances are free, short-lived and limited to one per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    #[default]
    Standard,
    Eval,
}

impl InstanceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Eval => "eval",
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress marker of a billing-model promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PromotionStatus {
    /// No promotion requested or the last one completed
    #[default]
    #[serde(rename = "")]
    NoPromotion,
    /// A promotion is in progress and will be retried
    #[serde(rename = "promoting")]
    Promoting,
    /// The last promotion failed for good
    #[serde(rename = "failed")]
    Failed,
}

impl PromotionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoPromotion => "",
            Self::Promoting => "promoting",
            Self::Failed => "failed",
        }
    }
}

/// Public route of an instance: a CNAME from `domain` to a cluster `router`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DinosaurRoute {
    pub domain: String,
    pub router: String,
}

/// A tenant instance request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DinosaurRequest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,

    pub name: String,
    pub owner: String,
    pub organisation_id: String,
    pub region: String,
    pub cloud_provider: String,
    pub multi_az: bool,

    /// Data-plane cluster hosting the instance, empty until placement
    pub cluster_id: String,
    /// Regenerated every time the instance is (re)assigned to a cluster
    pub placement_id: String,
    pub namespace: String,
    pub host: String,

    pub status: DinosaurStatus,
    pub failed_reason: String,
    pub subscription_id: String,
    pub instance_type: InstanceType,
    /// Quota service the request was admitted with
    pub quota_type: String,

    pub desired_operator_version: String,
    pub actual_operator_version: String,
    pub desired_app_version: String,
    pub actual_app_version: String,
    pub operator_upgrading: bool,
    pub app_upgrading: bool,

    /// `None` until the agent reports the routes of the instance
    pub routes: Option<Vec<DinosaurRoute>>,
    pub routes_created: bool,
    /// DNS change-tracking token of the route creation
    pub routes_creation_id: String,

    pub canary_service_account_client_id: String,

    pub actual_billing_model: String,
    pub desired_billing_model: String,
    pub promotion_status: PromotionStatus,
    pub promotion_details: String,
    /// Subscription reserved for the desired billing model while a promotion is pending
    pub promotion_subscription_id: String,
}

impl DinosaurRequest {
    /// Build an unsaved request. The id and status are assigned at registration.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        organisation_id: impl Into<String>,
        cloud_provider: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            name: name.into(),
            owner: owner.into(),
            organisation_id: organisation_id.into(),
            region: region.into(),
            cloud_provider: cloud_provider.into(),
            multi_az: true,
            cluster_id: String::new(),
            placement_id: String::new(),
            namespace: String::new(),
            host: String::new(),
            status: DinosaurStatus::Accepted,
            failed_reason: String::new(),
            subscription_id: String::new(),
            instance_type: InstanceType::Standard,
            quota_type: String::new(),
            desired_operator_version: String::new(),
            actual_operator_version: String::new(),
            desired_app_version: String::new(),
            actual_app_version: String::new(),
            operator_upgrading: false,
            app_upgrading: false,
            routes: None,
            routes_created: false,
            routes_creation_id: String::new(),
            canary_service_account_client_id: String::new(),
            actual_billing_model: String::new(),
            desired_billing_model: String::new(),
            promotion_status: PromotionStatus::NoPromotion,
            promotion_details: String::new(),
            promotion_subscription_id: String::new(),
        }
    }

    /// True when a billing-model promotion is pending for this request.
    #[must_use]
    pub fn is_promotion_requested(&self) -> bool {
        self.promotion_status != PromotionStatus::Failed
            && !self.desired_billing_model.is_empty()
            && self.desired_billing_model != self.actual_billing_model
    }
}

/// Desired state of an instance, as handed to the agent of its cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDinosaur {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub placement_id: String,
    pub host: String,
    pub desired_app_version: String,
    pub desired_operator_version: String,
    /// Set once the instance is being deprovisioned
    pub deleted: bool,
    pub owners: Vec<String>,
}

impl From<&DinosaurRequest> for ManagedDinosaur {
    fn from(d: &DinosaurRequest) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            namespace: d.namespace.clone(),
            placement_id: d.placement_id.clone(),
            host: d.host.clone(),
            desired_app_version: d.desired_app_version.clone(),
            desired_operator_version: d.desired_operator_version.clone(),
            deleted: d.status == DinosaurStatus::Deprovision,
            owners: vec![d.owner.clone()],
        }
    }
}

/// Number of instances per status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DinosaurStatusCount {
    pub status: DinosaurStatus,
    pub count: usize,
}

/// Number of instances per (region, instance type, cluster).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DinosaurRegionCount {
    pub region: String,
    pub instance_type: InstanceType,
    pub cluster_id: String,
    pub count: usize,
}

// ============================================================================
// Cluster
// ============================================================================

/// Lifecycle status of a data-plane [`Cluster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterStatus {
    #[serde(rename = "cluster_accepted")]
    Accepted,
    #[serde(rename = "cluster_provisioning")]
    Provisioning,
    #[serde(rename = "cluster_provisioned")]
    Provisioned,
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "compute_node_scaling_up")]
    ComputeNodeScalingUp,
    #[serde(rename = "waiting_for_fleetshard_operator")]
    WaitingForFleetshardOperator,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "deprovisioning")]
    Deprovisioning,
    #[serde(rename = "cleanup")]
    Cleanup,
}

impl ClusterStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "cluster_accepted",
            Self::Provisioning => "cluster_provisioning",
            Self::Provisioned => "cluster_provisioned",
            Self::Ready => "ready",
            Self::Full => "full",
            Self::ComputeNodeScalingUp => "compute_node_scaling_up",
            Self::WaitingForFleetshardOperator => "waiting_for_fleetshard_operator",
            Self::Failed => "failed",
            Self::Deprovisioning => "deprovisioning",
            Self::Cleanup => "cleanup",
        }
    }

    /// Only clusters with a running agent may push status reports.
    #[must_use]
    pub fn can_process_status_reports(self) -> bool {
        matches!(
            self,
            Self::Ready
                | Self::ComputeNodeScalingUp
                | Self::Full
                | Self::WaitingForFleetshardOperator
        )
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider backing a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    #[default]
    Ocm,
    AwsEks,
    Standalone,
}

impl ProviderType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ocm => "ocm",
            Self::AwsEks => "aws_eks",
            Self::Standalone => "standalone",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    /// An empty string selects the default provider.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "ocm" => Ok(Self::Ocm),
            "aws_eks" => Ok(Self::AwsEks),
            "standalone" => Ok(Self::Standalone),
            other => Err(format!("invalid provider type '{other}'")),
        }
    }
}

/// Platform operator version advertised by a cluster agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorVersion {
    pub version: String,
    pub ready: bool,
    /// Application versions this operator version can run, oldest first
    #[serde(default)]
    pub app_versions: Vec<String>,
}

/// A data-plane cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub external_id: String,
    pub provider_type: ProviderType,
    pub status: ClusterStatus,
    pub region: String,
    pub cloud_provider: String,
    pub multi_az: bool,
    pub identity_provider_id: String,
    /// Ingress domain, fetched from the provider on first use
    pub cluster_dns: String,
    /// Comma separated instance types the cluster accepts
    pub supported_instance_type: String,
    /// Sorted by version, oldest first
    pub available_operator_versions: Vec<OperatorVersion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Cluster {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        cloud_provider: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            external_id: String::new(),
            provider_type: ProviderType::Ocm,
            status: ClusterStatus::Accepted,
            region: region.into(),
            cloud_provider: cloud_provider.into(),
            multi_az: true,
            identity_provider_id: String::new(),
            cluster_dns: String::new(),
            supported_instance_type: "standard,eval".to_string(),
            available_operator_versions: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[must_use]
    pub fn supports_instance_type(&self, instance_type: InstanceType) -> bool {
        self.supported_instance_type
            .split(',')
            .any(|t| t.trim() == instance_type.as_str())
    }

    /// Versions the agent reports as ready, oldest first.
    #[must_use]
    pub fn ready_operator_versions(&self) -> Vec<&OperatorVersion> {
        self.available_operator_versions
            .iter()
            .filter(|v| v.ready)
            .collect()
    }
}

/// Filter used to look clusters up for placement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindClusterCriteria {
    pub provider: String,
    pub region: String,
    pub multi_az: bool,
    pub status: Option<ClusterStatus>,
    pub supported_instance_type: Option<InstanceType>,
}

impl FindClusterCriteria {
    #[must_use]
    pub fn matches(&self, cluster: &Cluster) -> bool {
        cluster.cloud_provider == self.provider
            && cluster.region == self.region
            && cluster.multi_az == self.multi_az
            && self.status.is_none_or(|s| cluster.status == s)
            && self
                .supported_instance_type
                .is_none_or(|t| cluster.supports_instance_type(t))
    }
}

/// Number of live instances placed on a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInstanceCount {
    pub cluster_id: String,
    pub count: usize,
}

// ============================================================================
// Data-Plane Reports
// ============================================================================

/// Condition reported by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataPlaneCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

/// Find the `Ready` condition of a report, matching the type case-insensitively.
#[must_use]
pub fn ready_condition(conditions: &[DataPlaneCondition]) -> Option<&DataPlaneCondition> {
    conditions
        .iter()
        .find(|c| c.condition_type.eq_ignore_ascii_case(CONDITION_TYPE_READY))
}

/// Route of an instance as reported by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataPlaneRoute {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub prefix: String,
    pub router: String,
}

/// Status of one instance as reported by the agent of its cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneDinosaurStatus {
    #[serde(default)]
    pub dinosaur_id: String,
    #[serde(default)]
    pub conditions: Vec<DataPlaneCondition>,
    #[serde(default)]
    pub routes: Vec<DataPlaneRoute>,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub operator_version: String,
}

/// Status of a cluster as reported by its agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneClusterStatus {
    #[serde(default)]
    pub conditions: Vec<DataPlaneCondition>,
    #[serde(default)]
    pub available_operator_versions: Vec<OperatorVersion>,
}

impl DataPlaneClusterStatus {
    /// True when the Ready condition status parses as `true`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        ready_condition(&self.conditions)
            .is_some_and(|c| c.status.eq_ignore_ascii_case(CONDITION_STATUS_TRUE))
    }
}
