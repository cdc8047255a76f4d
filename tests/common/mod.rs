// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common utilities for integration tests: a control plane wired over in-memory
//! stores and DNS, plus sample configuration and reports.

#![allow(dead_code)]

use async_trait::async_trait;
use fleet_manager::config::{
    DataplaneClusterConfig, DinosaurConfig, FleetConfig, ManualCluster, QUOTA_TYPE_MANAGEMENT_LIST,
};
use fleet_manager::dns::memory::InMemoryDnsClient;
use fleet_manager::errors::{Result, ServiceError};
use fleet_manager::models::{
    Cluster, ClusterStatus, DataPlaneCondition, DataPlaneRoute, DinosaurRequest, InstanceType,
    OperatorVersion, ProviderType,
};
use fleet_manager::providers::standalone::StandaloneProvider;
use fleet_manager::providers::ProviderFactory;
use fleet_manager::quota::management_list::QuotaManagementListService;
use fleet_manager::quota::{QuotaService, QuotaServiceFactory};
use fleet_manager::services::{
    ClusterService, DataPlaneClusterService, DataPlaneDinosaurService, DefaultClusterService,
    DefaultDinosaurService, DinosaurService,
};
use fleet_manager::store::memory::InMemoryStore;
use fleet_manager::store::{ClusterStore, DinosaurStore};
use std::sync::{Arc, Mutex};

pub const REGION: &str = "us-east-1";
pub const CLUSTER_ID: &str = "cluster-1";
pub const OPERATOR_VERSION: &str = "dinosaur-operator-0.2.0";
pub const APP_VERSION: &str = "2.1.0";

/// One schedulable standalone cluster accepting five instances.
pub fn fleet_config() -> FleetConfig {
    FleetConfig {
        dinosaur: DinosaurConfig {
            max_capacity: 10,
            domain_name: "dinosaur.example.com".to_string(),
            ..DinosaurConfig::default()
        },
        dataplane: DataplaneClusterConfig {
            clusters: vec![ManualCluster {
                cluster_id: CLUSTER_ID.to_string(),
                region: REGION.to_string(),
                dinosaur_instance_limit: 5,
                provider_type: ProviderType::Standalone,
                cluster_dns: format!("apps.{CLUSTER_ID}.example.com"),
                ..ManualCluster::default()
            }],
            ..DataplaneClusterConfig::default()
        },
        ..FleetConfig::default()
    }
}

/// Ready cluster advertising [`OPERATOR_VERSION`].
pub fn ready_cluster(id: &str) -> Cluster {
    let mut cluster = Cluster::new(id, "aws", REGION);
    cluster.status = ClusterStatus::Ready;
    cluster.provider_type = ProviderType::Standalone;
    cluster.cluster_dns = format!("apps.{id}.example.com");
    cluster.available_operator_versions = vec![operator_version()];
    cluster
}

pub fn operator_version() -> OperatorVersion {
    OperatorVersion {
        version: OPERATOR_VERSION.to_string(),
        ready: true,
        app_versions: vec![APP_VERSION.to_string()],
    }
}

/// New request from `owner`, ready to be registered.
pub fn new_request(name: &str, owner: &str) -> DinosaurRequest {
    DinosaurRequest::new(name, owner, "org-1", "aws", REGION)
}

pub fn ready_condition(status: &str, reason: &str) -> DataPlaneCondition {
    DataPlaneCondition {
        condition_type: "Ready".to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: String::new(),
    }
}

pub fn routes(cluster_id: &str) -> Vec<DataPlaneRoute> {
    vec![
        DataPlaneRoute {
            name: "bootstrap".to_string(),
            prefix: String::new(),
            router: format!("router.apps.{cluster_id}.example.com"),
        },
        DataPlaneRoute {
            name: "admin".to_string(),
            prefix: "admin".to_string(),
            router: format!("router.apps.{cluster_id}.example.com"),
        },
    ]
}

/// Fully wired control plane over in-memory stores and DNS.
pub struct ControlPlane {
    pub dinosaurs: Arc<InMemoryStore<DinosaurRequest>>,
    pub clusters: Arc<InMemoryStore<Cluster>>,
    pub dns: Arc<InMemoryDnsClient>,
    pub cluster_service: Arc<dyn ClusterService>,
    pub dinosaur_service: Arc<dyn DinosaurService>,
    pub quota: QuotaServiceFactory,
    pub config: FleetConfig,
}

impl ControlPlane {
    pub fn new(config: FleetConfig) -> Self {
        let dinosaur_rows: Arc<InMemoryStore<DinosaurRequest>> = Arc::new(InMemoryStore::new());
        let cluster_rows: Arc<InMemoryStore<Cluster>> = Arc::new(InMemoryStore::new());
        let dinosaur_store: Arc<DinosaurStore> = dinosaur_rows.clone();
        let cluster_store: Arc<ClusterStore> = cluster_rows.clone();
        let dataplane = Arc::new(config.dataplane.clone());

        let providers = ProviderFactory::new().with_provider(
            ProviderType::Standalone,
            Arc::new(StandaloneProvider::new(dataplane.clone())),
        );
        let cluster_service: Arc<dyn ClusterService> = Arc::new(DefaultClusterService::new(
            cluster_store,
            dinosaur_store.clone(),
            providers,
        ));
        let quota = QuotaServiceFactory::new().with_service(
            QUOTA_TYPE_MANAGEMENT_LIST,
            Arc::new(QuotaManagementListService::new(
                dinosaur_store.clone(),
                Arc::new(config.quota_management_list.clone()),
            )),
        );
        let dns = Arc::new(InMemoryDnsClient::with_zones([config.dinosaur.domain_name.clone()]));
        let dinosaur_service: Arc<dyn DinosaurService> = Arc::new(DefaultDinosaurService::new(
            dinosaur_store,
            cluster_service.clone(),
            quota.clone(),
            dns.clone(),
            Arc::new(config.dinosaur.clone()),
            dataplane,
        ));

        Self {
            dinosaurs: dinosaur_rows,
            clusters: cluster_rows,
            dns,
            cluster_service,
            dinosaur_service,
            quota,
            config,
        }
    }

    pub fn dataplane_config(&self) -> Arc<DataplaneClusterConfig> {
        Arc::new(self.config.dataplane.clone())
    }

    pub fn dinosaur_config(&self) -> Arc<DinosaurConfig> {
        Arc::new(self.config.dinosaur.clone())
    }

    pub fn cluster_status_service(&self) -> DataPlaneClusterService {
        DataPlaneClusterService::new(self.cluster_service.clone())
    }

    pub fn dinosaur_status_service(&self) -> DataPlaneDinosaurService {
        DataPlaneDinosaurService::new(self.dinosaur_service.clone(), self.cluster_service.clone())
    }

    /// Stored row, soft-deleted ones included.
    pub fn stored(&self, id: &str) -> DinosaurRequest {
        self.dinosaurs
            .get_unscoped(id)
            .unwrap()
            .unwrap_or_else(|| panic!("dinosaur {id} not stored"))
    }

    pub fn stored_cluster(&self, id: &str) -> Cluster {
        self.clusters
            .get_unscoped(id)
            .unwrap()
            .unwrap_or_else(|| panic!("cluster {id} not stored"))
    }
}

/// Quota service whose old-subscription release can be made to fail.
#[derive(Default)]
pub struct FakeQuota {
    pub delete_error: Option<ServiceError>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl QuotaService for FakeQuota {
    async fn check_if_quota_is_defined_for_instance_type(
        &self,
        _dinosaur: &DinosaurRequest,
        _instance_type: InstanceType,
    ) -> Result<bool> {
        Ok(true)
    }

    async fn reserve_quota(
        &self,
        _dinosaur: &DinosaurRequest,
        _instance_type: InstanceType,
    ) -> Result<String> {
        Ok("subscription-reserved".to_string())
    }

    async fn reserve_quota_if_not_already_reserved(
        &self,
        dinosaur: &DinosaurRequest,
    ) -> Result<String> {
        if dinosaur.subscription_id.is_empty() {
            Ok("subscription-reserved".to_string())
        } else {
            Ok(dinosaur.subscription_id.clone())
        }
    }

    async fn delete_quota(&self, subscription_id: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(subscription_id.to_string());
        Ok(())
    }

    async fn delete_quota_for_billing_model(
        &self,
        subscription_id: &str,
        _billing_model: &str,
    ) -> Result<()> {
        self.deleted.lock().unwrap().push(subscription_id.to_string());
        match &self.delete_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
