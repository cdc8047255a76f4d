// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fixtures of the unit tests: an in-memory control plane and sample rows.

use crate::config::{
    DataplaneClusterConfig, DinosaurConfig, FleetConfig, ManualCluster, QUOTA_TYPE_MANAGEMENT_LIST,
};
use crate::dns::memory::InMemoryDnsClient;
use crate::models::{
    Cluster, ClusterStatus, DinosaurRequest, DinosaurStatus, OperatorVersion, ProviderType,
};
use crate::providers::standalone::StandaloneProvider;
use crate::providers::ProviderFactory;
use crate::quota::management_list::QuotaManagementListService;
use crate::quota::QuotaServiceFactory;
use crate::services::{
    ClusterService, DefaultClusterService, DefaultDinosaurService, DinosaurService,
};
use crate::store::memory::InMemoryStore;
use crate::store::{ClusterStore, DinosaurStore};
use std::sync::Arc;

pub const DOMAIN: &str = "dinosaur.example.com";
pub const REGION: &str = "us-east-1";
pub const OPERATOR_VERSION: &str = "dinosaur-operator-0.1.0";
pub const APP_VERSION: &str = "1.0.0";

/// Ready standalone cluster in [`REGION`] advertising [`OPERATOR_VERSION`].
pub fn ready_cluster(id: &str) -> Cluster {
    let mut cluster = Cluster::new(id, "aws", REGION);
    cluster.status = ClusterStatus::Ready;
    cluster.provider_type = ProviderType::Standalone;
    cluster.cluster_dns = format!("apps.{id}.example.com");
    cluster.available_operator_versions = vec![OperatorVersion {
        version: OPERATOR_VERSION.to_string(),
        ready: true,
        app_versions: vec![APP_VERSION.to_string()],
    }];
    cluster
}

pub fn manual_cluster(id: &str, limit: i64) -> ManualCluster {
    ManualCluster {
        cluster_id: id.to_string(),
        region: REGION.to_string(),
        dinosaur_instance_limit: limit,
        provider_type: ProviderType::Standalone,
        cluster_dns: format!("apps.{id}.example.com"),
        ..ManualCluster::default()
    }
}

/// Request `id` owned by `alice` in [`REGION`].
pub fn dinosaur(id: &str, status: DinosaurStatus, cluster_id: &str) -> DinosaurRequest {
    let mut d = DinosaurRequest::new(format!("dino-{id}"), "alice", "org-1", "aws", REGION);
    d.id = id.to_string();
    d.status = status;
    d.cluster_id = cluster_id.to_string();
    d.quota_type = QUOTA_TYPE_MANAGEMENT_LIST.to_string();
    d
}

/// Configuration with one manual cluster `cluster-1` accepting five instances.
pub fn config() -> FleetConfig {
    FleetConfig {
        dinosaur: DinosaurConfig {
            max_capacity: 100,
            domain_name: DOMAIN.to_string(),
            ..DinosaurConfig::default()
        },
        dataplane: DataplaneClusterConfig {
            clusters: vec![manual_cluster("cluster-1", 5)],
            ..DataplaneClusterConfig::default()
        },
        ..FleetConfig::default()
    }
}

/// Control plane wired over in-memory stores and DNS.
pub struct Fixture {
    pub dinosaurs: Arc<InMemoryStore<DinosaurRequest>>,
    pub clusters: Arc<InMemoryStore<Cluster>>,
    pub dns: Arc<InMemoryDnsClient>,
    pub provider: Arc<StandaloneProvider>,
    pub cluster_service: Arc<dyn ClusterService>,
    pub dinosaur_service: Arc<dyn DinosaurService>,
    pub quota: QuotaServiceFactory,
    pub config: FleetConfig,
}

impl Fixture {
    pub fn new(
        config: FleetConfig,
        clusters: Vec<Cluster>,
        dinosaurs: Vec<DinosaurRequest>,
    ) -> Self {
        let dinosaur_rows = Arc::new(InMemoryStore::with_rows(dinosaurs));
        let cluster_rows = Arc::new(InMemoryStore::with_rows(clusters));
        let dinosaur_store: Arc<DinosaurStore> = dinosaur_rows.clone();
        let cluster_store: Arc<ClusterStore> = cluster_rows.clone();
        let dataplane = Arc::new(config.dataplane.clone());

        let provider = Arc::new(StandaloneProvider::new(dataplane.clone()));
        let providers =
            ProviderFactory::new().with_provider(ProviderType::Standalone, provider.clone());
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
        let dns = Arc::new(InMemoryDnsClient::with_zones([DOMAIN]));
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
            provider,
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
