// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::Parser;
use fleet_manager::{
    agent_api::{self, AgentApiState},
    config::{Cli, FleetConfig, QUOTA_TYPE_MANAGEMENT_LIST},
    constants::TOKIO_WORKER_THREADS,
    dns::memory::InMemoryDnsClient,
    models::ProviderType,
    providers::{standalone::StandaloneProvider, ProviderFactory},
    quota::{management_list::QuotaManagementListService, QuotaServiceFactory},
    reconcilers::{
        AcceptedDinosaurReconciler, ClusterManager, DeletingDinosaurReconciler,
        DnsRoutesReconciler, GeneralDinosaurReconciler, PreparingDinosaurReconciler,
        PromotionReconciler, ProvisioningDinosaurReconciler, ReadyDinosaurReconciler,
    },
    services::{
        new_cluster_placement_strategy, ClusterService, DataPlaneClusterService,
        DataPlaneDinosaurService, DefaultClusterService, DefaultDinosaurService, DinosaurService,
    },
    store::{memory::InMemoryStore, ClusterStore, DinosaurStore},
    workers::Scheduler,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("fleet-manager")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Respects `RUST_LOG` (default `info`) and `RUST_LOG_FORMAT` (`json` or text).
fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => FleetConfig::load(path).await?,
        None => FleetConfig::default(),
    };
    config.apply_cli(&cli);
    info!(
        clusters = config.dataplane.clusters.len(),
        scaling = ?config.dataplane.scaling_type,
        "Starting fleet manager"
    );

    let dinosaur_config = Arc::new(config.dinosaur.clone());
    let dataplane_config = Arc::new(config.dataplane.clone());
    let access_control = Arc::new(config.access_control.clone());

    debug!("Creating in-memory stores");
    let dinosaur_store: Arc<DinosaurStore> = Arc::new(InMemoryStore::new());
    let cluster_store: Arc<ClusterStore> = Arc::new(InMemoryStore::new());

    let providers = ProviderFactory::new().with_provider(
        ProviderType::Standalone,
        Arc::new(StandaloneProvider::new(dataplane_config.clone())),
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

    let dns = if config.dinosaur.domain_name.is_empty() {
        InMemoryDnsClient::default()
    } else {
        InMemoryDnsClient::with_zones([config.dinosaur.domain_name.clone()])
    };

    let dinosaur_service: Arc<dyn DinosaurService> = Arc::new(DefaultDinosaurService::new(
        dinosaur_store,
        cluster_service.clone(),
        quota.clone(),
        Arc::new(dns),
        dinosaur_config.clone(),
        dataplane_config.clone(),
    ));

    let placement =
        new_cluster_placement_strategy(cluster_service.clone(), dataplane_config.clone());
    let scheduler = Scheduler::new(config.workers.reconcile_interval())
        .with_worker(Arc::new(ClusterManager::new(
            cluster_service.clone(),
            dataplane_config.clone(),
        )))
        .with_worker(Arc::new(AcceptedDinosaurReconciler::new(
            dinosaur_service.clone(),
            placement,
            dataplane_config,
        )))
        .with_worker(Arc::new(PreparingDinosaurReconciler::new(
            dinosaur_service.clone(),
            dinosaur_config.clone(),
        )))
        .with_worker(Arc::new(ProvisioningDinosaurReconciler::new(
            dinosaur_service.clone(),
        )))
        .with_worker(Arc::new(DnsRoutesReconciler::new(
            dinosaur_service.clone(),
            dinosaur_config.clone(),
        )))
        .with_worker(Arc::new(ReadyDinosaurReconciler::new(dinosaur_service.clone())))
        .with_worker(Arc::new(DeletingDinosaurReconciler::new(
            dinosaur_service.clone(),
            quota.clone(),
        )))
        .with_worker(Arc::new(GeneralDinosaurReconciler::new(
            dinosaur_service.clone(),
            dinosaur_config,
            access_control,
        )))
        .with_worker(Arc::new(PromotionReconciler::new(dinosaur_service.clone(), quota)));
    info!(workers = ?scheduler.worker_names(), "Starting workers");
    let workers = scheduler.start();

    let state = AgentApiState {
        cluster_status: Arc::new(DataPlaneClusterService::new(cluster_service.clone())),
        dinosaur_status: Arc::new(DataPlaneDinosaurService::new(
            dinosaur_service.clone(),
            cluster_service,
        )),
        dinosaur_service,
        signals: workers.signal_bus(),
    };
    let listener = TcpListener::bind(&config.workers.api_address)
        .await
        .with_context(|| format!("failed to bind agent API to {}", config.workers.api_address))?;

    let served = agent_api::serve(listener, agent_api::router(state), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    })
    .await;

    workers.shutdown().await;
    served
}
