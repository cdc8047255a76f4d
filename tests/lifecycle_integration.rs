// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end lifecycle of instance requests over an in-memory control plane.
//!
//! Run with: cargo test --test lifecycle_integration

mod common;

use common::{
    fleet_config, new_request, ready_cluster, ready_condition, routes, ControlPlane, FakeQuota,
    CLUSTER_ID, OPERATOR_VERSION,
};
use fleet_manager::config::QUOTA_TYPE_MANAGEMENT_LIST;
use fleet_manager::errors::ServiceError;
use fleet_manager::models::{
    DataPlaneDinosaurStatus, DinosaurRequest, DinosaurStatus, InstanceType, PromotionStatus,
};
use fleet_manager::quota::QuotaServiceFactory;
use fleet_manager::reconcilers::{
    AcceptedDinosaurReconciler, DeletingDinosaurReconciler, DnsRoutesReconciler,
    PreparingDinosaurReconciler, PromotionReconciler, ReadyDinosaurReconciler, Reconcile,
};
use fleet_manager::services::new_cluster_placement_strategy;
use fleet_manager::status_reasons::CONDITION_STATUS_FALSE;
use fleet_manager::store::Store;
use std::sync::Arc;

fn accepted(cp: &ControlPlane) -> AcceptedDinosaurReconciler {
    AcceptedDinosaurReconciler::new(
        cp.dinosaur_service.clone(),
        new_cluster_placement_strategy(cp.cluster_service.clone(), cp.dataplane_config()),
        cp.dataplane_config(),
    )
}

fn report(id: &str, status: &str, reason: &str) -> DataPlaneDinosaurStatus {
    DataPlaneDinosaurStatus {
        dinosaur_id: id.to_string(),
        conditions: vec![ready_condition(status, reason)],
        routes: routes(CLUSTER_ID),
        ..DataPlaneDinosaurStatus::default()
    }
}

async fn tick(worker: &dyn Reconcile) {
    let errors = worker.reconcile().await;
    assert!(errors.is_empty(), "{} reported errors: {errors:?}", worker.name());
}

#[tokio::test]
async fn test_accepted_request_waits_for_a_schedulable_cluster() {
    let cp = ControlPlane::new(fleet_config());
    let registered = cp
        .dinosaur_service
        .register_job(new_request("my-dino", "alice"))
        .await
        .expect("registration succeeds");
    assert_eq!(registered.status, DinosaurStatus::Accepted);
    assert_eq!(registered.instance_type, InstanceType::Eval, "unlisted users get eval instances");
    assert_eq!(registered.quota_type, QUOTA_TYPE_MANAGEMENT_LIST);

    let reconciler = accepted(&cp);
    let writes = cp.dinosaurs.write_count();
    tick(&reconciler).await;
    assert_eq!(cp.stored(&registered.id).status, DinosaurStatus::Accepted);
    assert_eq!(cp.dinosaurs.write_count(), writes, "no cluster, no mutation");

    cp.clusters.insert(&ready_cluster(CLUSTER_ID)).await.unwrap();
    tick(&reconciler).await;

    let placed = cp.stored(&registered.id);
    assert_eq!(placed.status, DinosaurStatus::Preparing);
    assert_eq!(placed.cluster_id, CLUSTER_ID);
    assert_eq!(placed.desired_operator_version, OPERATOR_VERSION);
}

#[tokio::test]
async fn test_request_lifecycle_from_registration_to_deletion() {
    let cp = ControlPlane::new(fleet_config());
    cp.clusters.insert(&ready_cluster(CLUSTER_ID)).await.unwrap();
    let id = cp
        .dinosaur_service
        .register_job(new_request("my-dino", "alice"))
        .await
        .unwrap()
        .id;

    tick(&accepted(&cp)).await;
    tick(&PreparingDinosaurReconciler::new(
        cp.dinosaur_service.clone(),
        cp.dinosaur_config(),
    ))
    .await;
    let provisioning = cp.stored(&id);
    assert_eq!(provisioning.status, DinosaurStatus::Provisioning);
    assert!(provisioning.host.ends_with("cluster-1.example.com"), "host: {}", provisioning.host);
    assert!(!provisioning.namespace.is_empty());

    // the agent reports the instance ready before its routes exist
    let agent = cp.dinosaur_status_service();
    let ready_report = [report(&id, "True", "")];
    agent.update_dataplane_dinosaur_status(CLUSTER_ID, &ready_report).await.unwrap();
    let with_routes = cp.stored(&id);
    assert_eq!(with_routes.status, DinosaurStatus::Provisioning);
    assert_eq!(with_routes.routes.as_ref().map(Vec::len), Some(2));
    assert!(!with_routes.routes_created);

    tick(&DnsRoutesReconciler::new(cp.dinosaur_service.clone(), cp.dinosaur_config())).await;
    assert!(cp.stored(&id).routes_created);

    agent.update_dataplane_dinosaur_status(CLUSTER_ID, &ready_report).await.unwrap();
    assert_eq!(cp.stored(&id).status, DinosaurStatus::Ready);

    tick(&ReadyDinosaurReconciler::new(cp.dinosaur_service.clone())).await;
    assert!(!cp.stored(&id).canary_service_account_client_id.is_empty());

    let managed = cp
        .dinosaur_service
        .get_managed_dinosaurs_by_cluster_id(CLUSTER_ID)
        .await
        .unwrap();
    assert_eq!(managed.len(), 1);
    assert!(!managed[0].deleted);

    // owner deletes the instance, the agent confirms it is gone
    cp.dinosaur_service.register_deprovision_job(&id).await.unwrap();
    assert_eq!(cp.stored(&id).status, DinosaurStatus::Deprovision);
    agent
        .update_dataplane_dinosaur_status(
            CLUSTER_ID,
            &[report(&id, CONDITION_STATUS_FALSE, "Deleted")],
        )
        .await
        .unwrap();
    assert_eq!(cp.stored(&id).status, DinosaurStatus::Deleting);

    tick(&DeletingDinosaurReconciler::new(cp.dinosaur_service.clone(), cp.quota.clone())).await;
    assert!(cp.stored(&id).deleted_at.is_some(), "request soft deleted");
    assert!(cp.dinosaur_service.get_by_id(&id).await.is_err());
}

#[tokio::test]
async fn test_error_report_fails_request() {
    let cp = ControlPlane::new(fleet_config());
    cp.clusters.insert(&ready_cluster(CLUSTER_ID)).await.unwrap();
    let id = cp
        .dinosaur_service
        .register_job(new_request("my-dino", "alice"))
        .await
        .unwrap()
        .id;
    tick(&accepted(&cp)).await;
    tick(&PreparingDinosaurReconciler::new(
        cp.dinosaur_service.clone(),
        cp.dinosaur_config(),
    ))
    .await;

    cp.dinosaur_status_service()
        .update_dataplane_dinosaur_status(
            CLUSTER_ID,
            &[report(&id, CONDITION_STATUS_FALSE, "Error")],
        )
        .await
        .unwrap();

    let failed = cp.stored(&id);
    assert_eq!(failed.status, DinosaurStatus::Failed);
    assert!(!failed.failed_reason.is_empty());
}

#[tokio::test]
async fn test_second_eval_instance_is_refused() {
    let cp = ControlPlane::new(fleet_config());
    cp.dinosaur_service
        .register_job(new_request("first", "alice"))
        .await
        .unwrap();

    let err = cp
        .dinosaur_service
        .register_job(new_request("second", "alice"))
        .await
        .expect_err("only one eval instance per user");
    assert!(err.is_client_error_class(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_recoverable_promotion_failure_keeps_promoting() {
    let cp = ControlPlane::new(fleet_config());
    let mut ready = new_request("my-dino", "alice");
    ready.id = "promoted".to_string();
    ready.status = DinosaurStatus::Ready;
    ready.cluster_id = CLUSTER_ID.to_string();
    ready.quota_type = QUOTA_TYPE_MANAGEMENT_LIST.to_string();
    ready.subscription_id = "subscription-eval".to_string();
    ready.actual_billing_model = "eval".to_string();
    ready.desired_billing_model = "standard".to_string();
    cp.dinosaurs.insert(&ready).await.unwrap();

    let quota = Arc::new(FakeQuota {
        delete_error: Some(ServiceError::general("quota service unavailable").recoverable()),
        ..FakeQuota::default()
    });
    let factory =
        QuotaServiceFactory::new().with_service(QUOTA_TYPE_MANAGEMENT_LIST, quota.clone());
    let reconciler = PromotionReconciler::new(cp.dinosaur_service.clone(), factory);

    let errors = reconciler.reconcile().await;
    assert_eq!(errors.len(), 1);

    let stored: DinosaurRequest = cp.stored("promoted");
    assert_eq!(stored.promotion_status, PromotionStatus::Promoting, "not failed");
    assert_eq!(stored.promotion_subscription_id, "subscription-reserved");
    assert_eq!(stored.subscription_id, "subscription-eval", "old quota is still held");
    assert_eq!(stored.actual_billing_model, "eval");
    assert_eq!(*quota.deleted.lock().unwrap(), vec!["subscription-eval".to_string()]);
}
