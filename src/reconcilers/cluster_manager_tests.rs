// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cluster_manager.rs`

#[cfg(test)]
mod tests {
    use crate::config::{FleetConfig, ScalingType};
    use crate::constants::CLUSTER_RESOURCE_SET;
    use crate::models::{ClusterStatus, DinosaurStatus};
    use crate::providers::standalone::{FLEETSHARD_RESOURCE_SET, OPERATOR_RESOURCE_SET};
    use crate::reconcilers::{ClusterManager, Reconcile};
    use crate::store::Store;
    use crate::testing::{config, dinosaur, ready_cluster, Fixture};

    fn manager(fx: &Fixture) -> ClusterManager {
        ClusterManager::new(fx.cluster_service.clone(), fx.dataplane_config())
    }

    #[tokio::test]
    async fn test_configured_cluster_is_registered_and_brought_up() {
        let fx = Fixture::new(config(), vec![], vec![]);

        let errors = manager(&fx).reconcile().await;
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");

        let stored = fx.stored_cluster("cluster-1");
        assert_eq!(stored.status, ClusterStatus::WaitingForFleetshardOperator);
        assert_eq!(stored.cluster_dns, "apps.cluster-1.example.com");
        assert_eq!(
            fx.provider.applied_resource_sets("cluster-1"),
            vec![
                CLUSTER_RESOURCE_SET.to_string(),
                OPERATOR_RESOURCE_SET.to_string(),
                FLEETSHARD_RESOURCE_SET.to_string(),
            ]
        );

        let writes = fx.clusters.write_count();
        let errors = manager(&fx).reconcile().await;
        assert!(errors.is_empty());
        assert_eq!(fx.clusters.write_count(), writes, "the agent takes over from here");
    }

    #[tokio::test]
    async fn test_accepted_cluster_walks_through_provisioning() {
        let mut cluster = ready_cluster("cluster-1");
        cluster.status = ClusterStatus::Accepted;
        let fx = Fixture::new(config(), vec![cluster], vec![]);

        let errors = manager(&fx).reconcile().await;
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert_eq!(
            fx.stored_cluster("cluster-1").status,
            ClusterStatus::WaitingForFleetshardOperator
        );
    }

    #[tokio::test]
    async fn test_empty_excess_cluster_is_removed() {
        let fx = Fixture::new(
            config(),
            vec![ready_cluster("cluster-1"), ready_cluster("retired")],
            vec![],
        );

        let errors = manager(&fx).reconcile().await;
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");

        let retired = fx.stored_cluster("retired");
        assert_eq!(retired.status, ClusterStatus::Cleanup);
        assert!(retired.deleted_at.is_some(), "deprovisioned, deleted and cleaned up");
        assert!(fx.clusters.get("cluster-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_excess_cluster_with_instances_is_kept() {
        let fx = Fixture::new(
            config(),
            vec![ready_cluster("cluster-1"), ready_cluster("busy")],
            vec![dinosaur("abc", DinosaurStatus::Ready, "busy")],
        );

        let errors = manager(&fx).reconcile().await;
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert_eq!(fx.stored_cluster("busy").status, ClusterStatus::Ready);
    }

    #[tokio::test]
    async fn test_deprovisioning_cluster_waits_for_instances() {
        let mut cluster = ready_cluster("cluster-1");
        cluster.status = ClusterStatus::Deprovisioning;
        let fx = Fixture::new(
            config(),
            vec![cluster],
            vec![dinosaur("abc", DinosaurStatus::Deleting, "cluster-1")],
        );

        let errors = manager(&fx).reconcile().await;
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert_eq!(fx.stored_cluster("cluster-1").status, ClusterStatus::Deprovisioning);
    }

    #[tokio::test]
    async fn test_no_registration_without_manual_scaling() {
        let mut cfg: FleetConfig = config();
        cfg.dataplane.scaling_type = ScalingType::Auto;
        let fx = Fixture::new(cfg, vec![ready_cluster("unlisted")], vec![]);

        let errors = manager(&fx).reconcile().await;
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert!(fx.clusters.get("cluster-1").await.unwrap().is_none());
        assert_eq!(fx.stored_cluster("unlisted").status, ClusterStatus::Ready);
    }
}
