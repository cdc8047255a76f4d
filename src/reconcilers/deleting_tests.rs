// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `deleting.rs`

#[cfg(test)]
mod tests {
    use crate::models::{DinosaurRoute, DinosaurStatus};
    use crate::reconcilers::{DeletingDinosaurReconciler, Reconcile};
    use crate::store::Store;
    use crate::testing::{config, dinosaur, Fixture, DOMAIN};

    fn reconciler(fx: &Fixture) -> DeletingDinosaurReconciler {
        DeletingDinosaurReconciler::new(fx.dinosaur_service.clone(), fx.quota.clone())
    }

    #[tokio::test]
    async fn test_deletes_deleting_and_unplaced_deprovision_requests() {
        let mut reached_data_plane = dinosaur("placed", DinosaurStatus::Deprovision, "cluster-1");
        reached_data_plane.host = "placed.example.com".to_string();
        let fx = Fixture::new(
            config(),
            vec![],
            vec![
                dinosaur("deleting", DinosaurStatus::Deleting, "cluster-1"),
                dinosaur("unplaced", DinosaurStatus::Deprovision, ""),
                reached_data_plane,
                dinosaur("ready", DinosaurStatus::Ready, "cluster-1"),
            ],
        );

        let errors = reconciler(&fx).reconcile().await;
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");

        assert!(fx.stored("deleting").deleted_at.is_some());
        assert!(fx.stored("unplaced").deleted_at.is_some(), "no agent will ever report it");
        assert!(
            fx.stored("placed").deleted_at.is_none(),
            "waits for its agent to report the deletion"
        );
        assert!(fx.stored("ready").deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let mut unknown_quota = dinosaur("broken", DinosaurStatus::Deleting, "cluster-1");
        unknown_quota.quota_type = "unknown".to_string();
        let fx = Fixture::new(
            config(),
            vec![],
            vec![unknown_quota, dinosaur("ok", DinosaurStatus::Deleting, "cluster-1")],
        );

        let errors = reconciler(&fx).reconcile().await;
        assert_eq!(errors.len(), 1);
        assert!(
            errors[0].to_string().contains("failed to get quota service for dinosaur broken"),
            "unexpected error: {}",
            errors[0]
        );
        assert!(fx.dinosaurs.get("broken").await.unwrap().is_some(), "kept for the next tick");
        assert!(fx.stored("ok").deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_dns_failure_keeps_request() {
        let mut cfg = config();
        cfg.dinosaur.enable_external_certificate = true;
        let mut d = dinosaur("abc", DinosaurStatus::Deleting, "cluster-1");
        d.routes = Some(vec![DinosaurRoute {
            domain: format!("abc.{DOMAIN}"),
            router: "router.mk.cluster-1.example.com".to_string(),
        }]);
        let fx = Fixture::new(cfg, vec![], vec![d]);
        fx.dns.set_failing(true);

        let errors = reconciler(&fx).reconcile().await;
        assert_eq!(errors.len(), 1);
        assert!(fx.stored("abc").deleted_at.is_none());

        fx.dns.set_failing(false);
        let errors = reconciler(&fx).reconcile().await;
        assert!(
            errors.is_empty(),
            "deleting a record that never existed is suppressed: {errors:?}"
        );
        assert!(fx.stored("abc").deleted_at.is_some());
    }
}
