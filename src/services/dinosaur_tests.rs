// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `dinosaur.rs`

#[cfg(test)]
mod tests {
    use crate::config::{OrganisationQuota, QuotaManagementListConfig};
    use crate::constants::{DNS_CHANGE_STATUS_INSYNC, DNS_CHANGE_STATUS_PENDING};
    use crate::dns::ChangeAction;
    use crate::errors::ErrorCode;
    use crate::models::{DinosaurRequest, DinosaurRoute, DinosaurStatus, InstanceType};
    use crate::services::dinosaur::{
        build_namespace, build_truncated_dinosaur_identifier, replace_host_special_char,
    };
    use crate::testing::{config, dinosaur, ready_cluster, Fixture, DOMAIN, REGION};
    use chrono::{Duration, Utc};

    fn routes(host: &str) -> Vec<DinosaurRoute> {
        vec![
            DinosaurRoute {
                domain: host.to_string(),
                router: "router.mk.cluster-1.example.com".to_string(),
            },
            DinosaurRoute {
                domain: format!("admin-{host}"),
                router: "router.mk.cluster-1.example.com".to_string(),
            },
        ]
    }

    fn new_request(owner: &str) -> DinosaurRequest {
        DinosaurRequest::new("my-dino", owner, "org-1", "aws", REGION)
    }

    #[test]
    fn test_replace_host_special_char() {
        assert_eq!(replace_host_special_char("My_Dino.1").unwrap(), "my-dino-1");
        assert_eq!(replace_host_special_char("-dino-").unwrap(), "adinoa");
        let err = replace_host_special_char("").unwrap_err();
        assert_eq!(err.code, ErrorCode::General);
    }

    #[test]
    fn test_identifier_and_namespace() {
        let mut d = dinosaur("ABCDEF", DinosaurStatus::Accepted, "");
        d.name = "a-very-long-dinosaur-name".to_string();
        assert_eq!(build_truncated_dinosaur_identifier(&d), "a-very-lon-abcdef");
        assert_eq!(build_namespace(&d), "dinosaur-abcdef");
    }

    #[tokio::test]
    async fn test_register_job_accepts_and_snapshots_quota_type() {
        let fx = Fixture::new(config(), vec![], vec![]);
        let registered = fx
            .dinosaur_service
            .register_job(new_request("alice"))
            .await
            .unwrap();

        assert!(!registered.id.is_empty());
        let stored = fx.stored(&registered.id);
        assert_eq!(stored.status, DinosaurStatus::Accepted);
        assert_eq!(stored.instance_type, InstanceType::Standard);
        assert_eq!(stored.quota_type, fx.config.dinosaur.quota_type);
    }

    #[tokio::test]
    async fn test_register_job_checks_global_capacity() {
        let mut cfg = config();
        cfg.dinosaur.max_capacity = 1;
        let fx = Fixture::new(cfg, vec![], vec![dinosaur("a", DinosaurStatus::Ready, "cluster-1")]);

        let err = fx
            .dinosaur_service
            .register_job(new_request("bob"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TooManyInstancesReached);
        assert_eq!(err.reason, "Cluster capacity(1) exhausted");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_respect_capacity() {
        let mut cfg = config();
        cfg.dinosaur.max_capacity = 1;
        let fx = Fixture::new(cfg, vec![], vec![]);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = fx.dinosaur_service.clone();
                let request = new_request(&format!("user-{i}"));
                tokio::spawn(async move { service.register_job(request).await })
            })
            .collect();
        let results: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.expect("registration task panicked"))
            .collect();

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1, "only one registration fits the capacity");
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.code, ErrorCode::TooManyInstancesReached);
        }

        let stored = fx
            .dinosaur_service
            .list_by_status(&[DinosaurStatus::Accepted])
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_register_job_checks_region_capacity() {
        let rows = (0..5)
            .map(|i| dinosaur(&format!("d{i}"), DinosaurStatus::Ready, "cluster-1"))
            .collect();
        let fx = Fixture::new(config(), vec![], rows);

        let err = fx
            .dinosaur_service
            .register_job(new_request("bob"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TooManyInstancesReached);
        assert_eq!(err.reason, format!("Cluster capacity(5) exhausted in {REGION} region"));
    }

    #[tokio::test]
    async fn test_register_job_allows_single_eval_instance() {
        let mut cfg = config();
        cfg.quota_management_list = QuotaManagementListConfig {
            enable_instance_limit_control: true,
            organisations: vec![OrganisationQuota {
                id: "other-org".to_string(),
                max_allowed_instances: 5,
                any_user: true,
                registered_users: vec![],
            }],
            service_accounts: vec![],
        };
        let fx = Fixture::new(cfg, vec![], vec![]);

        let first = fx
            .dinosaur_service
            .register_job(new_request("carol"))
            .await
            .unwrap();
        assert_eq!(first.instance_type, InstanceType::Eval);

        let err = fx
            .dinosaur_service
            .register_job(new_request("carol"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TooManyInstancesReached);
        assert_eq!(err.reason, "only one eval instance is allowed");
    }

    #[tokio::test]
    async fn test_register_job_refuses_eval_when_disabled() {
        let mut cfg = config();
        cfg.dinosaur.allow_eval_instance = false;
        cfg.quota_management_list.enable_instance_limit_control = true;
        let fx = Fixture::new(cfg, vec![], vec![]);

        let err = fx
            .dinosaur_service
            .register_job(new_request("carol"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_update_status_refusal_rule() {
        let fx = Fixture::new(
            config(),
            vec![],
            vec![
                dinosaur("ready", DinosaurStatus::Ready, "cluster-1"),
                dinosaur("deprovision", DinosaurStatus::Deprovision, "cluster-1"),
            ],
        );
        let svc = &fx.dinosaur_service;

        assert!(
            !svc.update_status("ready", DinosaurStatus::Ready).await.unwrap(),
            "same status is refused"
        );
        assert!(!svc.update_status("deprovision", DinosaurStatus::Ready).await.unwrap());
        assert_eq!(fx.stored("deprovision").status, DinosaurStatus::Deprovision);

        assert!(svc.update_status("deprovision", DinosaurStatus::Deleting).await.unwrap());
        assert!(svc.update_status("ready", DinosaurStatus::Failed).await.unwrap());
        assert_eq!(fx.stored("ready").status, DinosaurStatus::Failed);

        let err = svc.update_status("missing", DinosaurStatus::Ready).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_refused_status_update_writes_nothing() {
        let fx = Fixture::new(
            config(),
            vec![],
            vec![dinosaur("a", DinosaurStatus::Deprovision, "")],
        );
        fx.dinosaur_service
            .update_status("a", DinosaurStatus::Provisioning)
            .await
            .unwrap();
        assert_eq!(fx.dinosaurs.write_count(), 0);
    }

    #[tokio::test]
    async fn test_update_fields_skips_deletion_statuses() {
        let fx = Fixture::new(config(), vec![], vec![dinosaur("a", DinosaurStatus::Deleting, "")]);
        let changed = fx
            .dinosaur_service
            .update_fields("a", &|d: &mut DinosaurRequest| d.host = "changed".to_string())
            .await
            .unwrap();
        assert!(!changed);
        assert!(fx.stored("a").host.is_empty());
    }

    #[tokio::test]
    async fn test_prepare_dinosaur_request_sets_host() {
        let fx = Fixture::new(
            config(),
            vec![ready_cluster("cluster-1")],
            vec![dinosaur("abc", DinosaurStatus::Preparing, "cluster-1")],
        );
        let d = fx.stored("abc");
        fx.dinosaur_service.prepare_dinosaur_request(&d).await.unwrap();

        let prepared = fx.stored("abc");
        assert_eq!(prepared.status, DinosaurStatus::Provisioning);
        assert_eq!(prepared.host, "dino-abc-abc.mk.cluster-1.example.com");
        assert_eq!(prepared.namespace, "dinosaur-abc");
        assert!(!prepared.placement_id.is_empty());
    }

    #[tokio::test]
    async fn test_prepare_dinosaur_request_with_external_certificate() {
        let mut cfg = config();
        cfg.dinosaur.enable_external_certificate = true;
        let fx = Fixture::new(
            cfg,
            vec![ready_cluster("cluster-1")],
            vec![dinosaur("abc", DinosaurStatus::Preparing, "cluster-1")],
        );
        fx.dinosaur_service
            .prepare_dinosaur_request(&fx.stored("abc"))
            .await
            .unwrap();
        assert_eq!(fx.stored("abc").host, format!("dino-abc-abc.{DOMAIN}"));
    }

    #[tokio::test]
    async fn test_deprovision_dinosaurs_for_users() {
        let mut banned = dinosaur("banned", DinosaurStatus::Ready, "cluster-1");
        banned.owner = "mallory".to_string();
        let mut deleting = dinosaur("deleting", DinosaurStatus::Deleting, "cluster-1");
        deleting.owner = "mallory".to_string();
        let fx = Fixture::new(
            config(),
            vec![],
            vec![banned, deleting, dinosaur("kept", DinosaurStatus::Ready, "cluster-1")],
        );

        let affected = fx
            .dinosaur_service
            .deprovision_dinosaurs_for_users(&["mallory".to_string()])
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(fx.stored("banned").status, DinosaurStatus::Deprovision);
        assert_eq!(fx.stored("deleting").status, DinosaurStatus::Deleting);
        assert_eq!(fx.stored("kept").status, DinosaurStatus::Ready);
    }

    #[tokio::test]
    async fn test_deprovision_expired_dinosaurs_only_touches_old_eval() {
        let old = Utc::now() - Duration::hours(72);
        let mut expired = dinosaur("expired", DinosaurStatus::Ready, "cluster-1");
        expired.instance_type = InstanceType::Eval;
        expired.created_at = old;
        let mut standard = dinosaur("standard", DinosaurStatus::Ready, "cluster-1");
        standard.created_at = old;
        let mut young = dinosaur("young", DinosaurStatus::Ready, "cluster-1");
        young.instance_type = InstanceType::Eval;
        let mut deleting = dinosaur("deleting", DinosaurStatus::Deleting, "cluster-1");
        deleting.instance_type = InstanceType::Eval;
        deleting.created_at = old;
        let fx = Fixture::new(config(), vec![], vec![expired, standard, young, deleting]);

        let affected = fx.dinosaur_service.deprovision_expired_dinosaurs(48).await.unwrap();
        assert_eq!(affected, 1);
        assert_eq!(fx.stored("expired").status, DinosaurStatus::Deprovision);
        assert_eq!(fx.stored("standard").status, DinosaurStatus::Ready);
        assert_eq!(fx.stored("young").status, DinosaurStatus::Ready);
        assert_eq!(fx.stored("deleting").status, DinosaurStatus::Deleting);
    }

    #[tokio::test]
    async fn test_register_deprovision_job() {
        let fx = Fixture::new(
            config(),
            vec![],
            vec![dinosaur("a", DinosaurStatus::Ready, "cluster-1")],
        );
        fx.dinosaur_service.register_deprovision_job("a").await.unwrap();
        assert_eq!(fx.stored("a").status, DinosaurStatus::Deprovision);

        // a second request is a no-op
        fx.dinosaur_service.register_deprovision_job("a").await.unwrap();

        let err = fx.dinosaur_service.register_deprovision_job("missing").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_counts() {
        let mut eval = dinosaur("c", DinosaurStatus::Provisioning, "cluster-2");
        eval.instance_type = InstanceType::Eval;
        let fx = Fixture::new(
            config(),
            vec![],
            vec![
                dinosaur("a", DinosaurStatus::Ready, "cluster-1"),
                dinosaur("b", DinosaurStatus::Ready, "cluster-1"),
                eval,
            ],
        );

        let by_status = fx
            .dinosaur_service
            .count_by_status(&DinosaurStatus::ALL)
            .await
            .unwrap();
        assert_eq!(by_status.len(), DinosaurStatus::ALL.len(), "every status is reported");
        let ready = by_status.iter().find(|c| c.status == DinosaurStatus::Ready).unwrap();
        assert_eq!(ready.count, 2);
        let failed = by_status.iter().find(|c| c.status == DinosaurStatus::Failed).unwrap();
        assert_eq!(failed.count, 0);

        let by_region = fx
            .dinosaur_service
            .count_by_region_and_instance_type()
            .await
            .unwrap();
        assert_eq!(by_region.len(), 2);
        let standard = by_region
            .iter()
            .find(|c| c.instance_type == InstanceType::Standard)
            .unwrap();
        assert_eq!((standard.cluster_id.as_str(), standard.count), ("cluster-1", 2));
    }

    #[tokio::test]
    async fn test_managed_dinosaurs_by_cluster() {
        let mut provisioning = dinosaur("p", DinosaurStatus::Provisioning, "cluster-1");
        provisioning.host = "p.example.com".to_string();
        let mut deprovision = dinosaur("d", DinosaurStatus::Deprovision, "cluster-1");
        deprovision.host = "d.example.com".to_string();
        let mut elsewhere = dinosaur("e", DinosaurStatus::Ready, "cluster-2");
        elsewhere.host = "e.example.com".to_string();
        let fx = Fixture::new(
            config(),
            vec![],
            vec![
                provisioning,
                deprovision,
                elsewhere,
                dinosaur("no-host", DinosaurStatus::Provisioning, "cluster-1"),
                dinosaur("preparing", DinosaurStatus::Preparing, "cluster-1"),
            ],
        );

        let managed = fx
            .dinosaur_service
            .get_managed_dinosaurs_by_cluster_id("cluster-1")
            .await
            .unwrap();
        let ids: Vec<&str> = managed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["p", "d"]);
        assert!(!managed[0].deleted);
        assert!(managed[1].deleted, "deprovisioned instances are flagged for removal");
    }

    #[tokio::test]
    async fn test_cname_records_lifecycle() {
        let mut cfg = config();
        cfg.dinosaur.enable_external_certificate = true;
        let host = format!("dino.{DOMAIN}");
        let mut d = dinosaur("a", DinosaurStatus::Ready, "cluster-1");
        d.routes = Some(routes(&host));
        let fx = Fixture::new(cfg, vec![], vec![d.clone()]);
        let svc = &fx.dinosaur_service;

        let info = svc.change_dinosaur_cname_records(&d, ChangeAction::Create).await.unwrap();
        assert_eq!(info.status, DNS_CHANGE_STATUS_PENDING);
        assert!(fx.dns.record(&host).is_some());

        // creating the same records again is suppressed
        let again = svc.change_dinosaur_cname_records(&d, ChangeAction::Create).await.unwrap();
        assert!(again.id.is_empty());
        assert_eq!(again.status, DNS_CHANGE_STATUS_INSYNC);

        d.routes_creation_id = info.id;
        assert_eq!(
            svc.get_cname_record_status(&d).await.unwrap().status,
            DNS_CHANGE_STATUS_PENDING
        );
        assert_eq!(svc.get_cname_record_status(&d).await.unwrap().status, DNS_CHANGE_STATUS_INSYNC);

        svc.delete(&d).await.unwrap();
        assert!(fx.dns.record(&host).is_none(), "records are removed with the instance");
        assert!(fx.stored("a").deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_cname_failure_is_general_error() {
        let mut d = dinosaur("a", DinosaurStatus::Ready, "cluster-1");
        d.routes = Some(routes("dino.dinosaur.example.com"));
        let fx = Fixture::new(config(), vec![], vec![d.clone()]);
        fx.dns.set_failing(true);

        let err = fx
            .dinosaur_service
            .change_dinosaur_cname_records(&d, ChangeAction::Create)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::General);
        assert_eq!(err.reason, "Unable to create domain record sets");
        assert!(err.is_recoverable(), "provider outages are retried");

        let err = fx
            .dinosaur_service
            .get_cname_record_status(&d)
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_cname_failure_without_zone_is_terminal() {
        let mut cfg = config();
        cfg.dinosaur.domain_name = "unknown.example.net".to_string();
        let mut d = dinosaur("a", DinosaurStatus::Ready, "cluster-1");
        d.routes = Some(routes("dino.unknown.example.net"));
        let fx = Fixture::new(cfg, vec![], vec![d.clone()]);

        let err = fx
            .dinosaur_service
            .change_dinosaur_cname_records(&d, ChangeAction::Create)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::General);
        assert!(!err.is_recoverable(), "a missing hosted zone is not retried");
    }

    #[tokio::test]
    async fn test_routes_and_promotion_listings() {
        let mut pending = dinosaur("pending", DinosaurStatus::Provisioning, "cluster-1");
        pending.routes = Some(routes("p.example.com"));
        let mut created = dinosaur("created", DinosaurStatus::Ready, "cluster-1");
        created.routes = Some(routes("c.example.com"));
        created.routes_created = true;
        created.desired_billing_model = "marketplace".to_string();
        created.actual_billing_model = "standard".to_string();
        let fx = Fixture::new(config(), vec![], vec![pending, created]);

        let not_created = fx
            .dinosaur_service
            .list_dinosaurs_with_routes_not_created()
            .await
            .unwrap();
        assert_eq!(not_created.len(), 1);
        assert_eq!(not_created[0].id, "pending");

        let to_promote = fx.dinosaur_service.list_dinosaurs_to_promote().await.unwrap();
        assert_eq!(to_promote.len(), 1);
        assert_eq!(to_promote[0].id, "created");
    }
}
