// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Instance request service.
//!
//! Every read and write of a [`DinosaurRequest`] goes through the [`DinosaurService`]:
//! registration with its capacity and quota checks, preparation (host and namespace),
//! guarded status updates, deprovisioning, deletion and the DNS records of the routes.
//!
//! # Status Update Rule
//!
//! A status update is refused, and reported as `Ok(false)`, when the request is
//! already in the target status or when it is being deprovisioned and the target is
//! anything but `deleting`. The rule is evaluated again inside the atomic store
//! update, so a concurrent writer cannot slip a forbidden transition in.

use super::clusters::ClusterService;
use crate::config::{DataplaneClusterConfig, DinosaurConfig};
use crate::constants::{
    DEFAULT_INGRESS_DNS_NAME_PREFIX, DINOSAUR_NAMESPACE_PREFIX, DNS_CHANGE_STATUS_INSYNC,
    MANAGED_DINOSAUR_INGRESS_DNS_NAME_PREFIX, TRUNCATED_NAME_LEN,
};
use crate::dns::{build_cname_batch, ChangeAction, ChangeInfo, DnsClient};
use crate::dns_errors::{suppress_idempotent, DnsError};
use crate::errors::{ErrorCode, Result, ServiceError};
use crate::metrics::{record_dinosaur_operation, record_dns_change};
use crate::models::{
    new_id, DinosaurRegionCount, DinosaurRequest, DinosaurStatus, DinosaurStatusCount,
    InstanceType, ManagedDinosaur,
};
use crate::quota::QuotaServiceFactory;
use crate::store::{DinosaurStore, Mutation};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Metric label of deletions.
const OPERATION_DELETE: &str = "delete";

/// Metric label of deprovisions.
const OPERATION_DEPROVISION: &str = "deprovision";

/// Operations on instance requests.
#[async_trait]
pub trait DinosaurService: Send + Sync {
    /// Admit a new request: check capacity and quota, then store it as `accepted`.
    async fn register_job(&self, dinosaur: DinosaurRequest) -> Result<DinosaurRequest>;

    /// # Errors
    ///
    /// Returns a not-found error if no live request has the id.
    async fn get_by_id(&self, id: &str) -> Result<DinosaurRequest>;

    async fn list_by_status(&self, statuses: &[DinosaurStatus]) -> Result<Vec<DinosaurRequest>>;

    /// Assign host and namespace, then move the request to `provisioning`.
    async fn prepare_dinosaur_request(&self, dinosaur: &DinosaurRequest) -> Result<()>;

    /// Overwrite the stored row. Requests being deleted are left untouched.
    async fn update(&self, dinosaur: &DinosaurRequest) -> Result<()>;

    /// Apply `mutate` to the stored row. Requests being deleted are left untouched.
    /// Returns whether the row changed.
    async fn update_fields(&self, id: &str, mutate: Mutation<'_, DinosaurRequest>) -> Result<bool>;

    /// Guarded status transition, see the module documentation.
    async fn update_status(&self, id: &str, status: DinosaurStatus) -> Result<bool>;

    /// Ask for the request to be torn down.
    async fn register_deprovision_job(&self, id: &str) -> Result<()>;

    /// Deprovision every request owned by one of `users`. Returns the number moved.
    async fn deprovision_dinosaurs_for_users(&self, users: &[String]) -> Result<usize>;

    /// Deprovision EVAL requests older than `age_hours`. Returns the number moved.
    async fn deprovision_expired_dinosaurs(&self, age_hours: i64) -> Result<usize>;

    /// Remove the DNS records of the request and soft delete it.
    async fn delete(&self, dinosaur: &DinosaurRequest) -> Result<()>;

    /// Count per status. Every requested status is present, zero if unused.
    async fn count_by_status(&self, statuses: &[DinosaurStatus])
        -> Result<Vec<DinosaurStatusCount>>;

    async fn count_by_region_and_instance_type(&self) -> Result<Vec<DinosaurRegionCount>>;

    async fn list_dinosaurs_with_routes_not_created(&self) -> Result<Vec<DinosaurRequest>>;

    /// Ready requests with a pending billing-model promotion.
    async fn list_dinosaurs_to_promote(&self) -> Result<Vec<DinosaurRequest>>;

    /// Desired state of the requests placed on `cluster_id` that its agent manages.
    async fn get_managed_dinosaurs_by_cluster_id(&self, cluster_id: &str)
        -> Result<Vec<ManagedDinosaur>>;

    /// Submit the CNAME records of the request routes.
    async fn change_dinosaur_cname_records(
        &self,
        dinosaur: &DinosaurRequest,
        action: ChangeAction,
    ) -> Result<ChangeInfo>;

    /// Status of the CNAME change recorded on the request.
    async fn get_cname_record_status(&self, dinosaur: &DinosaurRequest) -> Result<ChangeInfo>;
}

/// [`DinosaurService`] over a [`DinosaurStore`].
pub struct DefaultDinosaurService {
    store: Arc<DinosaurStore>,
    cluster_service: Arc<dyn ClusterService>,
    quota_factory: QuotaServiceFactory,
    dns: Arc<dyn DnsClient>,
    dinosaur_config: Arc<DinosaurConfig>,
    dataplane_config: Arc<DataplaneClusterConfig>,
    /// Serialises the capacity check and insert of registrations
    registration_lock: Mutex<()>,
}

impl DefaultDinosaurService {
    #[must_use]
    pub fn new(
        store: Arc<DinosaurStore>,
        cluster_service: Arc<dyn ClusterService>,
        quota_factory: QuotaServiceFactory,
        dns: Arc<dyn DnsClient>,
        dinosaur_config: Arc<DinosaurConfig>,
        dataplane_config: Arc<DataplaneClusterConfig>,
    ) -> Self {
        Self {
            store,
            cluster_service,
            quota_factory,
            dns,
            dinosaur_config,
            dataplane_config,
            registration_lock: Mutex::new(()),
        }
    }

    async fn live_rows(&self) -> Result<Vec<DinosaurRequest>> {
        self.store
            .list()
            .await
            .map_err(|e| wrap(e, "failed to list dinosaur requests"))
    }

    async fn has_available_capacity(&self) -> Result<bool> {
        let count = i64::try_from(self.live_rows().await?.len()).unwrap_or(i64::MAX);
        Ok(count < self.dinosaur_config.max_capacity)
    }

    async fn has_available_capacity_in_region(&self, dinosaur: &DinosaurRequest) -> Result<bool> {
        let capacity = self.dataplane_config.capacity_for_region(&dinosaur.region);
        if capacity <= 0 {
            return Ok(false);
        }
        let count = self
            .live_rows()
            .await?
            .iter()
            .filter(|d| d.region == dinosaur.region)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX) < capacity)
    }

    /// STANDARD when the owner has quota for it, EVAL otherwise.
    async fn detect_instance_type(&self, dinosaur: &DinosaurRequest) -> Result<InstanceType> {
        let quota_service = self
            .quota_factory
            .get_quota_service(&self.dinosaur_config.quota_type)
            .map_err(|e| wrap(e, "unable to check quota"))?;
        let has_standard = quota_service
            .check_if_quota_is_defined_for_instance_type(dinosaur, InstanceType::Standard)
            .await
            .map_err(|e| wrap(e, "unable to check quota"))?;
        Ok(if has_standard {
            InstanceType::Standard
        } else {
            InstanceType::Eval
        })
    }
}

fn wrap(err: impl std::fmt::Display, reason: impl Into<String>) -> ServiceError {
    ServiceError::with_cause(ErrorCode::General, err, reason)
}

/// General error for a DNS failure, recoverable when the provider failure is transient.
fn wrap_dns(err: DnsError, reason: &str) -> ServiceError {
    let transient = err.is_transient();
    let err = wrap(err, reason);
    if transient {
        err.recoverable()
    } else {
        err
    }
}

/// Whether a request in `current` may move to `target`.
fn is_status_update_allowed(current: DinosaurStatus, target: DinosaurStatus) -> bool {
    current != target
        && (current != DinosaurStatus::Deprovision || target == DinosaurStatus::Deleting)
}

/// First [`TRUNCATED_NAME_LEN`] characters of the name, a dash and the lowercase id.
#[must_use]
pub fn build_truncated_dinosaur_identifier(dinosaur: &DinosaurRequest) -> String {
    let truncated: String = dinosaur.name.chars().take(TRUNCATED_NAME_LEN).collect();
    format!("{truncated}-{}", dinosaur.id.to_lowercase())
}

/// Turn `name` into a valid DNS label: lowercase, every character outside `[a-z0-9-]`
/// replaced by `-`, and a leading or trailing `-` replaced by `a`.
///
/// # Errors
///
/// Returns a general error if `name` is empty.
pub fn replace_host_special_char(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(ServiceError::general("generated host is not valid"));
    }
    let mut host: Vec<char> = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if let Some(first) = host.first_mut() {
        if *first == '-' {
            *first = 'a';
        }
    }
    if let Some(last) = host.last_mut() {
        if *last == '-' {
            *last = 'a';
        }
    }
    Ok(host.into_iter().collect())
}

/// Namespace of a provisioned instance.
#[must_use]
pub fn build_namespace(dinosaur: &DinosaurRequest) -> String {
    format!("{DINOSAUR_NAMESPACE_PREFIX}-{}", dinosaur.id.to_lowercase())
}

#[async_trait]
impl DinosaurService for DefaultDinosaurService {
    async fn register_job(&self, mut dinosaur: DinosaurRequest) -> Result<DinosaurRequest> {
        let _guard = self.registration_lock.lock().await;

        dinosaur.id = new_id();

        if !self.has_available_capacity().await? {
            return Err(ServiceError::too_many_instances_reached(format!(
                "Cluster capacity({}) exhausted",
                self.dinosaur_config.max_capacity
            )));
        }
        if !self.has_available_capacity_in_region(&dinosaur).await? {
            return Err(ServiceError::too_many_instances_reached(format!(
                "Cluster capacity({}) exhausted in {} region",
                self.dataplane_config.capacity_for_region(&dinosaur.region),
                dinosaur.region
            )));
        }

        let instance_type = self.detect_instance_type(&dinosaur).await?;
        if instance_type == InstanceType::Eval {
            if !self.dinosaur_config.allow_eval_instance {
                return Err(ServiceError::forbidden(
                    "dinosaur eval instances are not allowed",
                ));
            }
            let has_eval = self.live_rows().await?.iter().any(|d| {
                d.instance_type == InstanceType::Eval
                    && d.owner == dinosaur.owner
                    && d.organisation_id == dinosaur.organisation_id
            });
            if has_eval {
                return Err(ServiceError::too_many_instances_reached(
                    "only one eval instance is allowed",
                ));
            }
        }

        let quota_service = self
            .quota_factory
            .get_quota_service(&self.dinosaur_config.quota_type)?;
        dinosaur.instance_type = instance_type;
        let subscription_id = quota_service.reserve_quota(&dinosaur, instance_type).await?;

        dinosaur.status = DinosaurStatus::Accepted;
        dinosaur.subscription_id = subscription_id;
        dinosaur.quota_type.clone_from(&self.dinosaur_config.quota_type);
        let now = Utc::now();
        dinosaur.created_at = now;
        dinosaur.updated_at = now;

        self.store
            .insert(&dinosaur)
            .await
            .map_err(|e| wrap(e, "failed to create dinosaur request"))?;
        info!(
            dinosaur_id = %dinosaur.id,
            owner = %dinosaur.owner,
            region = %dinosaur.region,
            instance_type = %instance_type,
            "dinosaur request accepted"
        );
        Ok(dinosaur)
    }

    async fn get_by_id(&self, id: &str) -> Result<DinosaurRequest> {
        if id.is_empty() {
            return Err(ServiceError::validation("id is undefined"));
        }
        self.store
            .get(id)
            .await
            .map_err(|e| wrap(e, "unable to find dinosaur request"))?
            .ok_or_else(|| ServiceError::not_found(format!("Dinosaur with id='{id}' not found")))
    }

    async fn list_by_status(&self, statuses: &[DinosaurStatus]) -> Result<Vec<DinosaurRequest>> {
        if statuses.is_empty() {
            return Err(ServiceError::general("no status provided"));
        }
        Ok(self
            .live_rows()
            .await?
            .into_iter()
            .filter(|d| statuses.contains(&d.status))
            .collect())
    }

    async fn prepare_dinosaur_request(&self, dinosaur: &DinosaurRequest) -> Result<()> {
        let cluster_dns = self
            .cluster_service
            .get_cluster_dns(&dinosaur.cluster_id)
            .await
            .map_err(|e| wrap(e, "error retrieving cluster DNS"))?;
        let cluster_dns = cluster_dns.replacen(
            DEFAULT_INGRESS_DNS_NAME_PREFIX,
            MANAGED_DINOSAUR_INGRESS_DNS_NAME_PREFIX,
            1,
        );

        let identifier = replace_host_special_char(&build_truncated_dinosaur_identifier(dinosaur))
            .map_err(|e| wrap(e, "generated host is not valid"))?;
        let host = if self.dinosaur_config.enable_external_certificate {
            format!("{identifier}.{}", self.dinosaur_config.domain_name)
        } else {
            format!("{identifier}.{cluster_dns}")
        };
        let namespace = build_namespace(dinosaur);
        let placement_id = new_id();

        self.update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
            d.host.clone_from(&host);
            d.placement_id.clone_from(&placement_id);
            d.namespace.clone_from(&namespace);
            d.status = DinosaurStatus::Provisioning;
        })
        .await
        .map_err(|e| wrap(e, "failed to update dinosaur request"))?;
        info!(dinosaur_id = %dinosaur.id, host = %host, "dinosaur request prepared");
        Ok(())
    }

    async fn update(&self, dinosaur: &DinosaurRequest) -> Result<()> {
        let replacement = dinosaur.clone();
        self.store
            .update_where(
                &dinosaur.id,
                &|d: &DinosaurRequest| !d.status.is_deletion(),
                &|d: &mut DinosaurRequest| {
                    let created_at = d.created_at;
                    *d = replacement.clone();
                    d.created_at = created_at;
                },
            )
            .await
            .map_err(|e| wrap(e, "Failed to update dinosaur"))?;
        Ok(())
    }

    async fn update_fields(&self, id: &str, mutate: Mutation<'_, DinosaurRequest>) -> Result<bool> {
        self.store
            .update_where(id, &|d: &DinosaurRequest| !d.status.is_deletion(), mutate)
            .await
            .map_err(|e| wrap(e, "Failed to update dinosaur"))
    }

    async fn update_status(&self, id: &str, status: DinosaurStatus) -> Result<bool> {
        let current = self
            .store
            .get(id)
            .await
            .map_err(|e| wrap(e, "failed to update status"))?
            .ok_or_else(|| ServiceError::not_found(format!("Dinosaur with id='{id}' not found")))?;

        if !is_status_update_allowed(current.status, status) {
            debug!(
                dinosaur_id = %id,
                current = %current.status,
                target = %status,
                "status update refused"
            );
            return Ok(false);
        }

        let updated = self
            .store
            .update_where(
                id,
                &|d: &DinosaurRequest| is_status_update_allowed(d.status, status),
                &|d: &mut DinosaurRequest| d.status = status,
            )
            .await
            .map_err(|e| wrap(e, "failed to update status"))?;
        if updated {
            info!(
                dinosaur_id = %id,
                from = %current.status,
                to = %status,
                "dinosaur status updated"
            );
        }
        Ok(updated)
    }

    async fn register_deprovision_job(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(ServiceError::validation("id is undefined"));
        }
        self.get_by_id(id).await?;

        match self.update_status(id, DinosaurStatus::Deprovision).await {
            Ok(true) => {
                record_dinosaur_operation(OPERATION_DEPROVISION, true, 1);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                record_dinosaur_operation(OPERATION_DEPROVISION, false, 1);
                Err(e)
            }
        }
    }

    async fn deprovision_dinosaurs_for_users(&self, users: &[String]) -> Result<usize> {
        if users.is_empty() {
            return Ok(0);
        }
        let affected = self
            .store
            .update_many(
                &|d: &DinosaurRequest| users.contains(&d.owner) && !d.status.is_deletion(),
                &|d: &mut DinosaurRequest| d.status = DinosaurStatus::Deprovision,
            )
            .await
            .map_err(|e| wrap(e, "Unable to deprovision dinosaur requests for users"))?;
        if affected > 0 {
            info!(
                count = affected,
                users = ?users,
                "dinosaurs are now deprovisioning for denied users"
            );
            record_dinosaur_operation(OPERATION_DEPROVISION, true, affected);
        }
        Ok(affected)
    }

    async fn deprovision_expired_dinosaurs(&self, age_hours: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::hours(age_hours);
        let affected = self
            .store
            .update_many(
                &|d: &DinosaurRequest| {
                    d.instance_type == InstanceType::Eval
                        && d.created_at <= cutoff
                        && !d.status.is_deletion()
                },
                &|d: &mut DinosaurRequest| d.status = DinosaurStatus::Deprovision,
            )
            .await
            .map_err(|e| wrap(e, "unable to deprovision expired dinosaurs"))?;
        if affected > 0 {
            info!(
                count = affected,
                age_hours, "expired eval dinosaurs are now deprovisioning"
            );
            record_dinosaur_operation(OPERATION_DEPROVISION, true, affected);
        }
        Ok(affected)
    }

    async fn delete(&self, dinosaur: &DinosaurRequest) -> Result<()> {
        if !dinosaur.cluster_id.is_empty()
            && dinosaur.routes.is_some()
            && self.dinosaur_config.enable_external_certificate
        {
            if let Err(e) = self
                .change_dinosaur_cname_records(dinosaur, ChangeAction::Delete)
                .await
            {
                record_dinosaur_operation(OPERATION_DELETE, false, 1);
                return Err(e);
            }
        }

        if let Err(e) = self.store.soft_delete(&dinosaur.id).await {
            record_dinosaur_operation(OPERATION_DELETE, false, 1);
            return Err(wrap(
                e,
                format!("unable to delete dinosaur request with id {}", dinosaur.id),
            ));
        }
        record_dinosaur_operation(OPERATION_DELETE, true, 1);
        info!(dinosaur_id = %dinosaur.id, "dinosaur request deleted");
        Ok(())
    }

    async fn count_by_status(
        &self,
        statuses: &[DinosaurStatus],
    ) -> Result<Vec<DinosaurStatusCount>> {
        let rows = self.live_rows().await?;
        Ok(statuses
            .iter()
            .map(|&status| DinosaurStatusCount {
                status,
                count: rows.iter().filter(|d| d.status == status).count(),
            })
            .collect())
    }

    async fn count_by_region_and_instance_type(&self) -> Result<Vec<DinosaurRegionCount>> {
        let mut groups: BTreeMap<(String, &'static str, String), DinosaurRegionCount> =
            BTreeMap::new();
        for d in self.live_rows().await? {
            groups
                .entry((
                    d.region.clone(),
                    d.instance_type.as_str(),
                    d.cluster_id.clone(),
                ))
                .or_insert_with(|| DinosaurRegionCount {
                    region: d.region.clone(),
                    instance_type: d.instance_type,
                    cluster_id: d.cluster_id.clone(),
                    count: 0,
                })
                .count += 1;
        }
        Ok(groups.into_values().collect())
    }

    async fn list_dinosaurs_with_routes_not_created(&self) -> Result<Vec<DinosaurRequest>> {
        Ok(self
            .live_rows()
            .await?
            .into_iter()
            .filter(|d| d.routes.is_some() && !d.routes_created)
            .collect())
    }

    async fn list_dinosaurs_to_promote(&self) -> Result<Vec<DinosaurRequest>> {
        Ok(self
            .live_rows()
            .await?
            .into_iter()
            .filter(|d| d.status == DinosaurStatus::Ready && d.is_promotion_requested())
            .collect())
    }

    async fn get_managed_dinosaurs_by_cluster_id(
        &self,
        cluster_id: &str,
    ) -> Result<Vec<ManagedDinosaur>> {
        Ok(self
            .live_rows()
            .await?
            .iter()
            .filter(|d| {
                d.cluster_id == cluster_id
                    && DinosaurStatus::MANAGED.contains(&d.status)
                    && !d.host.is_empty()
            })
            .map(ManagedDinosaur::from)
            .collect())
    }

    async fn change_dinosaur_cname_records(
        &self,
        dinosaur: &DinosaurRequest,
        action: ChangeAction,
    ) -> Result<ChangeInfo> {
        let routes = dinosaur
            .routes
            .as_deref()
            .ok_or_else(|| ServiceError::general("failed to get routes"))?;
        let batch = build_cname_batch(routes, action);

        let result = self
            .dns
            .change_resource_record_sets(&self.dinosaur_config.domain_name, batch)
            .await;
        match suppress_idempotent(result) {
            Ok(Some(info)) => {
                record_dns_change(action.as_str(), "success");
                debug!(
                    dinosaur_id = %dinosaur.id,
                    action = %action,
                    change_id = %info.id,
                    "submitted CNAME records"
                );
                Ok(info)
            }
            Ok(None) => {
                record_dns_change(action.as_str(), "suppressed");
                Ok(ChangeInfo {
                    id: String::new(),
                    status: DNS_CHANGE_STATUS_INSYNC.to_string(),
                })
            }
            Err(e) => {
                record_dns_change(action.as_str(), "error");
                warn!(
                    dinosaur_id = %dinosaur.id,
                    action = %action,
                    error = %e,
                    transient = e.is_transient(),
                    "CNAME change failed"
                );
                Err(wrap_dns(e, "Unable to create domain record sets"))
            }
        }
    }

    async fn get_cname_record_status(&self, dinosaur: &DinosaurRequest) -> Result<ChangeInfo> {
        self.dns
            .get_change(&dinosaur.routes_creation_id)
            .await
            .map_err(|e| wrap_dns(e, "Unable to get CNAME record status"))
    }
}
