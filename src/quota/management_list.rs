// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Quota service backed by the configured quota management list.
//!
//! Organisations and service accounts on the list may create STANDARD instances up to
//! their configured maximum. Everyone else may only create EVAL instances, one at a time.
//! Nothing is reserved with an external system, so subscription ids are always empty
//! and deleting quota is a no-op.

use super::QuotaService;
use crate::config::QuotaManagementListConfig;
use crate::constants::DEFAULT_MAX_ALLOWED_EVAL_INSTANCES;
use crate::errors::{Result, ServiceError};
use crate::models::{DinosaurRequest, InstanceType};
use crate::store::DinosaurStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct QuotaManagementListService {
    store: Arc<DinosaurStore>,
    quota_list: Arc<QuotaManagementListConfig>,
}

impl QuotaManagementListService {
    #[must_use]
    pub fn new(store: Arc<DinosaurStore>, quota_list: Arc<QuotaManagementListConfig>) -> Self {
        Self { store, quota_list }
    }

    /// Live instances of `instance_type` held by the organisation or the owner,
    /// not counting `dinosaur` itself.
    async fn count_instances(
        &self,
        dinosaur: &DinosaurRequest,
        instance_type: InstanceType,
        filter_by_org: bool,
    ) -> Result<i64> {
        let rows = self.store.list().await.map_err(|e| {
            ServiceError::with_cause(
                e.code,
                &e,
                format!("failed to count dinosaur instances of type '{instance_type}'"),
            )
        })?;
        let count = rows
            .iter()
            .filter(|r| r.id != dinosaur.id && r.instance_type == instance_type)
            .filter(|r| {
                if filter_by_org {
                    r.organisation_id == dinosaur.organisation_id
                } else {
                    r.owner == dinosaur.owner
                }
            })
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}

#[async_trait]
impl QuotaService for QuotaManagementListService {
    async fn check_if_quota_is_defined_for_instance_type(
        &self,
        dinosaur: &DinosaurRequest,
        instance_type: InstanceType,
    ) -> Result<bool> {
        if !self.quota_list.enable_instance_limit_control {
            return Ok(true);
        }

        let org_registered = self
            .quota_list
            .organisation(&dinosaur.organisation_id)
            .is_some_and(|o| o.is_user_registered(&dinosaur.owner));
        let listed = org_registered || self.quota_list.service_account(&dinosaur.owner).is_some();

        // listed users get STANDARD quota, everyone else EVAL only
        Ok(match instance_type {
            InstanceType::Standard => listed,
            InstanceType::Eval => !listed,
        })
    }

    async fn reserve_quota(
        &self,
        dinosaur: &DinosaurRequest,
        instance_type: InstanceType,
    ) -> Result<String> {
        if !self.quota_list.enable_instance_limit_control {
            return Ok(String::new());
        }

        let owner = &dinosaur.owner;
        let org_id = &dinosaur.organisation_id;

        let (max_allowed, message, filter_by_org) = match self.quota_list.organisation(org_id) {
            Some(org) if org.is_user_registered(owner) => (
                Some(org.max_allowed_instances),
                format!(
                    "Organization '{org_id}' has reached a maximum number of {} allowed instances.",
                    org.max_allowed_instances
                ),
                true,
            ),
            _ => match self.quota_list.service_account(owner) {
                Some(account) => (
                    Some(account.max_allowed_instances),
                    format!(
                        "User '{owner}' has reached a maximum number of {} allowed instances.",
                        account.max_allowed_instances
                    ),
                    false,
                ),
                None => (
                    None,
                    format!(
                        "User '{owner}' has reached a maximum number of {DEFAULT_MAX_ALLOWED_EVAL_INSTANCES} allowed instances."
                    ),
                    false,
                ),
            },
        };

        let count = self
            .count_instances(
                dinosaur,
                instance_type,
                filter_by_org && instance_type != InstanceType::Eval,
            )
            .await?;
        debug!(
            dinosaur_id = %dinosaur.id,
            owner = %owner,
            instance_type = %instance_type,
            count,
            "checking quota management list"
        );

        match (max_allowed, instance_type) {
            (Some(max), InstanceType::Standard) => {
                if count < max {
                    Ok(String::new())
                } else {
                    Err(ServiceError::max_allowed_instance_reached(message))
                }
            }
            (None, InstanceType::Eval) => {
                if count >= DEFAULT_MAX_ALLOWED_EVAL_INSTANCES {
                    Err(ServiceError::max_allowed_instance_reached(message))
                } else {
                    Ok(String::new())
                }
            }
            _ => Err(ServiceError::insufficient_quota("Insufficient Quota")),
        }
    }

    async fn reserve_quota_if_not_already_reserved(
        &self,
        dinosaur: &DinosaurRequest,
    ) -> Result<String> {
        if !dinosaur.subscription_id.is_empty() {
            return Ok(dinosaur.subscription_id.clone());
        }
        self.reserve_quota(dinosaur, dinosaur.instance_type).await
    }

    async fn delete_quota(&self, _subscription_id: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_quota_for_billing_model(
        &self,
        _subscription_id: &str,
        _billing_model: &str,
    ) -> Result<()> {
        Ok(())
    }
}
