// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Quota reservation.
//!
//! Every request reserves quota before it is stored and releases it when it is deleted.
//! Requests remember the quota type they were admitted with, so the
//! [`QuotaServiceFactory`] is always asked for the service of the request itself,
//! never for the currently configured one.

pub mod management_list;

use crate::errors::{Result, ServiceError};
use crate::models::{DinosaurRequest, InstanceType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Reserves and releases usage quota for instance requests.
#[async_trait]
pub trait QuotaService: Send + Sync {
    /// Whether the owner of `dinosaur` has quota for `instance_type` at all.
    async fn check_if_quota_is_defined_for_instance_type(
        &self,
        dinosaur: &DinosaurRequest,
        instance_type: InstanceType,
    ) -> Result<bool>;

    /// Reserve quota for `dinosaur`. Returns the subscription id, empty when the
    /// service does not track subscriptions.
    async fn reserve_quota(
        &self,
        dinosaur: &DinosaurRequest,
        instance_type: InstanceType,
    ) -> Result<String>;

    /// Reserve quota for the desired billing model of `dinosaur` unless a reservation
    /// already exists for it.
    async fn reserve_quota_if_not_already_reserved(&self, dinosaur: &DinosaurRequest)
        -> Result<String>;

    async fn delete_quota(&self, subscription_id: &str) -> Result<()>;

    async fn delete_quota_for_billing_model(
        &self,
        subscription_id: &str,
        billing_model: &str,
    ) -> Result<()>;
}

/// Registry of quota services keyed by quota type.
#[derive(Default, Clone)]
pub struct QuotaServiceFactory {
    services: HashMap<String, Arc<dyn QuotaService>>,
}

impl QuotaServiceFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_service(
        mut self,
        quota_type: impl Into<String>,
        service: Arc<dyn QuotaService>,
    ) -> Self {
        self.services.insert(quota_type.into(), service);
        self
    }

    /// Look up the quota service of `quota_type`.
    ///
    /// # Errors
    ///
    /// Returns a general error if no service is registered for the type.
    pub fn get_quota_service(&self, quota_type: &str) -> Result<Arc<dyn QuotaService>> {
        self.services
            .get(quota_type)
            .cloned()
            .ok_or_else(|| {
                ServiceError::general(format!("invalid quota service type: {quota_type}"))
            })
    }
}

impl std::fmt::Debug for QuotaServiceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaServiceFactory")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}
