// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Preparation of placed requests.
//!
//! A `preparing` request gets its host, namespace and placement id from
//! [`DinosaurService::prepare_dinosaur_request`], which moves it to `provisioning`.
//!
//! # Failure Handling
//!
//! - Server-class errors are retried on the following ticks until the request is older
//!   than the configured maximum duration with provisioning errors, then it is failed.
//! - Client-class errors fail the request immediately.

use super::Reconcile;
use crate::config::DinosaurConfig;
use crate::constants::WORKER_PREPARING;
use crate::errors::ServiceError;
use crate::metrics::record_dinosaur_operation;
use crate::models::{DinosaurRequest, DinosaurStatus};
use crate::services::DinosaurService;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Metric label of instance creations.
const OPERATION_CREATE: &str = "create";

pub struct PreparingDinosaurReconciler {
    dinosaur_service: Arc<dyn DinosaurService>,
    dinosaur_config: Arc<DinosaurConfig>,
}

impl PreparingDinosaurReconciler {
    #[must_use]
    pub fn new(
        dinosaur_service: Arc<dyn DinosaurService>,
        dinosaur_config: Arc<DinosaurConfig>,
    ) -> Self {
        Self {
            dinosaur_service,
            dinosaur_config,
        }
    }

    /// Prepare one request.
    ///
    /// # Errors
    ///
    /// Returns an error whenever preparation fails, whether or not the request was
    /// marked failed.
    pub async fn reconcile_preparing_dinosaur(
        &self,
        dinosaur: &DinosaurRequest,
    ) -> anyhow::Result<()> {
        match self.dinosaur_service.prepare_dinosaur_request(dinosaur).await {
            Ok(()) => Ok(()),
            Err(e) => self.handle_preparing_error(dinosaur, e).await,
        }
    }

    /// Classify a preparation failure and fail the request when it will not recover.
    pub(crate) async fn handle_preparing_error(
        &self,
        dinosaur: &DinosaurRequest,
        err: ServiceError,
    ) -> anyhow::Result<()> {
        if err.is_server_error_class() {
            let elapsed = (Utc::now() - dinosaur.created_at).to_std().unwrap_or_default();
            if elapsed <= self.dinosaur_config.max_duration_with_provisioning_errs() {
                warn!(
                    dinosaur_id = %dinosaur.id,
                    elapsed_secs = elapsed.as_secs(),
                    error = %err,
                    "preparing dinosaur failed, retrying on next tick"
                );
                return Err(anyhow!(err)).with_context(|| {
                    format!(
                        "failed to provision dinosaur {} on cluster {}",
                        dinosaur.id, dinosaur.cluster_id
                    )
                });
            }
        }

        self.mark_failed(dinosaur, &err.reason).await?;
        record_dinosaur_operation(OPERATION_CREATE, false, 1);
        Err(anyhow!(err))
            .with_context(|| format!("dinosaur {} failed while preparing", dinosaur.id))
    }

    async fn mark_failed(&self, dinosaur: &DinosaurRequest, reason: &str) -> anyhow::Result<()> {
        self.dinosaur_service
            .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
                d.status = DinosaurStatus::Failed;
                d.failed_reason = reason.to_string();
            })
            .await
            .with_context(|| format!("failed to update failed dinosaur {}", dinosaur.id))?;
        info!(dinosaur_id = %dinosaur.id, reason = %reason, "dinosaur marked failed");
        Ok(())
    }
}

#[async_trait]
impl Reconcile for PreparingDinosaurReconciler {
    fn name(&self) -> &'static str {
        WORKER_PREPARING
    }

    async fn reconcile(&self) -> Vec<anyhow::Error> {
        let dinosaurs = match self
            .dinosaur_service
            .list_by_status(&[DinosaurStatus::Preparing])
            .await
        {
            Ok(dinosaurs) => dinosaurs,
            Err(e) => return vec![anyhow!(e).context("failed to list preparing dinosaurs")],
        };
        debug!(count = dinosaurs.len(), "reconciling preparing dinosaurs");

        let mut errors = Vec::new();
        for dinosaur in &dinosaurs {
            if let Err(e) = self.reconcile_preparing_dinosaur(dinosaur).await {
                error!(
                    dinosaur_id = %dinosaur.id,
                    error = %e,
                    "failed to reconcile preparing dinosaur"
                );
                errors.push(e);
            }
        }
        errors
    }
}
