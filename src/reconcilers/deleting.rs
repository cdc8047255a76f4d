// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deletion of torn down requests.
//!
//! Covers every `deleting` request, plus `deprovision` requests that never reached the
//! data plane (no host assigned) since no agent will ever report them deleted. For each
//! one the reserved quota is released, then the request is deleted (route records
//! removed, row soft deleted).

use super::Reconcile;
use crate::constants::WORKER_DELETING;
use crate::models::{DinosaurRequest, DinosaurStatus};
use crate::quota::QuotaServiceFactory;
use crate::services::DinosaurService;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct DeletingDinosaurReconciler {
    dinosaur_service: Arc<dyn DinosaurService>,
    quota_factory: QuotaServiceFactory,
}

impl DeletingDinosaurReconciler {
    #[must_use]
    pub fn new(
        dinosaur_service: Arc<dyn DinosaurService>,
        quota_factory: QuotaServiceFactory,
    ) -> Self {
        Self {
            dinosaur_service,
            quota_factory,
        }
    }

    /// Requests ready to be deleted.
    async fn list_deletable(&self) -> anyhow::Result<Vec<DinosaurRequest>> {
        let deletable = self
            .dinosaur_service
            .list_by_status(&[DinosaurStatus::Deleting, DinosaurStatus::Deprovision])
            .await
            .context("failed to list deleting dinosaurs")?
            .into_iter()
            .filter(|d| d.status == DinosaurStatus::Deleting || d.host.is_empty())
            .collect();
        Ok(deletable)
    }

    /// Release the quota of one request and delete it.
    ///
    /// # Errors
    ///
    /// Returns an error if the quota cannot be released or the request cannot be deleted.
    pub async fn reconcile_deleting_dinosaur(
        &self,
        dinosaur: &DinosaurRequest,
    ) -> anyhow::Result<()> {
        let quota_service = self
            .quota_factory
            .get_quota_service(&dinosaur.quota_type)
            .with_context(|| format!("failed to get quota service for dinosaur {}", dinosaur.id))?;
        quota_service
            .delete_quota(&dinosaur.subscription_id)
            .await
            .with_context(|| {
                format!("failed to delete subscription id {}", dinosaur.subscription_id)
            })?;

        self.dinosaur_service
            .delete(dinosaur)
            .await
            .with_context(|| format!("failed to delete dinosaur request {}", dinosaur.id))?;
        info!(dinosaur_id = %dinosaur.id, "dinosaur request released and deleted");
        Ok(())
    }
}

#[async_trait]
impl Reconcile for DeletingDinosaurReconciler {
    fn name(&self) -> &'static str {
        WORKER_DELETING
    }

    async fn reconcile(&self) -> Vec<anyhow::Error> {
        let dinosaurs = match self.list_deletable().await {
            Ok(dinosaurs) => dinosaurs,
            Err(e) => return vec![e],
        };
        debug!(count = dinosaurs.len(), "reconciling deleting dinosaurs");

        let mut errors = Vec::new();
        for dinosaur in &dinosaurs {
            if let Err(e) = self.reconcile_deleting_dinosaur(dinosaur).await {
                error!(dinosaur_id = %dinosaur.id, error = %e, "failed to delete dinosaur");
                errors.push(e);
            }
        }
        errors
    }
}
