// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Maintenance of ready instances.
//!
//! Ready requests are handed to post-ready hooks. The only hook today assigns the
//! canary service account client id of instances that have none.

use super::Reconcile;
use crate::constants::{CANARY_SERVICE_ACCOUNT_PREFIX, WORKER_READY};
use crate::models::{DinosaurRequest, DinosaurStatus};
use crate::services::DinosaurService;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct ReadyDinosaurReconciler {
    dinosaur_service: Arc<dyn DinosaurService>,
}

impl ReadyDinosaurReconciler {
    #[must_use]
    pub fn new(dinosaur_service: Arc<dyn DinosaurService>) -> Self {
        Self { dinosaur_service }
    }

    async fn reconcile_canary_service_account(
        &self,
        dinosaur: &DinosaurRequest,
    ) -> anyhow::Result<()> {
        if !dinosaur.canary_service_account_client_id.is_empty() {
            return Ok(());
        }
        let client_id = format!("{CANARY_SERVICE_ACCOUNT_PREFIX}-{}", dinosaur.id).to_lowercase();
        self.dinosaur_service
            .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
                if d.canary_service_account_client_id.is_empty() {
                    d.canary_service_account_client_id.clone_from(&client_id);
                }
            })
            .await
            .with_context(|| {
                format!(
                    "failed to update dinosaur {} with canary service account details",
                    dinosaur.id
                )
            })?;
        info!(
            dinosaur_id = %dinosaur.id,
            client_id = %client_id,
            "canary service account assigned"
        );
        Ok(())
    }
}

#[async_trait]
impl Reconcile for ReadyDinosaurReconciler {
    fn name(&self) -> &'static str {
        WORKER_READY
    }

    async fn reconcile(&self) -> Vec<anyhow::Error> {
        let dinosaurs = match self
            .dinosaur_service
            .list_by_status(&[DinosaurStatus::Ready])
            .await
        {
            Ok(dinosaurs) => dinosaurs,
            Err(e) => return vec![anyhow!(e).context("failed to list ready dinosaurs")],
        };
        debug!(count = dinosaurs.len(), "reconciling ready dinosaurs");

        let mut errors = Vec::new();
        for dinosaur in &dinosaurs {
            if let Err(e) = self.reconcile_canary_service_account(dinosaur).await {
                error!(
                    dinosaur_id = %dinosaur.id,
                    error = %e,
                    "failed to reconcile ready dinosaur"
                );
                errors.push(e);
            }
        }
        errors
    }
}
