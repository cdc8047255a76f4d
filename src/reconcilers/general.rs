// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Fleet-wide housekeeping.
//!
//! On each tick:
//!
//! 1. publish the number of requests per status, every status included
//! 2. publish the instances hosted per region, instance type and cluster
//! 3. deprovision every instance owned by a denied user
//! 4. deprovision EVAL instances older than their lifespan, when expiry is enabled

use super::Reconcile;
use crate::config::{AccessControlListConfig, DinosaurConfig};
use crate::constants::WORKER_GENERAL;
use crate::metrics::{update_cluster_capacity_used, update_dinosaur_status_counts};
use crate::models::DinosaurStatus;
use crate::services::DinosaurService;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

pub struct GeneralDinosaurReconciler {
    dinosaur_service: Arc<dyn DinosaurService>,
    dinosaur_config: Arc<DinosaurConfig>,
    access_control: Arc<AccessControlListConfig>,
}

impl GeneralDinosaurReconciler {
    #[must_use]
    pub fn new(
        dinosaur_service: Arc<dyn DinosaurService>,
        dinosaur_config: Arc<DinosaurConfig>,
        access_control: Arc<AccessControlListConfig>,
    ) -> Self {
        Self {
            dinosaur_service,
            dinosaur_config,
            access_control,
        }
    }

    async fn publish_metrics(&self) -> anyhow::Result<()> {
        let status_counts = self
            .dinosaur_service
            .count_by_status(&DinosaurStatus::ALL)
            .await
            .context("failed to count dinosaurs by status")?;
        update_dinosaur_status_counts(&status_counts);

        let region_counts = self
            .dinosaur_service
            .count_by_region_and_instance_type()
            .await
            .context("failed to count dinosaurs by region and instance type")?;
        update_cluster_capacity_used(&region_counts);
        Ok(())
    }

    async fn deprovision_denied_users(&self) -> anyhow::Result<()> {
        let denied = self.access_control.denied_users();
        if denied.is_empty() {
            return Ok(());
        }
        let count = self
            .dinosaur_service
            .deprovision_dinosaurs_for_users(denied)
            .await
            .context("failed to deprovision dinosaurs of denied users")?;
        debug!(count, "deny list applied");
        Ok(())
    }

    async fn deprovision_expired(&self) -> anyhow::Result<()> {
        if !self.dinosaur_config.is_expiry_enabled() {
            return Ok(());
        }
        let lifespan = self.dinosaur_config.eval_lifespan_hours;
        let count = self
            .dinosaur_service
            .deprovision_expired_dinosaurs(lifespan)
            .await
            .context("failed to deprovision expired dinosaurs")?;
        debug!(count, lifespan_hours = lifespan, "expiry applied");
        Ok(())
    }
}

#[async_trait]
impl Reconcile for GeneralDinosaurReconciler {
    fn name(&self) -> &'static str {
        WORKER_GENERAL
    }

    async fn reconcile(&self) -> Vec<anyhow::Error> {
        let results = [
            self.publish_metrics().await,
            self.deprovision_denied_users().await,
            self.deprovision_expired().await,
        ];

        results
            .into_iter()
            .filter_map(Result::err)
            .inspect(|e| error!(error = %e, "general dinosaur reconciliation step failed"))
            .collect()
    }
}
