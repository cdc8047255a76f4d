// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Requests waiting for their agent.
//!
//! Nothing moves a request out of `provisioning` here: the agent of the hosting cluster
//! does, through the data-plane status protocol. This reconciler only publishes how long
//! requests have been waiting, as the longest wait per cluster.

use super::Reconcile;
use crate::constants::WORKER_PROVISIONING;
use crate::metrics::update_provisioning_wait;
use crate::models::DinosaurStatus;
use crate::services::DinosaurService;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub struct ProvisioningDinosaurReconciler {
    dinosaur_service: Arc<dyn DinosaurService>,
}

impl ProvisioningDinosaurReconciler {
    #[must_use]
    pub fn new(dinosaur_service: Arc<dyn DinosaurService>) -> Self {
        Self { dinosaur_service }
    }
}

#[async_trait]
impl Reconcile for ProvisioningDinosaurReconciler {
    fn name(&self) -> &'static str {
        WORKER_PROVISIONING
    }

    async fn reconcile(&self) -> Vec<anyhow::Error> {
        let dinosaurs = match self
            .dinosaur_service
            .list_by_status(&[DinosaurStatus::Provisioning])
            .await
        {
            Ok(dinosaurs) => dinosaurs,
            Err(e) => return vec![anyhow!(e).context("failed to list provisioning dinosaurs")],
        };

        let now = Utc::now();
        let mut longest_waits: BTreeMap<String, std::time::Duration> = BTreeMap::new();
        for dinosaur in &dinosaurs {
            let waiting = (now - dinosaur.updated_at).to_std().unwrap_or_default();
            debug!(
                dinosaur_id = %dinosaur.id,
                cluster_id = %dinosaur.cluster_id,
                waiting_secs = waiting.as_secs(),
                "dinosaur waiting for its agent"
            );
            let longest = longest_waits.entry(dinosaur.cluster_id.clone()).or_default();
            *longest = (*longest).max(waiting);
        }
        update_provisioning_wait(&longest_waits);
        debug!(count = dinosaurs.len(), "reconciled provisioning dinosaurs");
        Vec::new()
    }
}
