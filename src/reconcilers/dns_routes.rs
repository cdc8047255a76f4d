// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CNAME records of instance routes.
//!
//! Works on requests whose routes are known but not yet created:
//!
//! - **External certificates disabled** - routes live under the cluster domain and
//!   need no record; they are marked created right away.
//! - **No change id yet** - the CNAME batch is submitted, its change id stored, and the
//!   routes marked created if the provider already reports the change in sync.
//! - **Change id present** - the change is polled and the routes marked created once
//!   it is in sync.

use super::Reconcile;
use crate::config::DinosaurConfig;
use crate::constants::{DNS_CHANGE_STATUS_INSYNC, WORKER_DNS_ROUTES};
use crate::dns::ChangeAction;
use crate::models::DinosaurRequest;
use crate::services::DinosaurService;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct DnsRoutesReconciler {
    dinosaur_service: Arc<dyn DinosaurService>,
    dinosaur_config: Arc<DinosaurConfig>,
}

impl DnsRoutesReconciler {
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

    /// Advance the route records of one request.
    ///
    /// # Errors
    ///
    /// Returns an error if the DNS provider or the store fails.
    pub async fn reconcile_dinosaur_routes(
        &self,
        dinosaur: &DinosaurRequest,
    ) -> anyhow::Result<()> {
        if !self.dinosaur_config.enable_external_certificate {
            return self.mark_routes_created(dinosaur).await;
        }

        if dinosaur.routes_creation_id.is_empty() {
            let change = self
                .dinosaur_service
                .change_dinosaur_cname_records(dinosaur, ChangeAction::Create)
                .await
                .with_context(|| {
                    format!("failed to create CNAME records for dinosaur {}", dinosaur.id)
                })?;
            let in_sync = change.status == DNS_CHANGE_STATUS_INSYNC;
            self.dinosaur_service
                .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
                    d.routes_creation_id.clone_from(&change.id);
                    d.routes_created = in_sync;
                })
                .await
                .with_context(|| {
                    format!("failed to store route change of dinosaur {}", dinosaur.id)
                })?;
            info!(
                dinosaur_id = %dinosaur.id,
                change_id = %change.id,
                status = %change.status,
                "CNAME records submitted"
            );
            return Ok(());
        }

        let change = self
            .dinosaur_service
            .get_cname_record_status(dinosaur)
            .await
            .with_context(|| {
                format!("failed to get CNAME record status for dinosaur {}", dinosaur.id)
            })?;
        if change.status == DNS_CHANGE_STATUS_INSYNC {
            self.mark_routes_created(dinosaur).await?;
        } else {
            debug!(
                dinosaur_id = %dinosaur.id,
                change_id = %change.id,
                status = %change.status,
                "CNAME records still propagating"
            );
        }
        Ok(())
    }

    async fn mark_routes_created(&self, dinosaur: &DinosaurRequest) -> anyhow::Result<()> {
        self.dinosaur_service
            .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| d.routes_created = true)
            .await
            .with_context(|| {
                format!("failed to mark routes created for dinosaur {}", dinosaur.id)
            })?;
        info!(dinosaur_id = %dinosaur.id, "dinosaur routes created");
        Ok(())
    }
}

#[async_trait]
impl Reconcile for DnsRoutesReconciler {
    fn name(&self) -> &'static str {
        WORKER_DNS_ROUTES
    }

    async fn reconcile(&self) -> Vec<anyhow::Error> {
        let dinosaurs = match self
            .dinosaur_service
            .list_dinosaurs_with_routes_not_created()
            .await
        {
            Ok(dinosaurs) => dinosaurs,
            Err(e) => {
                return vec![
                    anyhow!(e).context("failed to list dinosaurs whose routes are not created")
                ]
            }
        };
        debug!(count = dinosaurs.len(), "reconciling dinosaur routes");

        let mut errors = Vec::new();
        for dinosaur in &dinosaurs {
            if let Err(e) = self.reconcile_dinosaur_routes(dinosaur).await {
                error!(
                    dinosaur_id = %dinosaur.id,
                    error = %e,
                    "failed to reconcile dinosaur routes"
                );
                errors.push(e);
            }
        }
        errors
    }
}
