// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Promotion of requests to a new billing model.
//!
//! A request whose desired billing model differs from its actual one is moved over by
//! a [`ReconcileChain`] of three steps:
//!
//! 1. **reserve** - reserve quota for the desired billing model, recording the new
//!    subscription
//! 2. **release** - delete the quota held for the actual billing model
//! 3. **persist** - store the new subscription and billing model, clearing the
//!    promotion markers
//!
//! When a step fails, the subscription reserved so far is recorded in
//! `promotion_subscription_id` while `subscription_id` keeps pointing at the quota of the
//! actual billing model. A recoverable failure leaves the request `promoting` and the
//! next tick reuses the recorded reservation; any other failure marks the promotion
//! `failed`, which takes the request out of this bucket.

use super::chain::{ActionOutcome, ReconcileAction, ReconcileChain};
use super::Reconcile;
use crate::constants::WORKER_PROMOTION;
use crate::errors::{Result, ServiceError};
use crate::metrics::record_dinosaur_operation;
use crate::models::{DinosaurRequest, PromotionStatus};
use crate::quota::QuotaServiceFactory;
use crate::services::DinosaurService;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Metric label of promotions.
const OPERATION_PROMOTE: &str = "promote";

/// State accumulated by the promotion steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Promotion {
    /// Subscription reserved for the desired billing model
    pub subscription_id: Option<String>,
}

struct ReserveQuota {
    quota_factory: QuotaServiceFactory,
}

#[async_trait]
impl ReconcileAction<DinosaurRequest, Promotion> for ReserveQuota {
    fn name(&self) -> &'static str {
        "reserve"
    }

    async fn apply(
        &self,
        dinosaur: &DinosaurRequest,
        result: &mut Promotion,
    ) -> Result<ActionOutcome> {
        let quota_service = self.quota_factory.get_quota_service(&dinosaur.quota_type)?;

        // the held subscription belongs to the actual billing model, a previous attempt's
        // reservation is reused
        let mut target = dinosaur.clone();
        target
            .subscription_id
            .clone_from(&dinosaur.promotion_subscription_id);
        let subscription_id = quota_service
            .reserve_quota_if_not_already_reserved(&target)
            .await?;
        debug!(
            dinosaur_id = %dinosaur.id,
            subscription_id = %subscription_id,
            "reserved quota for promotion"
        );
        result.subscription_id = Some(subscription_id);
        Ok(ActionOutcome::Continue)
    }
}

struct ReleaseQuota {
    quota_factory: QuotaServiceFactory,
}

#[async_trait]
impl ReconcileAction<DinosaurRequest, Promotion> for ReleaseQuota {
    fn name(&self) -> &'static str {
        "release"
    }

    async fn apply(
        &self,
        dinosaur: &DinosaurRequest,
        _result: &mut Promotion,
    ) -> Result<ActionOutcome> {
        let quota_service = self.quota_factory.get_quota_service(&dinosaur.quota_type)?;
        quota_service
            .delete_quota_for_billing_model(
                &dinosaur.subscription_id,
                &dinosaur.actual_billing_model,
            )
            .await?;
        Ok(ActionOutcome::Continue)
    }
}

struct PersistPromotion {
    dinosaur_service: Arc<dyn DinosaurService>,
}

#[async_trait]
impl ReconcileAction<DinosaurRequest, Promotion> for PersistPromotion {
    fn name(&self) -> &'static str {
        "persist"
    }

    async fn apply(
        &self,
        dinosaur: &DinosaurRequest,
        result: &mut Promotion,
    ) -> Result<ActionOutcome> {
        let subscription_id = result.subscription_id.clone().unwrap_or_default();
        let billing_model = dinosaur.desired_billing_model.clone();
        self.dinosaur_service
            .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
                d.subscription_id.clone_from(&subscription_id);
                d.actual_billing_model.clone_from(&billing_model);
                d.promotion_status = PromotionStatus::NoPromotion;
                d.promotion_details.clear();
                d.promotion_subscription_id.clear();
            })
            .await
            .map_err(ServiceError::recoverable)?;
        Ok(ActionOutcome::Continue)
    }
}

pub struct PromotionReconciler {
    dinosaur_service: Arc<dyn DinosaurService>,
    chain: ReconcileChain<DinosaurRequest, Promotion>,
}

impl PromotionReconciler {
    #[must_use]
    pub fn new(
        dinosaur_service: Arc<dyn DinosaurService>,
        quota_factory: QuotaServiceFactory,
    ) -> Self {
        let chain = ReconcileChain::new()
            .with_action(ReserveQuota {
                quota_factory: quota_factory.clone(),
            })
            .with_action(ReleaseQuota { quota_factory })
            .with_action(PersistPromotion {
                dinosaur_service: dinosaur_service.clone(),
            });
        Self {
            dinosaur_service,
            chain,
        }
    }

    /// Run the promotion chain over one request.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed step, after the request was updated with the
    /// promotion status it implies.
    pub async fn promote(&self, dinosaur: &DinosaurRequest) -> anyhow::Result<()> {
        let outcome = self.chain.run(dinosaur, Promotion::default()).await;
        let Some(err) = outcome.error else {
            record_dinosaur_operation(OPERATION_PROMOTE, true, 1);
            info!(
                dinosaur_id = %dinosaur.id,
                billing_model = %dinosaur.desired_billing_model,
                "dinosaur promoted"
            );
            return Ok(());
        };
        record_dinosaur_operation(OPERATION_PROMOTE, false, 1);

        let status = if err.is_recoverable() {
            PromotionStatus::Promoting
        } else {
            PromotionStatus::Failed
        };
        warn!(
            dinosaur_id = %dinosaur.id,
            step = outcome.stopped_at.unwrap_or_default(),
            status = status.as_str(),
            error = %err,
            "dinosaur promotion failed"
        );

        let subscription_id = outcome.result.subscription_id;
        let details = err.reason.clone();
        self.dinosaur_service
            .update_fields(&dinosaur.id, &|d: &mut DinosaurRequest| {
                if let Some(id) = &subscription_id {
                    d.promotion_subscription_id.clone_from(id);
                }
                d.promotion_status = status;
                d.promotion_details.clone_from(&details);
            })
            .await
            .with_context(|| {
                format!("failed to update promotion status of dinosaur {}", dinosaur.id)
            })?;

        Err(anyhow!(err)).with_context(|| format!("failed to promote dinosaur {}", dinosaur.id))
    }
}

#[async_trait]
impl Reconcile for PromotionReconciler {
    fn name(&self) -> &'static str {
        WORKER_PROMOTION
    }

    async fn reconcile(&self) -> Vec<anyhow::Error> {
        let dinosaurs = match self.dinosaur_service.list_dinosaurs_to_promote().await {
            Ok(dinosaurs) => dinosaurs,
            Err(e) => return vec![anyhow!(e).context("failed to list dinosaurs to promote")],
        };
        debug!(count = dinosaurs.len(), "reconciling dinosaur promotions");

        let mut errors = Vec::new();
        for dinosaur in &dinosaurs {
            if let Err(e) = self.promote(dinosaur).await {
                error!(
                    dinosaur_id = %dinosaur.id,
                    error = %e,
                    "failed to reconcile dinosaur promotion"
                );
                errors.push(e);
            }
        }
        errors
    }
}
