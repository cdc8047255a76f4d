// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconcilers of the fleet manager.
//!
//! Each reconciler owns one bucket of work, usually the instance requests in one
//! lifecycle status, and advances every item of the bucket on each tick. Ticks are
//! driven by the [`Scheduler`](crate::workers::Scheduler).
//!
//! # Reconciliation Model
//!
//! 1. **List** - Fetch the requests (or clusters) of the bucket
//! 2. **Advance** - Process each item on its own, sequentially
//! 3. **Collect** - Gather per-item failures instead of aborting the batch
//!
//! A tick returns every error it met. One failing item never blocks the others, and
//! running a tick again over already advanced items is a no-op: the status refusal
//! rule of the [`DinosaurService`](crate::services::DinosaurService) and the
//! idempotent route handling guard every write.
//!
//! # Available Reconcilers
//!
//! ## Instance lifecycle
//!
//! - [`AcceptedDinosaurReconciler`] - Places accepted requests on a cluster
//! - [`PreparingDinosaurReconciler`] - Assigns host and namespace, retrying server errors
//! - [`ProvisioningDinosaurReconciler`] - Reports requests waiting for their agent
//! - [`ReadyDinosaurReconciler`] - Post-ready maintenance (canary accounts)
//! - [`DeletingDinosaurReconciler`] - Releases quota and deletes torn down requests
//! - [`GeneralDinosaurReconciler`] - Status gauges, deny list and expiry
//!
//! ## Cross-cutting
//!
//! - [`DnsRoutesReconciler`] - Creates and polls the CNAME records of instance routes
//! - [`PromotionReconciler`] - Moves requests to a new billing model
//! - [`ClusterManager`] - Drives the lifecycle of data-plane clusters

pub mod accepted;
pub mod chain;
pub mod cluster_manager;
pub mod deleting;
pub mod dns_routes;
pub mod general;
pub mod preparing;
pub mod promotion;
pub mod provisioning;
pub mod ready;

#[cfg(test)]
mod cluster_manager_tests;
#[cfg(test)]
mod deleting_tests;

pub use accepted::AcceptedDinosaurReconciler;
pub use chain::{ActionOutcome, ChainOutcome, ReconcileAction, ReconcileChain};
pub use cluster_manager::ClusterManager;
pub use deleting::DeletingDinosaurReconciler;
pub use dns_routes::DnsRoutesReconciler;
pub use general::GeneralDinosaurReconciler;
pub use preparing::PreparingDinosaurReconciler;
pub use promotion::PromotionReconciler;
pub use provisioning::ProvisioningDinosaurReconciler;
pub use ready::ReadyDinosaurReconciler;

use async_trait::async_trait;

/// One periodic unit of reconciliation work.
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Worker name, used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Run one tick and return every error met while processing the batch.
    async fn reconcile(&self) -> Vec<anyhow::Error>;
}
