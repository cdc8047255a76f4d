// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Fleet Manager - control plane for managed Dinosaur instances
//!
//! The fleet manager accepts requests for Dinosaur instances, places them on data-plane
//! clusters, and drives each request through its lifecycle while the agent running on
//! every cluster reports back what it observes.
//!
//! ## Overview
//!
//! - Requests move through `accepted → preparing → provisioning → ready`, and through
//!   `deprovision → deleting` once their owner (or the control plane) removes them
//! - Independent reconcilers tick on their own schedule, each over one status bucket
//! - Cluster agents report cluster readiness and instance conditions over HTTP
//! - Instance routes are published as CNAME records when external certificates are used
//!
//! ## Modules
//!
//! - [`services`] - cluster and dinosaur services, placement, data-plane synchronization
//! - [`reconcilers`] - lifecycle reconcilers, DNS routes, promotion, cluster manager
//! - [`workers`] - scheduler running the reconcilers, with an early-wake signal bus
//! - [`agent_api`] - HTTP endpoints of the data-plane protocol and `/metrics`
//! - [`store`] - persistence seam with an in-memory engine
//! - [`providers`], [`quota`], [`dns`] - collaborator seams and their built-in implementations
//!
//! ## Example
//!
//! ```rust,no_run
//! use fleet_manager::config::FleetConfig;
//!
//! let config = FleetConfig::from_yaml(
//!     r"
//! dataplane:
//!   clusters:
//!     - cluster_id: cluster-1
//!       region: us-east-1
//!       dinosaur_instance_limit: 5
//! ",
//! )
//! .expect("valid configuration");
//! assert_eq!(config.dataplane.capacity_for_region("us-east-1"), 5);
//! ```

pub mod agent_api;
pub mod config;
pub mod constants;
pub mod dns;
pub mod dns_errors;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod quota;
pub mod reconcilers;
pub mod services;
pub mod status_reasons;
pub mod store;
pub mod workers;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod agent_api_tests;
