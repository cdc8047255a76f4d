// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Services of the fleet manager.
//!
//! Services own the persisted state. Reconcilers and the agent API never touch a store
//! directly; they call the services below, which return
//! [`ServiceError`](crate::errors::ServiceError)s.
//!
//! - [`clusters`]: data-plane clusters and their providers
//! - [`dinosaur`]: instance requests, their status rule and DNS records
//! - [`placement`]: choice of the cluster hosting a new instance
//! - [`data_plane_dinosaur`] and [`data_plane_cluster`]: status reports of the agents

pub mod clusters;
pub mod data_plane_cluster;
pub mod data_plane_dinosaur;
pub mod dinosaur;
pub mod placement;

pub use clusters::{ClusterService, DefaultClusterService};
pub use data_plane_cluster::DataPlaneClusterService;
pub use data_plane_dinosaur::DataPlaneDinosaurService;
pub use dinosaur::{DefaultDinosaurService, DinosaurService};
pub use placement::{new_cluster_placement_strategy, ClusterPlacementStrategy};

#[cfg(test)]
mod dinosaur_tests;
