// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS client seam.
//!
//! Instance routes are published as CNAME records in the hosted zone of the configured
//! domain. Changes are submitted as batches and propagate asynchronously: the provider
//! returns a change id whose status moves from `PENDING` to `INSYNC`.
//!
//! # Example
//!
//! ```rust,no_run
//! use fleet_manager::dns::{build_cname_batch, ChangeAction};
//! use fleet_manager::models::DinosaurRoute;
//!
//! let routes = vec![DinosaurRoute {
//!     domain: "my-dino.dinosaur.example.com".to_string(),
//!     router: "router.mk.cluster-1.example.com".to_string(),
//! }];
//! let batch = build_cname_batch(&routes, ChangeAction::Create);
//! assert_eq!(batch.changes.len(), 1);
//! ```

pub mod memory;

use crate::constants::{CNAME_RECORD_TTL, CNAME_RECORD_TYPE};
use crate::dns_errors::DnsError;
use crate::models::DinosaurRoute;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action applied to a record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Create,
    Delete,
    Upsert,
}

impl ChangeAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Upsert => "UPSERT",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-value record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecordSet {
    pub name: String,
    pub record_type: String,
    pub ttl: u64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub action: ChangeAction,
    pub record_set: ResourceRecordSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub changes: Vec<Change>,
}

/// Status of a submitted change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInfo {
    pub id: String,
    /// `PENDING` or `INSYNC`
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    pub id: String,
    pub name: String,
}

/// Client of the DNS provider hosting instance routes.
#[async_trait]
pub trait DnsClient: Send + Sync {
    /// Hosted zones whose name matches `dns_name`.
    async fn list_hosted_zones_by_name(&self, dns_name: &str) -> Result<Vec<HostedZone>, DnsError>;

    /// Submit `batch` to the hosted zone of `dns_name`.
    async fn change_resource_record_sets(
        &self,
        dns_name: &str,
        batch: ChangeBatch,
    ) -> Result<ChangeInfo, DnsError>;

    /// Current status of a submitted change.
    async fn get_change(&self, change_id: &str) -> Result<ChangeInfo, DnsError>;
}

/// Build one CNAME change per route, pointing the route domain at its router.
#[must_use]
pub fn build_cname_batch(routes: &[DinosaurRoute], action: ChangeAction) -> ChangeBatch {
    ChangeBatch {
        changes: routes
            .iter()
            .map(|route| Change {
                action,
                record_set: ResourceRecordSet {
                    name: route.domain.clone(),
                    record_type: CNAME_RECORD_TYPE.to_string(),
                    ttl: CNAME_RECORD_TTL,
                    value: route.router.clone(),
                },
            })
            .collect(),
    }
}
