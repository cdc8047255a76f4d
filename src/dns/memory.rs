// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory DNS zone.
//!
//! Behaves like a hosted DNS provider: record sets live in zones, changes are validated
//! as a whole batch, and a submitted change reports `PENDING` until it is polled once,
//! after which it is `INSYNC`.

use super::{ChangeAction, ChangeBatch, ChangeInfo, DnsClient, HostedZone, ResourceRecordSet};
use crate::constants::{DNS_CHANGE_STATUS_INSYNC, DNS_CHANGE_STATUS_PENDING};
use crate::dns_errors::DnsError;
use crate::models::new_id;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct ZoneState {
    /// zone name -> record name -> record set
    zones: BTreeMap<String, BTreeMap<String, ResourceRecordSet>>,
    /// change id -> status
    changes: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct InMemoryDnsClient {
    state: Mutex<ZoneState>,
    fail_requests: AtomicBool,
}

impl InMemoryDnsClient {
    /// Creates a client serving the given hosted zones.
    #[must_use]
    pub fn with_zones<I, S>(zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        if let Ok(mut state) = client.state.lock() {
            for zone in zones {
                state.zones.insert(zone.into(), BTreeMap::new());
            }
        }
        client
    }

    /// Make every following call fail with a provider error.
    pub fn set_failing(&self, failing: bool) {
        self.fail_requests.store(failing, Ordering::SeqCst);
    }

    /// Record set stored under `name`, in any zone.
    #[must_use]
    pub fn record(&self, name: &str) -> Option<ResourceRecordSet> {
        let state = self.state.lock().ok()?;
        state.zones.values().find_map(|z| z.get(name).cloned())
    }

    fn check_available(&self) -> Result<(), DnsError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(DnsError::Provider("service unavailable".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ZoneState>, DnsError> {
        self.state
            .lock()
            .map_err(|_| DnsError::Provider("zone state lock poisoned".to_string()))
    }
}

/// Zone serving `dns_name`: the longest zone name `dns_name` ends with.
fn zone_for<'a>(
    zones: &'a BTreeMap<String, BTreeMap<String, ResourceRecordSet>>,
    dns_name: &str,
) -> Option<&'a str> {
    zones
        .keys()
        .filter(|zone| dns_name == zone.as_str() || dns_name.ends_with(&format!(".{zone}")))
        .max_by_key(|zone| zone.len())
        .map(String::as_str)
}

#[async_trait]
impl DnsClient for InMemoryDnsClient {
    async fn list_hosted_zones_by_name(&self, dns_name: &str) -> Result<Vec<HostedZone>, DnsError> {
        self.check_available()?;
        let state = self.lock()?;
        Ok(zone_for(&state.zones, dns_name)
            .map(|zone| HostedZone {
                id: format!("/hostedzone/{zone}"),
                name: zone.to_string(),
            })
            .into_iter()
            .collect())
    }

    async fn change_resource_record_sets(
        &self,
        dns_name: &str,
        batch: ChangeBatch,
    ) -> Result<ChangeInfo, DnsError> {
        self.check_available()?;
        let mut state = self.lock()?;
        let zone_name = zone_for(&state.zones, dns_name)
            .map(str::to_string)
            .ok_or_else(|| DnsError::HostedZoneNotFound {
                dns_name: dns_name.to_string(),
            })?;
        let zone = state.zones.entry(zone_name.clone()).or_default();

        // validate the whole batch before applying any change
        for change in &batch.changes {
            let name = &change.record_set.name;
            let invalid = |message: String| DnsError::InvalidChangeBatch {
                zone: zone_name.clone(),
                message,
            };
            if name.is_empty() {
                return Err(invalid("Domain name is empty".to_string()));
            }
            match change.action {
                ChangeAction::Create if zone.contains_key(name) => {
                    return Err(invalid(format!(
                        "Tried to create resource record set [name='{name}', type='{}'] but it already exists",
                        change.record_set.record_type
                    )));
                }
                ChangeAction::Delete if !zone.contains_key(name) => {
                    return Err(invalid(format!(
                        "Tried to delete resource record set [name='{name}', type='{}'] but it was not found",
                        change.record_set.record_type
                    )));
                }
                _ => {}
            }
        }

        for change in batch.changes {
            match change.action {
                ChangeAction::Create | ChangeAction::Upsert => {
                    zone.insert(change.record_set.name.clone(), change.record_set);
                }
                ChangeAction::Delete => {
                    zone.remove(&change.record_set.name);
                }
            }
        }

        let id = format!("/change/{}", new_id().to_uppercase());
        state
            .changes
            .insert(id.clone(), DNS_CHANGE_STATUS_PENDING.to_string());
        debug!(change_id = %id, zone = %zone_name, "submitted DNS change batch");
        Ok(ChangeInfo {
            id,
            status: DNS_CHANGE_STATUS_PENDING.to_string(),
        })
    }

    async fn get_change(&self, change_id: &str) -> Result<ChangeInfo, DnsError> {
        self.check_available()?;
        let mut state = self.lock()?;
        let status = state
            .changes
            .get_mut(change_id)
            .ok_or_else(|| DnsError::ChangeNotFound {
                change_id: change_id.to_string(),
            })?;
        let current = status.clone();
        // propagation completes after the first poll
        *status = DNS_CHANGE_STATUS_INSYNC.to_string();
        Ok(ChangeInfo {
            id: change_id.to_string(),
            status: current,
        })
    }
}
