// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS provider error types for the fleet manager.
//!
//! These errors are returned by [`crate::dns::DnsClient`] implementations. Some
//! provider failures describe a change that is already in the requested state
//! (a record that already exists on create, a record that is gone on delete); those
//! are recognised by [`DnsError::is_idempotent_noop`] and treated as success.

use crate::errors::{ErrorCode, ServiceError};
use thiserror::Error;

/// Provider message fragment: a deleted record set did not exist
const SIGNATURE_RECORD_NOT_FOUND: &str = "but it was not found";

/// Provider message fragment: the record set had no domain name
const SIGNATURE_DOMAIN_NAME_EMPTY: &str = "Domain name is empty";

/// Provider message fragment: a created record set is already there
const SIGNATURE_RECORD_ALREADY_EXISTS: &str = "but it already exists";

/// Errors that can occur while talking to the DNS provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    /// The provider rejected a change batch
    ///
    /// Returned when one of the changes of a batch cannot be applied. The message
    /// carries the provider's explanation.
    #[error("Invalid change batch for zone '{zone}': {message}")]
    InvalidChangeBatch {
        /// The hosted zone the batch targeted
        zone: String,
        /// Provider message
        message: String,
    },

    /// No hosted zone matches the requested domain name
    #[error("No hosted zones found for '{dns_name}'")]
    HostedZoneNotFound {
        /// The domain name that was looked up
        dns_name: String,
    },

    /// The change id is unknown to the provider
    #[error("DNS change '{change_id}' not found")]
    ChangeNotFound {
        /// The change-tracking token that was polled
        change_id: String,
    },

    /// Any other provider failure (network, throttling, credentials)
    #[error("DNS provider request failed: {0}")]
    Provider(String),
}

impl DnsError {
    /// Returns true if the provider rejected a change that is already applied.
    ///
    /// Only `InvalidChangeBatch` errors qualify, and only when the provider message
    /// says the record set was not found, had an empty domain name, or already exists.
    #[must_use]
    pub fn is_idempotent_noop(&self) -> bool {
        match self {
            Self::InvalidChangeBatch { message, .. } => {
                message.contains(SIGNATURE_RECORD_NOT_FOUND)
                    || message.contains(SIGNATURE_DOMAIN_NAME_EMPTY)
                    || message.contains(SIGNATURE_RECORD_ALREADY_EXISTS)
            }
            Self::HostedZoneNotFound { .. } | Self::ChangeNotFound { .. } | Self::Provider(_) => {
                false
            }
        }
    }

    /// Returns true if the failure is transient and the call should be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}

/// Drop provider errors that describe an already-applied change.
///
/// `Ok(None)` means the change was suppressed.
///
/// # Errors
///
/// Returns the original error when it is not an idempotent no-op.
pub fn suppress_idempotent<T>(result: Result<T, DnsError>) -> Result<Option<T>, DnsError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_idempotent_noop() => {
            tracing::debug!(error = %err, "Ignoring DNS error for an already applied change");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

impl From<DnsError> for ServiceError {
    fn from(err: DnsError) -> Self {
        ServiceError::with_cause(ErrorCode::General, &err, "Unable to change DNS records")
    }
}
