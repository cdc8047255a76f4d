// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Condition types and reasons reported by data-plane agents.
//!
//! Agents describe every instance they manage with a list of conditions. Only the
//! `Ready` condition matters to the control plane; its status and reason decide which
//! coarse state the instance is in.
//!
//! # Example Report
//!
//! ```yaml
//! conditions:
//!   - type: Ready
//!     status: "False"
//!     reason: Installing
//!     message: "Waiting for the dinosaur pods"
//! ```
//!
//! # Precedence
//!
//! 1. `status: "True"` means ready, whatever the reason says
//! 2. `status: "Unknown"` means unknown
//! 3. otherwise the reason decides (`Installing`, `Deleted`, `Error`, `Rejected`)
//! 4. anything else is treated as installing

// ============================================================================
// Condition Types
// ============================================================================

/// The condition consulted for instance and cluster state (matched case-insensitively).
pub const CONDITION_TYPE_READY: &str = "Ready";

// ============================================================================
// Condition Statuses
// ============================================================================

pub const CONDITION_STATUS_TRUE: &str = "True";

pub const CONDITION_STATUS_FALSE: &str = "False";

pub const CONDITION_STATUS_UNKNOWN: &str = "Unknown";

// ============================================================================
// Instance Reasons
// ============================================================================

/// The agent is still installing the instance.
pub const REASON_INSTALLING: &str = "Installing";

/// The agent removed the instance from the cluster.
pub const REASON_DELETED: &str = "Deleted";

/// The agent gave up on the instance. The condition message explains why.
pub const REASON_ERROR: &str = "Error";

/// The agent refused the placement. The control plane re-places the instance.
pub const REASON_REJECTED: &str = "Rejected";

// ============================================================================
// Version Update Sentinels
// ============================================================================

/// Ready-condition reason while the platform operator of an instance is upgrading.
pub const REASON_OPERATOR_UPDATING: &str = "DinosaurOperatorUpdating";

/// Ready-condition reason while the application of an instance is upgrading.
pub const REASON_APP_UPDATING: &str = "DinosaurUpdating";

// ============================================================================
// Failure Reasons
// ============================================================================

/// Prefix of the failed reason stored when an agent reports an instance error.
pub const FAILED_REASON_REPORTED_PREFIX: &str = "Dinosaur reported as failed";

/// Failed reason stored when no ready operator version exists on the assigned cluster.
pub const FAILED_REASON_NO_OPERATOR_VERSION: &str =
    "failed to get desired dinosaur operator version";

/// Build the failed reason stored for an instance the agent reported as failed.
#[must_use]
pub fn reported_failure_reason(message: &str) -> String {
    format!("{FAILED_REASON_REPORTED_PREFIX}: '{message}'")
}
