// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the fleet manager.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// Base path of the agent (data-plane) API
pub const AGENT_API_BASE_PATH: &str = "/api/dinosaurs_mgmt/v1/agent-clusters";

/// Default bind address for the agent API and metrics endpoint
pub const DEFAULT_API_ADDRESS: &str = "0.0.0.0:8000";

// ============================================================================
// Worker Constants
// ============================================================================

/// Default interval between two ticks of a reconciler (30 seconds)
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

/// Capacity of the signal bus used to wake reconcilers early
pub const SIGNAL_BUS_CAPACITY: usize = 16;

/// Number of tokio worker threads used by the binary
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Worker names, used for logging and metric labels
pub const WORKER_ACCEPTED: &str = "accepted_dinosaur";
pub const WORKER_PREPARING: &str = "preparing_dinosaur";
pub const WORKER_PROVISIONING: &str = "provisioning_dinosaur";
pub const WORKER_READY: &str = "ready_dinosaur";
pub const WORKER_DELETING: &str = "deleting_dinosaur";
pub const WORKER_GENERAL: &str = "general_dinosaur";
pub const WORKER_DNS_ROUTES: &str = "dinosaur_routes_cname";
pub const WORKER_PROMOTION: &str = "promotion_dinosaur";
pub const WORKER_CLUSTER_MANAGER: &str = "cluster_manager";

// ============================================================================
// Lifecycle Constants
// ============================================================================

/// Default time a request may keep failing in `preparing` before it is marked failed (5 minutes)
pub const DEFAULT_MAX_DURATION_WITH_PROVISIONING_ERRS_SECS: u64 = 300;

/// Default number of regional/global instances allowed when nothing is configured
pub const DEFAULT_MAX_CAPACITY: i64 = 1000;

/// Prefix of the canary service account client id of a ready instance
pub const CANARY_SERVICE_ACCOUNT_PREFIX: &str = "canary";

/// Maximum number of EVAL instances an unlisted user may own
pub const DEFAULT_MAX_ALLOWED_EVAL_INSTANCES: i64 = 1;

// ============================================================================
// Host and DNS Constants
// ============================================================================

/// Ingress prefix clusters advertise for their default router
pub const DEFAULT_INGRESS_DNS_NAME_PREFIX: &str = "apps";

/// Ingress prefix used for managed dinosaur routers
pub const MANAGED_DINOSAUR_INGRESS_DNS_NAME_PREFIX: &str = "mk";

/// Length to which a request name is truncated when building its host
pub const TRUNCATED_NAME_LEN: usize = 10;

/// Namespace prefix of a provisioned instance
pub const DINOSAUR_NAMESPACE_PREFIX: &str = "dinosaur";

/// TTL of CNAME records created for instance routes (seconds)
pub const CNAME_RECORD_TTL: u64 = 300;

/// Record type of instance route records
pub const CNAME_RECORD_TYPE: &str = "CNAME";

/// Status reported by the DNS provider once a change has propagated
pub const DNS_CHANGE_STATUS_INSYNC: &str = "INSYNC";

/// Status reported by the DNS provider while a change is propagating
pub const DNS_CHANGE_STATUS_PENDING: &str = "PENDING";

// ============================================================================
// Cluster Constants
// ============================================================================

/// Resource set applied to every provisioned cluster before its operators
pub const CLUSTER_RESOURCE_SET: &str = "dinosaur-cluster-resources";

/// Namespace the fleetshard agent runs in
pub const FLEETSHARD_NAMESPACE: &str = "fleetshard-system";

/// Parameter handing its own cluster id to the fleetshard agent
pub const FLEETSHARD_PARAM_CLUSTER_ID: &str = "cluster-id";

// ============================================================================
// Identifier Constants
// ============================================================================

/// Length of generated identifiers
pub const ID_LENGTH: usize = 20;

/// Alphabet of generated identifiers (lowercase base32hex)
pub const ID_ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

// ============================================================================
// Metrics Constants
// ============================================================================

/// Namespace prefix for all fleet manager metrics (prometheus-safe)
pub const METRICS_NAMESPACE: &str = "fleet_manager";
