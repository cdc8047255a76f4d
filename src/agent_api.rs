// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP surface of the data-plane protocol.
//!
//! The agent running on each data-plane cluster reports the state of its cluster and of
//! the instances it hosts, and fetches the instances it should run:
//!
//! | Method | Path | Body |
//! |---|---|---|
//! | `PUT` | `/api/dinosaurs_mgmt/v1/agent-clusters/{id}/status` | [`DataPlaneClusterStatus`] |
//! | `PUT` | `/api/dinosaurs_mgmt/v1/agent-clusters/{id}/dinosaurs/status` | map of instance id to [`DataPlaneDinosaurStatus`] |
//! | `GET` | `/api/dinosaurs_mgmt/v1/agent-clusters/{id}/dinosaurs` | - |
//! | `GET` | `/metrics` | - |
//!
//! Request-level failures are returned as JSON errors carrying the HTTP status of their
//! [`ServiceError`] code.

use crate::constants::{AGENT_API_BASE_PATH, WORKER_ACCEPTED, WORKER_DNS_ROUTES};
use crate::errors::ServiceError;
use crate::metrics::gather_metrics;
use crate::models::{DataPlaneClusterStatus, DataPlaneDinosaurStatus, ManagedDinosaur};
use crate::services::{DataPlaneClusterService, DataPlaneDinosaurService, DinosaurService};
use crate::workers::SignalBus;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// JSON body of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub id: String,
    pub code: String,
    pub reason: String,
}

impl From<&ServiceError> for ErrorBody {
    fn from(err: &ServiceError) -> Self {
        Self {
            kind: "Error".to_string(),
            id: err.code.code().to_string(),
            code: format!("FLEETMGR-{}", err.code.code()),
            reason: err.reason.clone(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.code.label(), reason = %self.reason, "request failed");
        } else {
            warn!(code = self.code.label(), reason = %self.reason, "request rejected");
        }
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

/// Instances a cluster should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedDinosaurList {
    pub kind: String,
    pub items: Vec<ManagedDinosaur>,
}

/// Services behind the agent API.
#[derive(Clone)]
pub struct AgentApiState {
    pub cluster_status: Arc<DataPlaneClusterService>,
    pub dinosaur_status: Arc<DataPlaneDinosaurService>,
    pub dinosaur_service: Arc<dyn DinosaurService>,
    /// Wakes the workers interested in fresh reports
    pub signals: SignalBus,
}

/// Build the agent API router.
pub fn router(state: AgentApiState) -> Router {
    Router::new()
        .route(
            &format!("{AGENT_API_BASE_PATH}/{{id}}/status"),
            put(update_cluster_status),
        )
        .route(
            &format!("{AGENT_API_BASE_PATH}/{{id}}/dinosaurs/status"),
            put(update_dinosaur_statuses),
        )
        .route(
            &format!("{AGENT_API_BASE_PATH}/{{id}}/dinosaurs"),
            get(get_managed_dinosaurs),
        )
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = listener.local_addr()?;
    info!(address = %address, "agent API listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("agent API stopped");
    Ok(())
}

async fn update_cluster_status(
    State(state): State<AgentApiState>,
    Path(cluster_id): Path<String>,
    Json(report): Json<DataPlaneClusterStatus>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    debug!(cluster_id = %cluster_id, ready = report.is_ready(), "cluster status report");
    state
        .cluster_status
        .update_dataplane_cluster_status(&cluster_id, &report)
        .await?;
    state.signals.signal(WORKER_ACCEPTED);
    Ok(Json(serde_json::json!({})))
}

async fn update_dinosaur_statuses(
    State(state): State<AgentApiState>,
    Path(cluster_id): Path<String>,
    Json(reports): Json<BTreeMap<String, DataPlaneDinosaurStatus>>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    debug!(cluster_id = %cluster_id, count = reports.len(), "dinosaur status reports");
    let reports: Vec<DataPlaneDinosaurStatus> = reports
        .into_iter()
        .map(|(id, mut report)| {
            report.dinosaur_id = id;
            report
        })
        .collect();
    state
        .dinosaur_status
        .update_dataplane_dinosaur_status(&cluster_id, &reports)
        .await?;
    state.signals.signal(WORKER_DNS_ROUTES);
    Ok(Json(serde_json::json!({})))
}

async fn get_managed_dinosaurs(
    State(state): State<AgentApiState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<ManagedDinosaurList>, ServiceError> {
    let items = state
        .dinosaur_service
        .get_managed_dinosaurs_by_cluster_id(&cluster_id)
        .await?;
    Ok(Json(ManagedDinosaurList {
        kind: "ManagedDinosaurList".to_string(),
        items,
    }))
}

async fn metrics() -> Response {
    match gather_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => ServiceError::general(format!("failed to gather metrics: {e}")).into_response(),
    }
}
