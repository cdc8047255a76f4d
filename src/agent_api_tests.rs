// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `agent_api.rs`

#[cfg(test)]
mod tests {
    use crate::agent_api::{router, AgentApiState, ErrorBody};
    use crate::errors::ServiceError;
    use crate::services::{DataPlaneClusterService, DataPlaneDinosaurService};
    use crate::testing::{config, Fixture};
    use crate::workers::SignalBus;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::sync::Arc;

    async fn error_body(err: ServiceError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_client_errors_keep_their_status() {
        let (status, body) =
            error_body(ServiceError::bad_request("Cluster id cluster-9 not found")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.kind, "Error");
        assert_eq!(body.id, "21");
        assert_eq!(body.code, "FLEETMGR-21");
        assert_eq!(body.reason, "Cluster id cluster-9 not found");
    }

    #[tokio::test]
    async fn test_general_errors_are_server_errors() {
        let (status, body) = error_body(ServiceError::general("failed to update cluster")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "FLEETMGR-9");
    }

    #[tokio::test]
    async fn test_quota_errors_are_forbidden() {
        let (status, _) = error_body(ServiceError::insufficient_quota("Insufficient Quota")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_router_creation() {
        let fx = Fixture::new(config(), vec![], vec![]);
        let state = AgentApiState {
            cluster_status: Arc::new(DataPlaneClusterService::new(fx.cluster_service.clone())),
            dinosaur_status: Arc::new(DataPlaneDinosaurService::new(
                fx.dinosaur_service.clone(),
                fx.cluster_service.clone(),
            )),
            dinosaur_service: fx.dinosaur_service.clone(),
            signals: SignalBus::new(),
        };
        let _router = router(state);
    }
}
