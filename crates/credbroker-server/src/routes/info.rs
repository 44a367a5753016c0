//! Unauthenticated routes: `/health` and the `/{binding_id}` usage document.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Service name used in the suggested `cf create-service` command.
const SUGGESTED_INSTANCE_NAME: &str = "credhub-svc";
/// Application name used in the suggested `cf bind-service` command.
const SUGGESTED_APP_NAME: &str = "credhub-client";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/{binding_id}", get(usage))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub id: String,
    #[serde(rename = "create-service")]
    pub create_service: String,
    #[serde(rename = "bind-service")]
    pub bind_service: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

/// How to create and bind the broker's service from the `cf` CLI.
async fn usage(
    State(state): State<Arc<AppState>>,
    Path(binding_id): Path<String>,
) -> Json<UsageResponse> {
    Json(UsageResponse {
        id: binding_id,
        create_service: format!(
            "cf create-service {} {} {SUGGESTED_INSTANCE_NAME}",
            state.catalog.service_name, state.catalog.plan_name
        ),
        bind_service: format!("cf bind-service {SUGGESTED_APP_NAME} {SUGGESTED_INSTANCE_NAME}"),
    })
}
