//! Service instance routes: `/v2/service_instances/{instance_id}`
//!
//! Provision, fetch, and deprovision. Only synchronous operations are
//! served; `accepts_incomplete` is ignored.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::put;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use credbroker_core::model::Parameters;

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::state::AppState;

/// Build the service instance router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/{instance_id}",
        put(provision).get(fetch_instance).delete(deprovision),
    )
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub parameters: Parameters,
}

/// Empty object body used by provision and deprovision.
#[derive(Debug, Serialize)]
pub struct EmptyResponse {}

#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    pub service_id: String,
    pub plan_id: String,
    pub parameters: Parameters,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Provision an instance: 201 when created, 200 when it already existed.
async fn provision(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(instance_id): Path<String>,
    Json(body): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<EmptyResponse>), AppError> {
    let created = state
        .instances
        .create_instance(&instance_id, &body.service_id, &body.plan_id, body.parameters)
        .await?;

    info!(
        instance_id = %instance_id,
        caller = %auth.username,
        existed = created.instance_existed,
        "provision request served"
    );
    let status = if created.instance_existed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(EmptyResponse {})))
}

async fn fetch_instance(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
) -> Result<Json<InstanceResponse>, AppError> {
    let instance = state.instances.get_instance(&instance_id).await?;
    Ok(Json(InstanceResponse {
        service_id: instance.service_definition_id,
        plan_id: instance.plan_id,
        parameters: instance.parameters,
    }))
}

/// Deprovision an instance: 410 when it does not exist.
async fn deprovision(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(instance_id): Path<String>,
) -> Result<Json<EmptyResponse>, AppError> {
    state
        .instances
        .delete_instance(&instance_id)
        .await
        .map_err(|e| AppError::from(e).gone_if_not_found())?;

    info!(instance_id = %instance_id, caller = %auth.username, "deprovision request served");
    Ok(Json(EmptyResponse {}))
}
