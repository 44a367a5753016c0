//! Service binding routes:
//! `/v2/service_instances/{instance_id}/service_bindings/{binding_id}`
//!
//! The bind response carries only the vault reference, never the generated
//! password.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::put;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use credbroker_core::binding::CreateBindingRequest;
use credbroker_core::model::{Credentials, Parameters};

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::routes::instances::EmptyResponse;
use crate::state::AppState;

/// Build the service binding router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/{instance_id}/service_bindings/{binding_id}",
        put(bind).get(fetch_binding).delete(unbind),
    )
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BindRequest {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub bind_resource: Option<BindResource>,
    /// Deprecated top-level form of `bind_resource.app_guid`.
    #[serde(default)]
    pub app_guid: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
}

#[derive(Debug, Deserialize)]
pub struct BindResource {
    #[serde(default)]
    pub app_guid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnbindQuery {
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BindResponse {
    pub credentials: Credentials,
}

#[derive(Debug, Serialize)]
pub struct BindingResponse {
    pub credentials: Credentials,
    pub parameters: Parameters,
}

impl BindRequest {
    fn app_guid(&self) -> Option<&str> {
        self.bind_resource
            .as_ref()
            .and_then(|r| r.app_guid.as_deref())
            .or(self.app_guid.as_deref())
            .filter(|guid| !guid.is_empty())
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Bind: 201 with the vault reference when created, 200 when it existed.
async fn bind(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Json(body): Json<BindRequest>,
) -> Result<(StatusCode, Json<BindResponse>), AppError> {
    let app_guid = body
        .app_guid()
        .ok_or_else(|| AppError::BadRequest("bind_resource.app_guid is required".to_owned()))?
        .to_owned();

    let created = state
        .bindings
        .create_binding(CreateBindingRequest {
            binding_id: binding_id.clone(),
            instance_id: instance_id.clone(),
            plan_id: body.plan_id,
            app_guid,
            parameters: body.parameters,
        })
        .await?;

    info!(
        binding_id = %binding_id,
        instance_id = %instance_id,
        service_id = %body.service_id,
        caller = %auth.username,
        existed = created.binding_existed,
        "bind request served"
    );
    let status = if created.binding_existed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(BindResponse {
            credentials: created.credentials,
        }),
    ))
}

async fn fetch_binding(
    State(state): State<Arc<AppState>>,
    Path((_instance_id, binding_id)): Path<(String, String)>,
) -> Result<Json<BindingResponse>, AppError> {
    let binding = state.bindings.get_binding(&binding_id).await?;
    Ok(Json(BindingResponse {
        credentials: binding.credentials,
        parameters: binding.parameters,
    }))
}

/// Unbind: 410 when the binding does not exist.
async fn unbind(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<UnbindQuery>,
) -> Result<Json<EmptyResponse>, AppError> {
    let plan_id = query
        .plan_id
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("plan_id query parameter is required".to_owned()))?;

    state
        .bindings
        .delete_binding(&instance_id, &plan_id, &binding_id)
        .await
        .map_err(|e| AppError::from(e).gone_if_not_found())?;

    info!(
        binding_id = %binding_id,
        instance_id = %instance_id,
        service_id = query.service_id.as_deref().unwrap_or_default(),
        caller = %auth.username,
        "unbind request served"
    );
    Ok(Json(EmptyResponse {}))
}
