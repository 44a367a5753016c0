//! Service catalog route: `/v2/catalog`

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::config::CatalogConfig;
use crate::state::AppState;

const TAGS: [&str; 4] = ["credhub", "secrets", "credentials", "certs"];

/// Build the `/v2/catalog` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(catalog))
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub services: Vec<ServiceOffering>,
}

#[derive(Debug, Serialize)]
pub struct ServiceOffering {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub plan_updateable: bool,
    pub tags: Vec<&'static str>,
    pub metadata: ServiceMetadata,
    pub plans: Vec<Plan>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    pub display_name: &'static str,
    pub long_description: &'static str,
    pub provider_display_name: &'static str,
    pub documentation_url: &'static str,
    pub support_url: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub free: bool,
    pub bindable: bool,
}

impl From<&CatalogConfig> for CatalogResponse {
    fn from(cfg: &CatalogConfig) -> Self {
        Self {
            services: vec![ServiceOffering {
                id: cfg.service_id.clone(),
                name: cfg.service_name.clone(),
                description: cfg.service_description.clone(),
                bindable: true,
                plan_updateable: false,
                tags: TAGS.to_vec(),
                metadata: ServiceMetadata {
                    display_name: "Credstore",
                    long_description: "Stores binding credentials in CredHub and hands \
                                       applications a reference instead of the secret",
                    provider_display_name: "Credhub Service",
                    documentation_url: "https://github.com/srinivasa-vasu/credentials-service-broker",
                    support_url: "https://github.com/srinivasa-vasu/credentials-service-broker",
                },
                plans: vec![Plan {
                    id: cfg.plan_id.clone(),
                    name: cfg.plan_name.clone(),
                    description: cfg.plan_description.clone(),
                    free: true,
                    bindable: true,
                }],
            }],
        }
    }
}

async fn catalog(State(state): State<Arc<AppState>>) -> Json<CatalogResponse> {
    Json(CatalogResponse::from(&state.catalog))
}
