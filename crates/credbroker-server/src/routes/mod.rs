//! HTTP route modules and router assembly.

pub mod bindings;
pub mod catalog;
pub mod info;
pub mod instances;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::middleware as axum_mw;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{api_version_middleware, basic_auth_middleware};
use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Broker API: basic auth runs first, then the version check.
    let broker_routes = Router::new()
        .nest("/v2/catalog", catalog::router())
        .nest(
            "/v2/service_instances",
            instances::router().merge(bindings::router()),
        )
        .route_layer(axum_mw::from_fn(api_version_middleware))
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            basic_auth_middleware,
        ))
        .layer(tower::limit::ConcurrencyLimitLayer::new(64));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static(crate::middleware::API_VERSION_HEADER),
        ]);

    Router::new()
        .merge(broker_routes)
        .merge(info::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
