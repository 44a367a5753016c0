//! Request gates for the broker API.
//!
//! `/v2/*` requires HTTP Basic credentials of a user holding the `ADMIN`
//! authority, and an `X-Broker-API-Version` header.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use credbroker_core::model::ADMIN;

use crate::error::AppError;
use crate::state::AppState;

/// Header every broker API request must carry.
pub const API_VERSION_HEADER: &str = "x-broker-api-version";

/// The authenticated caller, injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub username: String,
}

/// Middleware that validates HTTP Basic credentials against the user directory.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` for missing, malformed or wrong
/// credentials and for users without `ADMIN`, or `AppError::Internal` if the
/// user store fails.
pub async fn basic_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (username, password) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic)
        .ok_or_else(|| AppError::Unauthorized("missing basic credentials".to_owned()))?;

    let user = state
        .users
        .authenticate(&username, &password)
        .await?
        .ok_or_else(|| AppError::Unauthorized("invalid username or password".to_owned()))?;

    if !user.has_authority(ADMIN) {
        debug!(username = %user.username, "basic auth user lacks ADMIN");
        return Err(AppError::Unauthorized(
            "user is not a broker administrator".to_owned(),
        ));
    }

    req.extensions_mut().insert(AuthContext {
        username: user.username,
    });
    Ok(next.run(req).await)
}

/// Middleware that rejects requests without a broker API version.
///
/// # Errors
///
/// Returns `AppError::PreconditionFailed` when the header is missing or empty.
pub async fn api_version_middleware(req: Request, next: Next) -> Result<Response, AppError> {
    let declared = req
        .headers()
        .get(API_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty());

    if !declared {
        return Err(AppError::PreconditionFailed(
            "X-Broker-API-Version header is required".to_owned(),
        ));
    }
    Ok(next.run(req).await)
}

/// Split an `Authorization: Basic ...` value into username and password.
fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}
