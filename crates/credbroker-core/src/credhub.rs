//! CredHub-backed [`CredentialVault`].
//!
//! Speaks the CredHub HTTP API: credentials are written as `json` typed
//! values through `/api/v1/data`, and application access is granted through
//! `/api/v2/permissions`. Requests authenticate with a bearer token.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::VaultError;
use crate::vault::{AccessPolicy, CredentialName, CredentialVault, Operation, VaultReference};

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`CredHubClient`].
#[derive(Clone)]
pub struct CredHubConfig {
    /// Base URL of the CredHub server, e.g. `https://credhub.service.internal:8844`.
    pub base_url: String,
    /// OAuth bearer token presented on every request.
    pub token: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for CredHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredHubConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// HTTP client for a CredHub server.
#[derive(Clone)]
pub struct CredHubClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for CredHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredHubClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct SetCredentialRequest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a serde_json::Value,
    mode: &'static str,
}

#[derive(Deserialize)]
struct CredentialResponse {
    name: String,
}

#[derive(Deserialize)]
struct CredentialDataResponse {
    data: Vec<CredentialValue>,
}

#[derive(Deserialize)]
struct CredentialValue {
    value: serde_json::Value,
}

#[derive(Serialize)]
struct PermissionRequest<'a> {
    path: &'a str,
    actor: &'a str,
    operations: Vec<Operation>,
}

impl CredHubClient {
    /// Build a client from its configuration.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Config` if the base URL or token is empty or the
    /// HTTP client cannot be built.
    pub fn new(config: CredHubConfig) -> Result<Self, VaultError> {
        let base_url = config.base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(VaultError::Config {
                reason: "credhub base url is required".to_owned(),
            });
        }
        if config.token.is_empty() {
            return Err(VaultError::Config {
                reason: "credhub token is required".to_owned(),
            });
        }
        let timeout = if config.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            config.timeout
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("credbroker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VaultError::Config {
                reason: e.to_string(),
            })?;

        Ok(Self {
            base_url,
            token: config.token,
            client,
        })
    }

    fn data_url(&self) -> String {
        format!("{}/api/v1/data", self.base_url)
    }

    fn data_url_for(&self, path: &str) -> String {
        format!("{}?name={}", self.data_url(), urlencoding::encode(path))
    }

    async fn grant(&self, path: &str, policy: &AccessPolicy) -> Result<(), VaultError> {
        let body = PermissionRequest {
            path,
            actor: &policy.actor,
            operations: policy.operations.iter().copied().collect(),
        };
        let response = self
            .client
            .post(format!("{}/api/v2/permissions", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(path, &e))?;

        // An identical grant already present is reported as a conflict.
        if response.status() == StatusCode::CONFLICT {
            debug!(path, actor = %policy.actor, "permission already granted");
            return Ok(());
        }
        ensure_success(path, response).await?;
        Ok(())
    }
}

fn transport_error(path: &str, err: &reqwest::Error) -> VaultError {
    VaultError::Request {
        name: path.to_owned(),
        reason: err.to_string(),
    }
}

async fn ensure_success(
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, VaultError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(VaultError::Rejected {
        name: path.to_owned(),
        status: status.as_u16(),
        message,
    })
}

#[async_trait::async_trait]
impl CredentialVault for CredHubClient {
    async fn write(
        &self,
        name: &CredentialName,
        payload: &serde_json::Value,
        policy: &AccessPolicy,
    ) -> Result<VaultReference, VaultError> {
        let path = name.path();
        let body = SetCredentialRequest {
            name: &path,
            kind: "json",
            value: payload,
            mode: "overwrite",
        };
        let response = self
            .client
            .put(self.data_url())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&path, &e))?;
        let response = ensure_success(&path, response).await?;
        let stored: CredentialResponse =
            response.json().await.map_err(|e| VaultError::Serialization {
                reason: e.to_string(),
            })?;

        self.grant(&stored.name, policy).await?;

        debug!(name = %stored.name, actor = %policy.actor, "credential written to credhub");
        Ok(VaultReference { name: stored.name })
    }

    async fn read(&self, name: &CredentialName) -> Result<Option<serde_json::Value>, VaultError> {
        let path = name.path();
        let response = self
            .client
            .get(format!("{}&current=true", self.data_url_for(&path)))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error(&path, &e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(&path, response).await?;
        let body: CredentialDataResponse =
            response.json().await.map_err(|e| VaultError::Serialization {
                reason: e.to_string(),
            })?;
        Ok(body.data.into_iter().next().map(|v| v.value))
    }

    async fn delete(&self, name: &CredentialName) -> Result<bool, VaultError> {
        let path = name.path();
        let response = self
            .client
            .delete(self.data_url_for(&path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error(&path, &e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(&path, response).await?;
        debug!(name = %path, "credential deleted from credhub");
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(base_url: &str, token: &str) -> CredHubConfig {
        CredHubConfig {
            base_url: base_url.to_owned(),
            token: token.to_owned(),
            timeout: Duration::ZERO,
        }
    }

    #[test]
    fn rejects_missing_token() {
        let result = CredHubClient::new(config("https://credhub:8844", ""));
        assert!(matches!(result, Err(VaultError::Config { .. })));
    }

    #[test]
    fn rejects_missing_base_url() {
        let result = CredHubClient::new(config("/", "token"));
        assert!(matches!(result, Err(VaultError::Config { .. })));
    }

    #[test]
    fn data_url_encodes_credential_path() {
        let client = CredHubClient::new(config("https://credhub:8844/", "token")).unwrap();
        assert_eq!(
            client.data_url_for("/c/i-1/plan/b-1/b-1"),
            "https://credhub:8844/api/v1/data?name=%2Fc%2Fi-1%2Fplan%2Fb-1%2Fb-1"
        );
    }

    #[test]
    fn set_request_uses_json_overwrite() {
        let value = serde_json::json!({"username": "b-1"});
        let body = SetCredentialRequest {
            name: "/c/a/b/c/d",
            kind: "json",
            value: &value,
            mode: "overwrite",
        };
        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(encoded["type"], "json");
        assert_eq!(encoded["mode"], "overwrite");
        assert_eq!(encoded["value"]["username"], "b-1");
    }

    #[test]
    fn permission_request_lists_lowercase_operations() {
        let policy = AccessPolicy::read_only_app("app");
        let body = PermissionRequest {
            path: "/c/a/b/c/d",
            actor: &policy.actor,
            operations: policy.operations.iter().copied().collect(),
        };
        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(encoded["actor"], "mtls-app:app");
        assert_eq!(encoded["operations"], serde_json::json!(["read"]));
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", config("https://credhub", "secret-token"));
        assert!(!rendered.contains("secret-token"));
    }
}
