//! HTTP implementation
//!
//! Talks to the secret store over its REST surface: an authentication
//! handshake exchanges the gateway's login + API key for a short-lived
//! session token, documents live under `/secrets/{account}/{path}` with
//! version numbers for check-and-set, and `/health` answers the liveness
//! probe.
//!
//! Reads carry a 3 s deadline, writes 5 s. Transport failures and 5xx
//! answers are retried under the configured backoff; 4xx never are. A 401
//! re-establishes the handshake once before the call is failed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payguard_core::{
    ClientId, CredentialRecord, RotationRecord, SecretString, SigningKeySet, VaultConfig,
    VaultError, VaultResult,
};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::client::{VaultClient, Versioned};
use crate::paths;
use crate::retry::{RetryPolicy, retry_with_backoff};

#[derive(Debug, Deserialize)]
struct ReadResponse {
    data: serde_json::Value,
    version: u64,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    version: u64,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    keys: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    data: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    cas: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    holder: String,
    expires_at: DateTime<Utc>,
}

/// [`VaultClient`] over the store's REST surface
pub struct HttpVaultClient {
    http: reqwest::Client,
    config: VaultConfig,
    api_key: SecretString,
    session: RwLock<Option<String>>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl HttpVaultClient {
    /// Builds a client from configuration and the gateway's vault API key.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Unavailable` when the TLS certificate cannot be
    /// loaded or the HTTP client cannot be constructed.
    pub fn new(config: VaultConfig, api_key: SecretString) -> VaultResult<Self> {
        let mut builder = reqwest::Client::builder();

        if let Some(cert_path) = &config.ssl_certificate_path {
            let pem = std::fs::read(cert_path).map_err(|e| VaultError::Unavailable {
                reason: format!("cannot read TLS certificate {cert_path}: {e}"),
            })?;
            let cert =
                reqwest::Certificate::from_pem(&pem).map_err(|e| VaultError::Unavailable {
                    reason: format!("invalid TLS certificate {cert_path}: {e}"),
                })?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder.build().map_err(|e| VaultError::Unavailable {
            reason: format!("http client construction failed: {e}"),
        })?;

        let retry = RetryPolicy::from_config(&config.retry);
        Ok(Self {
            http,
            config,
            api_key,
            session: RwLock::new(None),
            retry,
            cancel: CancellationToken::new(),
        })
    }

    /// Attaches a shutdown token; cancellation aborts in-flight backoff.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn base(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn secret_url(&self, path: &str) -> String {
        format!("{}/secrets/{}/{}", self.base(), self.config.account, path)
    }

    /// The authentication handshake: exchange login + API key for a session
    /// token. Called lazily on first use and again whenever a call answers
    /// 401.
    async fn authenticate(&self) -> VaultResult<String> {
        let url = format!(
            "{}/authn/{}/{}/authenticate",
            self.base(),
            self.config.account,
            self.config.auth_login
        );

        let response = self
            .http
            .post(&url)
            .timeout(self.config.read_deadline())
            .body(self.api_key.expose().to_string())
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let token = response.text().await.map_err(transport_error)?;
                debug!(account = %self.config.account, login = %self.config.auth_login, "vault handshake established");
                *self.session.write().await = Some(token.clone());
                Ok(token)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VaultError::Auth {
                reason: "handshake rejected".into(),
            }),
            status if status.is_server_error() => Err(VaultError::Unavailable {
                reason: format!("handshake answered {status}"),
            }),
            status => Err(VaultError::Auth {
                reason: format!("handshake answered {status}"),
            }),
        }
    }

    async fn session_token(&self) -> VaultResult<String> {
        if let Some(token) = self.session.read().await.clone() {
            return Ok(token);
        }
        self.authenticate().await
    }

    /// One request with the current session; a 401 drops the session,
    /// re-authenticates once, and replays the request.
    async fn call_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        deadline: Duration,
    ) -> VaultResult<reqwest::Response> {
        let mut reauthenticated = false;
        loop {
            let token = self.session_token().await?;
            let mut request = self
                .http
                .request(method.clone(), url)
                .timeout(deadline)
                .header("Authorization", format!("Token token=\"{token}\""));
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(transport_error)?;

            if response.status() == StatusCode::UNAUTHORIZED && !reauthenticated {
                warn!(url, "vault session expired; re-establishing handshake");
                *self.session.write().await = None;
                self.authenticate().await?;
                reauthenticated = true;
                continue;
            }
            return Ok(response);
        }
    }

    async fn read_path<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        operation: &'static str,
    ) -> VaultResult<Versioned<T>> {
        let url = self.secret_url(path);
        let deadline = self.config.read_deadline();

        retry_with_backoff(&self.retry, operation, &self.cancel, || async {
            let response = self.call_once(Method::GET, &url, None, deadline).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(error_for_status(status, path));
            }

            let body: ReadResponse = response.json().await.map_err(|e| VaultError::Malformed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
            let value = serde_json::from_value(body.data).map_err(|e| VaultError::Malformed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Versioned::new(value, body.version))
        })
        .await
    }

    async fn write_path<T: Serialize>(
        &self,
        path: &str,
        value: &T,
        cas: Option<u64>,
        operation: &'static str,
    ) -> VaultResult<u64> {
        let url = self.secret_url(path);
        let deadline = self.config.write_deadline();
        let data = serde_json::to_value(value).map_err(|e| VaultError::Malformed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let body = serde_json::to_value(WriteRequest { data: &data, cas }).map_err(|e| {
            VaultError::Malformed {
                path: path.to_string(),
                reason: e.to_string(),
            }
        })?;

        retry_with_backoff(&self.retry, operation, &self.cancel, || async {
            let response = self
                .call_once(Method::POST, &url, Some(&body), deadline)
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(error_for_status(status, path));
            }

            let body: WriteResponse = response.json().await.map_err(|e| VaultError::Malformed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
            Ok(body.version)
        })
        .await
    }

    async fn delete_path(&self, path: &str, operation: &'static str) -> VaultResult<()> {
        let url = self.secret_url(path);
        let deadline = self.config.write_deadline();

        retry_with_backoff(&self.retry, operation, &self.cancel, || async {
            let response = self.call_once(Method::DELETE, &url, None, deadline).await?;
            let status = response.status();
            // Deleting an absent document is a success: the goal state holds.
            if status.is_success() || status == StatusCode::NOT_FOUND {
                Ok(())
            } else {
                Err(error_for_status(status, path))
            }
        })
        .await
    }

    async fn list_path(&self, prefix: &str, operation: &'static str) -> VaultResult<Vec<String>> {
        let url = format!("{}?list=true", self.secret_url(prefix));
        let deadline = self.config.read_deadline();

        retry_with_backoff(&self.retry, operation, &self.cancel, || async {
            let response = self.call_once(Method::GET, &url, None, deadline).await?;
            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(Vec::new());
            }
            if !status.is_success() {
                return Err(error_for_status(status, prefix));
            }

            let body: ListResponse = response.json().await.map_err(|e| VaultError::Malformed {
                path: prefix.to_string(),
                reason: e.to_string(),
            })?;
            Ok(body.keys)
        })
        .await
    }
}

fn transport_error(e: reqwest::Error) -> VaultError {
    let reason = if e.is_timeout() {
        "deadline exceeded".to_string()
    } else {
        e.to_string()
    };
    VaultError::Unavailable { reason }
}

fn error_for_status(status: StatusCode, path: &str) -> VaultError {
    match status {
        StatusCode::NOT_FOUND => VaultError::NotFound {
            path: path.to_string(),
        },
        StatusCode::CONFLICT => VaultError::Conflict {
            path: path.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VaultError::Auth {
            reason: format!("answered {status}"),
        },
        status if status.is_server_error() => VaultError::Unavailable {
            reason: format!("answered {status}"),
        },
        status => VaultError::Malformed {
            path: path.to_string(),
            reason: format!("unexpected status {status}"),
        },
    }
}

#[async_trait]
impl VaultClient for HttpVaultClient {
    #[instrument(skip(self), fields(client_id = %client_id))]
    async fn read_credentials(
        &self,
        client_id: &ClientId,
    ) -> VaultResult<Versioned<CredentialRecord>> {
        self.read_path(&paths::credentials(client_id), "read_credentials")
            .await
    }

    #[instrument(skip(self, record), fields(client_id = %client_id))]
    async fn write_credentials(
        &self,
        client_id: &ClientId,
        record: &CredentialRecord,
        cas: Option<u64>,
    ) -> VaultResult<u64> {
        self.write_path(&paths::credentials(client_id), record, cas, "write_credentials")
            .await
    }

    #[instrument(skip(self))]
    async fn read_signing_keys(&self) -> VaultResult<SigningKeySet> {
        Ok(self
            .read_path::<SigningKeySet>(paths::SIGNING_KEYS, "read_signing_keys")
            .await?
            .value)
    }

    #[instrument(skip(self, keys))]
    async fn write_signing_keys(&self, keys: &SigningKeySet) -> VaultResult<()> {
        self.write_path(paths::SIGNING_KEYS, keys, None, "write_signing_keys")
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(client_id = %client_id))]
    async fn read_rotation(
        &self,
        client_id: &ClientId,
    ) -> VaultResult<Option<Versioned<RotationRecord>>> {
        match self
            .read_path(&paths::rotation(client_id), "read_rotation")
            .await
        {
            Ok(versioned) => Ok(Some(versioned)),
            Err(VaultError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, record), fields(client_id = %client_id))]
    async fn write_rotation(
        &self,
        client_id: &ClientId,
        record: &RotationRecord,
        cas: Option<u64>,
    ) -> VaultResult<u64> {
        self.write_path(&paths::rotation(client_id), record, cas, "write_rotation")
            .await
    }

    #[instrument(skip(self), fields(client_id = %client_id))]
    async fn delete_rotation(&self, client_id: &ClientId) -> VaultResult<()> {
        self.delete_path(&paths::rotation(client_id), "delete_rotation")
            .await
    }

    #[instrument(skip(self))]
    async fn list_rotations(&self) -> VaultResult<Vec<ClientId>> {
        let keys = self
            .list_path(paths::ROTATION_PREFIX, "list_rotations")
            .await?;
        Ok(keys
            .iter()
            .filter_map(|key| ClientId::new(key.trim_end_matches('/')).ok())
            .collect())
    }

    async fn try_lock(&self, key: &str, holder: &str, ttl: Duration) -> VaultResult<bool> {
        let path = paths::lock(key);
        let now = Utc::now();
        let record = LockRecord {
            holder: holder.to_string(),
            expires_at: now
                + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30)),
        };

        match self.read_path::<LockRecord>(&path, "read_lock").await {
            Ok(existing) => {
                if existing.value.expires_at > now && existing.value.holder != holder {
                    return Ok(false);
                }
                match self
                    .write_path(&path, &record, Some(existing.version), "write_lock")
                    .await
                {
                    Ok(_) => Ok(true),
                    Err(VaultError::Conflict { .. }) => Ok(false),
                    Err(e) => Err(e),
                }
            }
            Err(VaultError::NotFound { .. }) => {
                match self.write_path(&path, &record, Some(0), "write_lock").await {
                    Ok(_) => Ok(true),
                    Err(VaultError::Conflict { .. }) => Ok(false),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn unlock(&self, key: &str, holder: &str) -> VaultResult<()> {
        let path = paths::lock(key);
        match self.read_path::<LockRecord>(&path, "read_lock").await {
            Ok(existing) if existing.value.holder == holder => {
                self.delete_path(&path, "delete_lock").await
            }
            Ok(_) | Err(VaultError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn available(&self) -> bool {
        let url = format!("{}/health", self.base());
        let probe = self
            .http
            .get(&url)
            .timeout(self.config.read_deadline())
            .send()
            .await;
        matches!(probe, Ok(response) if response.status().is_success())
    }
}
