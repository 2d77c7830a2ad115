//! HTTP client for the automation bridge
//!
//! The bridge is a local sidecar process that owns the browser: every
//! selector, frame and dialog lives there. This client speaks a small JSON
//! protocol to it, so the domain layers stay free of DOM strategy.
//!
//! # Error Handling
//!
//! Transport and protocol failures are mapped to `PortError` variants:
//! - request timeout -> `PortError::Timeout`
//! - connection refused/reset -> `PortError::Connection`
//! - 401/403 -> `PortError::Unauthorized`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - structured bridge errors (`session_lost`, `validation`) map to their
//!   taxonomy counterparts via the error envelope's `code` field

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use core_kernel::PortError;

/// Configuration for the automation bridge connection
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL of the bridge sidecar (e.g., "http://127.0.0.1:8787")
    pub base_url: String,
    /// Shared secret sent as a bearer token
    pub auth_token: Option<String>,
    /// Per-request timeout. Browser interactions are page-load-bound, so
    /// this is generous by default.
    pub request_timeout: Duration,
}

impl BridgeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8787")
    }
}

/// Structured error envelope returned by the bridge on non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: BridgeFault,
}

#[derive(Debug, Deserialize)]
struct BridgeFault {
    code: String,
    message: String,
    #[serde(default)]
    system: Option<String>,
}

/// JSON-over-HTTP client for the bridge sidecar
#[derive(Debug, Clone)]
pub struct BridgeClient {
    client: reqwest::Client,
    config: BridgeConfig,
}

impl BridgeClient {
    /// Creates a client for the given bridge endpoint
    pub fn new(config: BridgeConfig) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PortError::internal(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Sends one command to the bridge and decodes the response body
    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, PortError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        debug!(%url, "bridge command");

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport(e, path))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| PortError::internal(format!("bad bridge response for {path}: {e}")));
        }

        let envelope = response.json::<ErrorEnvelope>().await.ok();
        Err(map_failure(status, path, envelope))
    }
}

fn map_transport(error: reqwest::Error, path: &str) -> PortError {
    if error.is_timeout() {
        return PortError::Timeout {
            operation: path.to_string(),
            duration_ms: 0,
        };
    }
    if error.is_connect() {
        return PortError::connection(format!("bridge unreachable at {path}: {error}"));
    }
    PortError::internal(format!("bridge request {path} failed: {error}"))
}

fn map_failure(status: StatusCode, path: &str, envelope: Option<ErrorEnvelope>) -> PortError {
    if let Some(ErrorEnvelope { error }) = envelope {
        return match error.code.as_str() {
            "session_lost" => PortError::session_lost(
                error.system.unwrap_or_else(|| "bridge".to_string()),
            ),
            "unauthorized" => PortError::Unauthorized {
                message: error.message,
            },
            "validation" => PortError::validation(error.message),
            "timeout" => PortError::Timeout {
                operation: path.to_string(),
                duration_ms: 0,
            },
            _ => PortError::internal(format!("bridge error on {path}: {}", error.message)),
        };
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized {
            message: format!("bridge rejected {path} with {status}"),
        },
        s if s.is_server_error() => PortError::ServiceUnavailable {
            service: format!("automation bridge ({path})"),
        },
        _ => PortError::internal(format!("bridge returned {status} for {path}")),
    }
}
