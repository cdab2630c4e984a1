//! HTTP client for the nexus protocol, with bounded timeouts.
//!
//! Every call distinguishes "the nexus answered and said no" from "the nexus
//! is unreachable": rejections on authenticated calls mean lost identity and
//! trigger a forced reset, while unreachability is transient and simply
//! retried on the next scheduled tick.

use std::time::Duration;

use nexlink_core::{
    AgentId, IdentityResponse, LogSyncResponse, PeerListResponse, RegisterRequest,
    RegisterResponse, StatusRequest, StatusResponse, TransferLogEntry,
};

/// A result type using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors from nexus calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The nexus answered with a non-success status.
    #[error("nexus rejected the call with status {status}")]
    Rejected {
        /// The HTTP status the nexus returned.
        status: u16,
    },

    /// The nexus could not be reached (timeout, refused, DNS).
    #[error("nexus unreachable: {0}")]
    Unreachable(String),

    /// The nexus answered with a body this build cannot decode.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether this rejection means the nexus no longer knows this agent.
    ///
    /// 401/403/404 on an authenticated call all mean the identity (or its
    /// credential) is gone server-side; the agent force-resets and
    /// re-registers.
    #[must_use]
    pub const fn is_identity_loss(&self) -> bool {
        matches!(
            self,
            Self::Rejected {
                status: 401 | 403 | 404
            }
        )
    }
}

/// Header carrying the agent's auth token.
const AUTH_HEADER: &str = "X-Auth-Token";

/// Typed wrapper over the nexus HTTP surface.
#[derive(Clone)]
pub struct NexusClient {
    base_url: String,
    http: reqwest::Client,
}

impl NexusClient {
    /// Create a client for the nexus at `base_url` with a per-request
    /// timeout.
    #[must_use]
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// The nexus base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reachability probe; any answer counts.
    pub async fn ping(&self) -> bool {
        let url = format!("{}/api/ping", self.base_url);
        match self.http.get(&url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Nexus ping failed");
                false
            }
        }
    }

    /// Register this agent (idempotent on address).
    ///
    /// # Errors
    ///
    /// `Rejected` on a non-success answer, `Unreachable` on transport
    /// failure.
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        let url = format!("{}/api/agents/register", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    /// Resolve identity by address; `Ok(None)` means "unknown, register
    /// fresh".
    ///
    /// # Errors
    ///
    /// `Rejected` on any non-404 failure, `Unreachable` on transport failure.
    pub async fn identify(&self, host: &str, port: u16) -> Result<Option<IdentityResponse>> {
        let url = format!("{}/api/agents/identify", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("host", host), ("port", &port.to_string())])
            .send()
            .await
            .map_err(transport)?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    /// Whether the nexus still has a record with this id.
    ///
    /// # Errors
    ///
    /// `Unreachable` on transport failure; a 404 answer is `Ok(false)`.
    pub async fn exists(&self, agent_id: AgentId) -> Result<bool> {
        let url = format!("{}/api/agents/{agent_id}/exists", self.base_url);
        let response = self.http.get(&url).send().await.map_err(transport)?;
        Ok(response.status().is_success())
    }

    /// Report status over HTTP (the channel fallback path).
    ///
    /// # Errors
    ///
    /// `Rejected` on a non-success answer (401/403/404 mean lost identity)
    /// and `Unreachable` on transport failure.
    pub async fn report_status(
        &self,
        auth_token: &str,
        request: &StatusRequest,
    ) -> Result<StatusResponse> {
        let url = format!("{}/api/agents/status", self.base_url);
        let response = self
            .http
            .post(&url)
            .header(AUTH_HEADER, auth_token)
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    /// Submit unsynced transfer logs for the idempotent merge.
    ///
    /// # Errors
    ///
    /// `Rejected` on a non-success answer, `Unreachable` on transport
    /// failure.
    pub async fn sync_logs(
        &self,
        auth_token: &str,
        batch: &[TransferLogEntry],
    ) -> Result<LogSyncResponse> {
        let url = format!("{}/api/logs/sync", self.base_url);
        let response = self
            .http
            .post(&url)
            .header(AUTH_HEADER, auth_token)
            .json(batch)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    /// Fetch the full peer list with its version.
    ///
    /// # Errors
    ///
    /// `Rejected` on a non-success answer, `Unreachable` on transport
    /// failure.
    pub async fn fetch_peers(&self, auth_token: &str) -> Result<PeerListResponse> {
        let url = format!("{}/api/peers", self.base_url);
        let response = self
            .http
            .get(&url)
            .header(AUTH_HEADER, auth_token)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}

fn transport(e: reqwest::Error) -> ClientError {
    ClientError::Unreachable(e.to_string())
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Rejected {
            status: status.as_u16(),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexlink_core::AgentState;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> NexusClient {
        NexusClient::new(&server.uri(), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn identify_maps_404_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agents/identify"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client(&server).identify("10.0.0.5", 8081).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn register_roundtrip() {
        let server = MockServer::start().await;
        let agent_id = AgentId::generate();
        Mock::given(method("POST"))
            .and(path("/api/agents/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "agent_id": agent_id,
                "state": "PENDING_APPROVAL",
            })))
            .mount(&server)
            .await;

        let response = client(&server)
            .register(&RegisterRequest {
                name: "ws-lab".into(),
                host: "10.0.0.5".into(),
                port: 8081,
            })
            .await
            .unwrap();
        assert_eq!(response.agent_id, agent_id);
        assert_eq!(response.state, AgentState::PendingApproval);
    }

    #[tokio::test]
    async fn rejected_status_is_identity_loss() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agents/status"))
            .and(header("X-Auth-Token", "stale-token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let error = client(&server)
            .report_status(
                "stale-token",
                &StatusRequest {
                    agent_id: AgentId::generate(),
                    host: "10.0.0.5".into(),
                    port: 8081,
                    peer_version: 0,
                    unsynced_logs: 0,
                },
            )
            .await
            .unwrap_err();
        assert!(error.is_identity_loss());
    }

    #[tokio::test]
    async fn unreachable_nexus_is_transient() {
        // Nothing listens on this port.
        let client = NexusClient::new("http://127.0.0.1:9", Duration::from_millis(300));
        assert!(!client.ping().await);

        let error = client
            .register(&RegisterRequest {
                name: "ws-lab".into(),
                host: "10.0.0.5".into(),
                port: 8081,
            })
            .await
            .unwrap_err();
        assert!(matches!(error, ClientError::Unreachable(_)));
        assert!(!error.is_identity_loss());
    }
}
