//! Reachability probe.
//!
//! Agents ping this endpoint before deciding whether the nexus is online.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

/// Ping response.
#[derive(Debug, Serialize)]
pub struct PingResponse {
    /// Always "online"; reachability is the signal.
    pub status: &'static str,
    /// Server time in epoch milliseconds.
    pub timestamp: i64,
}

/// Ping handler. Public, unauthenticated.
pub async fn ping() -> impl IntoResponse {
    let response = PingResponse {
        status: "online",
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    (StatusCode::OK, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_returns_ok() {
        let response = ping().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
