//! End-to-end protocol tests against the full nexus router.

use std::sync::Arc;
use std::time::Duration;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nexlink_auth::TokenService;
use nexlink_core::{
    AgentAddress, AgentState, IdentityResponse, LogId, LogSyncResponse, PeerListResponse,
    RegisterResponse, StatusResponse, TransferLogEntry, UploadReceipt,
};
use nexlink_nexus::{create_router, Channels, NexusConfig, NexusState, PushService, Registry};
use nexlink_store::RocksStore;
use nexlink_transfer::FileReceiver;

struct Harness {
    server: TestServer,
    state: Arc<NexusState>,
    _data_dir: TempDir,
    _upload_dir: TempDir,
}

fn harness() -> Harness {
    let data_dir = TempDir::new().unwrap();
    let upload_dir = TempDir::new().unwrap();

    let config = NexusConfig {
        listen_addr: "127.0.0.1:0".into(),
        public_host: "127.0.0.1".into(),
        public_port: 8080,
        data_dir: data_dir.path().display().to_string(),
        upload_dir: upload_dir.path().display().to_string(),
        secret: "integration-secret".into(),
        admin_username: "admin".into(),
        admin_password: "hunter2".into(),
        cors_origins: Vec::new(),
        push_period_seconds: 30,
        push_timeout_seconds: 2,
        max_upload_bytes: 64 * 1024 * 1024,
    };

    let store = Arc::new(RocksStore::open(data_dir.path()).unwrap());
    let tokens = TokenService::new(&config.secret);
    let registry = Arc::new(Registry::new(
        store,
        tokens.clone(),
        AgentAddress::new(config.public_host.clone(), config.public_port),
    ));
    let channels = Arc::new(Channels::new());
    let push = Arc::new(PushService::new(
        Arc::clone(&registry),
        Arc::clone(&channels),
        Duration::from_secs(config.push_period_seconds),
        Duration::from_secs(config.push_timeout_seconds),
    ));
    let receiver = FileReceiver::new(upload_dir.path());

    let state = Arc::new(NexusState::new(
        registry,
        channels,
        push,
        tokens,
        receiver,
        config,
    ));
    let server = TestServer::new(create_router(Arc::clone(&state))).unwrap();

    Harness {
        server,
        state,
        _data_dir: data_dir,
        _upload_dir: upload_dir,
    }
}

async fn admin_token(h: &Harness) -> String {
    let response = h
        .server
        .post("/api/auth/login")
        .json(&json!({"username": "admin", "password": "hunter2"}))
        .await;
    response.assert_status_ok();
    response.json::<serde_json::Value>()["token"]
        .as_str()
        .unwrap()
        .to_string()
}

/// The full scenario: register -> pending -> approve -> HTTP-fallback push ->
/// heartbeat sees APPROVED with tokens -> version incremented exactly once.
#[tokio::test]
async fn approval_lifecycle_end_to_end() {
    let h = harness();

    // A mock agent HTTP surface stands in for the not-yet-connected agent.
    let agent_surface = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/approval"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&agent_surface)
        .await;

    let agent_addr = agent_surface.address();
    let version_before = h.state.registry.current_version().unwrap();

    // Register.
    let response = h
        .server
        .post("/api/agents/register")
        .json(&json!({
            "name": "ws-lab",
            "host": agent_addr.ip().to_string(),
            "port": agent_addr.port(),
        }))
        .await;
    response.assert_status_ok();
    let registered: RegisterResponse = response.json();
    assert_eq!(registered.state, AgentState::PendingApproval);

    // Registering again from the same address returns the same record.
    let retry: RegisterResponse = h
        .server
        .post("/api/agents/register")
        .json(&json!({
            "name": "ws-lab",
            "host": agent_addr.ip().to_string(),
            "port": agent_addr.port(),
        }))
        .await
        .json();
    assert_eq!(retry.agent_id, registered.agent_id);

    // Operator approves.
    let token = admin_token(&h).await;
    h.server
        .post(&format!("/api/admin/agents/{}/approve", registered.agent_id))
        .add_header("x-auth-token", token.as_str())
        .await
        .assert_status_ok();

    // No channel is open, so the sweep delivers over HTTP.
    h.state.push.sweep().await;
    let record = h.state.registry.get(&registered.agent_id).unwrap();
    assert!(record.approval_pushed, "HTTP fallback push did not land");

    // The agent resolves its identity and receives both tokens.
    let identity: IdentityResponse = h
        .server
        .get("/api/agents/identify")
        .add_query_param("host", agent_addr.ip().to_string())
        .add_query_param("port", agent_addr.port())
        .await
        .json();
    assert_eq!(identity.state, AgentState::Approved);
    let auth_token = identity.auth_token.expect("approved identity has auth token");
    assert!(identity.public_token.is_some());

    // Heartbeat with a stale peer version gets the list and version together.
    let status: StatusResponse = h
        .server
        .post("/api/agents/status")
        .add_header("x-auth-token", auth_token.as_str())
        .json(&json!({
            "agent_id": registered.agent_id,
            "host": agent_addr.ip().to_string(),
            "port": agent_addr.port(),
            "peer_version": version_before,
            "unsynced_logs": 0,
        }))
        .await
        .json();
    assert_eq!(status.state, AgentState::Approved);
    assert!(status.peer_outdated);
    assert_eq!(status.version, Some(version_before + 1));
    let peers = status.peers.unwrap();
    assert!(peers.iter().any(|p| p.name == "Nexus"));

    // Exactly one structural change across the whole sequence.
    assert_eq!(
        h.state.registry.current_version().unwrap(),
        version_before + 1
    );
}

#[tokio::test]
async fn unknown_address_identify_is_404() {
    let h = harness();
    h.server
        .get("/api/agents/identify")
        .add_query_param("host", "10.9.9.9")
        .add_query_param("port", 8081)
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn heartbeat_with_foreign_token_is_unauthorized() {
    let h = harness();

    // A token signed by a different nexus (e.g. before a registry wipe).
    let foreign = TokenService::new("some-other-secret")
        .issue(
            nexlink_core::AgentId::generate(),
            "ghost",
            nexlink_auth::TokenScope::Auth,
        )
        .unwrap();

    let response = h
        .server
        .post("/api/agents/status")
        .add_header("x-auth-token", foreign)
        .json(&json!({
            "agent_id": nexlink_core::AgentId::generate(),
            "host": "10.0.0.5",
            "port": 8081,
            "peer_version": 0,
            "unsynced_logs": 0,
        }))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn log_sync_merge_is_idempotent() {
    let h = harness();

    // Register and approve directly through the registry.
    let registered = h
        .state
        .registry
        .register("ws-lab", AgentAddress::new("10.0.0.5", 8081))
        .unwrap();
    h.state.registry.approve(&registered.agent_id).unwrap();
    let auth_token = h
        .state
        .registry
        .get(&registered.agent_id)
        .unwrap()
        .auth_token
        .unwrap();

    let batch = vec![
        TransferLogEntry {
            id: LogId::generate(),
            from_agent_id: None,
            from_agent_name: String::new(),
            to_agent_id: Some(registered.agent_id),
            to_agent_name: "ws-lab".into(),
            filename: "a.bin".into(),
            file_size: 10,
            timestamp: Utc::now(),
        },
        TransferLogEntry {
            id: LogId::generate(),
            from_agent_id: None,
            from_agent_name: String::new(),
            to_agent_id: Some(registered.agent_id),
            to_agent_name: "ws-lab".into(),
            filename: "b.bin".into(),
            file_size: 20,
            timestamp: Utc::now(),
        },
    ];

    let first: LogSyncResponse = h
        .server
        .post("/api/logs/sync")
        .add_header("x-auth-token", auth_token.as_str())
        .json(&batch)
        .await
        .json();
    assert_eq!(first.merged_ids.len(), 2);
    assert_eq!(h.state.registry.store().count_logs().unwrap(), 2);

    // Resubmitting the identical batch stores nothing new but still confirms
    // every id, so a sender whose response was lost can prune.
    let second: LogSyncResponse = h
        .server
        .post("/api/logs/sync")
        .add_header("x-auth-token", auth_token.as_str())
        .json(&batch)
        .await
        .json();
    assert_eq!(second.merged_ids.len(), 2);
    assert_eq!(h.state.registry.store().count_logs().unwrap(), 2);
}

#[tokio::test]
async fn upload_preflight_and_receive() {
    let h = harness();

    let registered = h
        .state
        .registry
        .register("ws-lab", AgentAddress::new("10.0.0.5", 8081))
        .unwrap();
    h.state.registry.approve(&registered.agent_id).unwrap();
    let auth_token = h
        .state
        .registry
        .get(&registered.agent_id)
        .unwrap()
        .auth_token
        .unwrap();

    // Bad filename fails preflight with 400.
    h.server
        .get("/api/upload/check")
        .add_header("x-auth-token", auth_token.as_str())
        .add_query_param("filename", "../escape.bin")
        .add_query_param("file_size", 10)
        .await
        .assert_status_bad_request();

    // A sane transfer passes preflight.
    h.server
        .get("/api/upload/check")
        .add_header("x-auth-token", auth_token.as_str())
        .add_query_param("filename", "report.pdf")
        .add_query_param("file_size", 1024)
        .await
        .assert_status_ok();

    // Upload lands at the final name and is logged.
    let body = b"nexlink payload".to_vec();
    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(body.clone()).file_name("report.pdf"),
    );
    let response = h
        .server
        .post("/api/upload")
        .add_header("x-auth-token", auth_token.as_str())
        .multipart(form)
        .await;
    response.assert_status_ok();
    let receipt: UploadReceipt = response.json();
    assert_eq!(receipt.filename, "report.pdf");
    assert_eq!(receipt.size, body.len() as u64);

    let on_disk = std::fs::read(h.state.receiver.dest_dir().join("report.pdf")).unwrap();
    assert_eq!(on_disk, body);
    assert_eq!(h.state.registry.store().count_logs().unwrap(), 1);
}

#[tokio::test]
async fn peer_fetch_requires_approval() {
    let h = harness();

    // Unauthenticated fetch is rejected outright.
    h.server.get("/api/peers").await.assert_status_unauthorized();

    let registered = h
        .state
        .registry
        .register("ws-lab", AgentAddress::new("10.0.0.5", 8081))
        .unwrap();
    h.state.registry.approve(&registered.agent_id).unwrap();
    let auth_token = h
        .state
        .registry
        .get(&registered.agent_id)
        .unwrap()
        .auth_token
        .unwrap();

    let list: PeerListResponse = h
        .server
        .get("/api/peers")
        .add_header("x-auth-token", auth_token.as_str())
        .await
        .json();
    assert!(list.peers.iter().any(|p| p.name == "Nexus"));
    assert!(list.version >= 1);
}
