//! Tests for the agent's HTTP surface and its registration flow against a
//! mocked nexus.

use std::sync::Arc;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nexlink_agent::{
    create_router, tasks, AgentConfig, AppState, ConnectionManager, IdentityStore, NexusClient,
    PeerCache, TransferLogStore,
};
use nexlink_core::{AgentId, AgentState, PeerInfo};
use nexlink_transfer::FileReceiver;

struct Harness {
    server: TestServer,
    state: Arc<AppState>,
    _dir: TempDir,
}

fn harness(nexus_url: &str) -> Harness {
    let dir = TempDir::new().unwrap();

    let config = AgentConfig {
        nexus_url: nexus_url.trim_end_matches('/').to_string(),
        host: "10.0.0.5".into(),
        port: 8081,
        name: "ws-lab".into(),
        data_dir: dir.path().to_path_buf(),
        upload_dir: dir.path().join("uploads"),
        registration_period_seconds: 30,
        status_period_seconds: 30,
        log_sync_period_seconds: 60,
        reconnect_delay_seconds: 10,
        request_timeout_seconds: 2,
    };

    let identity = Arc::new(
        IdentityStore::load_or_create(
            &config.data_dir,
            config.display_name(),
            config.host.clone(),
            config.port,
        )
        .unwrap(),
    );
    let peers = Arc::new(PeerCache::new(&config.data_dir));
    let logs = Arc::new(TransferLogStore::load_or_default(&config.data_dir));
    let client = NexusClient::new(&config.nexus_url, config.request_timeout());
    let connection = ConnectionManager::new(
        &config.nexus_url,
        config.reconnect_delay(),
        Arc::clone(&identity),
        Arc::clone(&peers),
    );
    let receiver = FileReceiver::new(&config.upload_dir);

    let state = Arc::new(AppState::new(
        config, identity, peers, logs, client, connection, receiver,
    ));
    let server = TestServer::new(create_router(Arc::clone(&state))).unwrap();

    Harness {
        server,
        state,
        _dir: dir,
    }
}

fn cached_peer(token: &str) -> PeerInfo {
    PeerInfo {
        agent_id: Some(AgentId::generate()),
        name: "ws-media".into(),
        host: "10.0.0.7".into(),
        port: 8081,
        online: true,
        public_token: Some(token.into()),
    }
}

#[tokio::test]
async fn approval_push_applies_identity_idempotently() {
    let h = harness("http://127.0.0.1:9");
    let agent_id = AgentId::generate();

    let push = json!({
        "agent_id": agent_id,
        "approved_name": "ws-lab",
        "auth_token": "auth.tok",
        "public_token": "pub.tok",
        "state": "APPROVED",
    });

    h.server
        .post("/api/approval")
        .json(&push)
        .await
        .assert_status_ok();

    let identity = h.state.identity.snapshot();
    assert_eq!(identity.id, Some(agent_id));
    assert_eq!(identity.state, AgentState::Approved);
    assert_eq!(identity.auth_token.as_deref(), Some("auth.tok"));

    // Redelivery of the same approval is a no-op, not an error.
    h.server
        .post("/api/approval")
        .json(&push)
        .await
        .assert_status_ok();
    assert_eq!(h.state.identity.snapshot().id, Some(agent_id));
}

#[tokio::test]
async fn rename_push_applies_name() {
    let h = harness("http://127.0.0.1:9");

    h.server
        .post("/api/agents/rename")
        .json(&json!({"agent_name": "ws-archive"}))
        .await
        .assert_status_ok();

    assert_eq!(h.state.identity.snapshot().name, "ws-archive");
}

#[tokio::test]
async fn upload_requires_a_known_peer_token() {
    let h = harness("http://127.0.0.1:9");

    // No token at all.
    h.server
        .get("/api/upload/check")
        .add_query_param("filename", "a.bin")
        .add_query_param("file_size", 10)
        .await
        .assert_status_unauthorized();

    // A token no cached peer owns.
    h.server
        .get("/api/upload/check")
        .add_header("x-auth-token", "stranger")
        .add_query_param("filename", "a.bin")
        .add_query_param("file_size", 10)
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn upload_from_cached_peer_lands_and_is_logged() {
    let h = harness("http://127.0.0.1:9");
    h.state.peers.install(vec![cached_peer("peer.tok")], 1);

    h.server
        .get("/api/upload/check")
        .add_header("x-auth-token", "peer.tok")
        .add_query_param("filename", "report.pdf")
        .add_query_param("file_size", 1024)
        .await
        .assert_status_ok();

    let body = b"direct peer transfer".to_vec();
    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(body.clone()).file_name("report.pdf"),
    );
    let response = h
        .server
        .post("/api/upload")
        .add_header("x-auth-token", "peer.tok")
        .multipart(form)
        .await;
    response.assert_status_ok();

    let on_disk = std::fs::read(h.state.receiver.dest_dir().join("report.pdf")).unwrap();
    assert_eq!(on_disk, body);

    // The receive appended an unsynced log entry for the reconciler.
    let unsynced = h.state.logs.unsynced();
    assert_eq!(unsynced.len(), 1);
    assert_eq!(unsynced[0].filename, "report.pdf");
    assert_eq!(unsynced[0].from_agent_name, "ws-media");
}

#[tokio::test]
async fn invalid_filename_is_rejected_before_write() {
    let h = harness("http://127.0.0.1:9");
    h.state.peers.install(vec![cached_peer("peer.tok")], 1);

    h.server
        .get("/api/upload/check")
        .add_header("x-auth-token", "peer.tok")
        .add_query_param("filename", "../../escape.bin")
        .add_query_param("file_size", 10)
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn registration_tick_registers_when_nexus_does_not_know_us() {
    let nexus = MockServer::start().await;
    let agent_id = AgentId::generate();

    Mock::given(method("GET"))
        .and(path("/api/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&nexus)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/agents/identify"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&nexus)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agents/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agent_id": agent_id,
            "state": "PENDING_APPROVAL",
        })))
        .expect(1)
        .mount(&nexus)
        .await;

    let h = harness(&nexus.uri());
    tasks::registration_tick(&h.state).await;

    let identity = h.state.identity.snapshot();
    assert_eq!(identity.id, Some(agent_id));
    assert_eq!(identity.state, AgentState::PendingApproval);
}

#[tokio::test]
async fn registration_tick_resolves_existing_identity() {
    let nexus = MockServer::start().await;
    let agent_id = AgentId::generate();

    Mock::given(method("GET"))
        .and(path("/api/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&nexus)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/agents/identify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agent_id": agent_id,
            "name": "ws-lab",
            "auth_token": null,
            "public_token": null,
            "state": "PENDING_APPROVAL",
        })))
        .mount(&nexus)
        .await;

    let h = harness(&nexus.uri());
    tasks::registration_tick(&h.state).await;

    let identity = h.state.identity.snapshot();
    assert_eq!(identity.id, Some(agent_id));
    assert_eq!(identity.state, AgentState::PendingApproval);
}

#[tokio::test]
async fn lost_identity_triggers_reset_and_fresh_registration() {
    let nexus = MockServer::start().await;
    let old_id = AgentId::generate();
    let new_id = AgentId::generate();

    Mock::given(method("GET"))
        .and(path("/api/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&nexus)
        .await;
    // The nexus was wiped: the old id is gone and the address is unknown.
    Mock::given(method("GET"))
        .and(path(format!("/api/agents/{old_id}/exists")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&nexus)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/agents/identify"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&nexus)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agents/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agent_id": new_id,
            "state": "PENDING_APPROVAL",
        })))
        .mount(&nexus)
        .await;

    let h = harness(&nexus.uri());
    h.state.identity.set_id(old_id).unwrap();
    h.state
        .identity
        .transition_to(AgentState::PendingApproval)
        .unwrap();

    tasks::registration_tick(&h.state).await;

    let identity = h.state.identity.snapshot();
    assert_eq!(identity.id, Some(new_id), "agent should have re-registered");
    assert_eq!(identity.state, AgentState::PendingApproval);
}
