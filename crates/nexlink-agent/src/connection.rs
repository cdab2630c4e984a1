//! The agent's single persistent channel to the nexus.
//!
//! One physical session exists per agent/nexus pair. The manager connects
//! only once an auth token is available, dispatches typed envelopes off the
//! socket, and on any termination schedules exactly one reconnect after a
//! fixed delay; a compare-and-swap guard ensures a concurrent manual
//! `connect()` and an automatic reconnect never both arm a timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use nexlink_core::ChannelMessage;

use crate::identity::IdentityStore;
use crate::peers::PeerCache;

/// Bound on the channel handshake; a hung connect is a transient failure.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No session; a reconnect may be pending.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The session is open and the receive loop is running.
    Connected,
}

/// Owns the persistent channel and its reconnect discipline.
pub struct ConnectionManager {
    ws_url: String,
    reconnect_delay: Duration,
    identity: Arc<IdentityStore>,
    peers: Arc<PeerCache>,
    link: Mutex<LinkState>,
    reconnect_armed: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<ChannelMessage>>>,
}

impl ConnectionManager {
    /// Create a manager for the nexus at `nexus_url`.
    #[must_use]
    pub fn new(
        nexus_url: &str,
        reconnect_delay: Duration,
        identity: Arc<IdentityStore>,
        peers: Arc<PeerCache>,
    ) -> Arc<Self> {
        let ws_url = ws_url_for(nexus_url);
        Arc::new(Self {
            ws_url,
            reconnect_delay,
            identity,
            peers,
            link: Mutex::new(LinkState::Disconnected),
            reconnect_armed: AtomicBool::new(false),
            outbound: Mutex::new(None),
        })
    }

    /// Whether the channel is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.link.lock() == LinkState::Connected
    }

    /// Send a message over the open channel.
    ///
    /// A closed channel makes this a logged no-op returning `false`; callers
    /// fall back to the request/response path themselves.
    pub fn send(&self, message: ChannelMessage) -> bool {
        let outbound = self.outbound.lock();
        match outbound.as_ref() {
            Some(tx) if tx.send(message).is_ok() => true,
            _ => {
                tracing::warn!("Cannot send, channel not open");
                false
            }
        }
    }

    /// Open the channel if disconnected and an auth token exists.
    ///
    /// Safe to call from multiple places (manual trigger, registration tick,
    /// post-approval): only one attempt proceeds, the rest return
    /// immediately.
    pub async fn connect(self: &Arc<Self>) {
        {
            let mut link = self.link.lock();
            if *link != LinkState::Disconnected {
                let current = *link;
                tracing::debug!(state = ?current, "Already connecting or connected, skipping");
                return;
            }
            *link = LinkState::Connecting;
        }

        let Some(token) = self.identity.auth_token() else {
            tracing::warn!("Cannot open channel, no auth token yet");
            *self.link.lock() = LinkState::Disconnected;
            return;
        };

        let request = match build_request(&self.ws_url, &token) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, url = %self.ws_url, "Invalid channel request");
                *self.link.lock() = LinkState::Disconnected;
                return;
            }
        };

        tracing::info!(url = %self.ws_url, "Connecting to nexus channel");
        let attempt = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request)).await;
        match attempt {
            Ok(Ok((stream, _))) => {
                let (tx, rx) = mpsc::unbounded_channel();
                *self.outbound.lock() = Some(tx);
                *self.link.lock() = LinkState::Connected;
                tracing::info!(url = %self.ws_url, "Channel up");
                tokio::spawn(Arc::clone(self).run_session(stream, rx));
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Channel connect failed");
                *self.link.lock() = LinkState::Disconnected;
                self.schedule_reconnect();
            }
            Err(_) => {
                tracing::warn!("Channel connect timed out");
                *self.link.lock() = LinkState::Disconnected;
                self.schedule_reconnect();
            }
        }
    }

    /// Drive the open session until either side terminates it.
    async fn run_session(
        self: Arc<Self>,
        stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        mut rx: mpsc::UnboundedReceiver<ChannelMessage>,
    ) {
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    let Some(message) = outbound else { break };
                    match message.encode() {
                        Ok(text) => {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Dropped unencodable channel message");
                        }
                    }
                }
                inbound = source.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {} // control frames
                        Some(Err(e)) => {
                            tracing::debug!(error = %e, "Channel read error");
                            break;
                        }
                    }
                }
            }
        }

        self.teardown();
    }

    /// Flip to disconnected and arm one reconnect.
    fn teardown(self: &Arc<Self>) {
        *self.outbound.lock() = None;
        *self.link.lock() = LinkState::Disconnected;
        tracing::warn!("Channel down, scheduling reconnect");
        self.schedule_reconnect();
    }

    /// Arm the single reconnect timer. Returns whether this call armed it.
    pub(crate) fn schedule_reconnect(self: &Arc<Self>) -> bool {
        if self
            .reconnect_armed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Reconnect already scheduled, skipping duplicate");
            return false;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(manager.reconnect_delay).await;
            // Clear before connecting so the attempt itself can arm the next.
            manager.reconnect_armed.store(false, Ordering::SeqCst);
            tracing::info!("Attempting channel reconnect");
            manager.connect().await;
        });
        true
    }

    /// Dispatch one inbound frame by its tag.
    fn handle_frame(self: &Arc<Self>, raw: &str) {
        match ChannelMessage::decode(raw) {
            Ok(ChannelMessage::ApprovalPush(push)) => match self.identity.apply_approval(&push) {
                Ok(true) => {
                    tracing::info!(name = %push.approved_name, "Approval received over channel");
                }
                Ok(false) => {
                    tracing::debug!("Approval push was already applied");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to persist pushed approval");
                }
            },
            Ok(ChannelMessage::PeerUpdate { peers, version }) => {
                self.peers.install(peers, version);
            }
            Ok(ChannelMessage::RenameRequest(rename)) => {
                if let Err(e) = self.identity.apply_name(&rename.agent_name) {
                    tracing::error!(error = %e, "Failed to persist pushed rename");
                }
            }
            Ok(ChannelMessage::StatusUpdate(_)) => {
                tracing::debug!("Ignoring unexpected inbound status_update");
            }
            Ok(ChannelMessage::Unknown(tag)) => {
                tracing::warn!(tag = %tag, "Unknown channel message type");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode channel frame");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn link_state(&self) -> LinkState {
        *self.link.lock()
    }
}

/// Derive the channel URL from the nexus base URL.
fn ws_url_for(nexus_url: &str) -> String {
    let base = nexus_url.trim_end_matches('/');
    let swapped = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{base}")
    };
    format!("{swapped}/ws/agents")
}

/// Build the handshake request with the auth header attached.
fn build_request(
    ws_url: &str,
    token: &str,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, String> {
    let mut request = ws_url
        .into_client_request()
        .map_err(|e| e.to_string())?;
    request.headers_mut().insert(
        "X-Auth-Token",
        token.parse().map_err(|_| "token is not a valid header value")?,
    );
    Ok(request)
}
