// ABOUTME: Owns the single WebSocket connection to the external agent.
// ABOUTME: Command-driven task: state machine, backoff reconnect, frame (de)serialization.

pub mod backoff;

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::bus::{BridgeStateEvent, BridgeTraffic, ConnectionState, EventBus};
use crate::config::BridgeConfig;
use crate::metrics;
use crate::protocol::{HelloPayload, Inbound, Outbound, ProtocolError};
use backoff::BackoffState;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ClientRequest = tokio_tungstenite::tungstenite::handshake::client::Request;

/// Commands sent from [`BridgeHandle`] to the connection task.
#[derive(Debug)]
enum BridgeCommand {
    ApplyConfig(BridgeConfig),
    Restart,
    Send {
        message: Outbound,
        silent: bool,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Cloneable handle to the bridge task.
///
/// The task owns the socket outright, so there is never more than one live
/// connection regardless of how many handles exist.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<BridgeCommand>,
}

impl BridgeHandle {
    /// Replace the configuration and restart the connection.
    pub async fn apply_config(&self, config: BridgeConfig) {
        let _ = self.tx.send(BridgeCommand::ApplyConfig(config)).await;
    }

    /// Tear down any live socket and reconnect per the current config.
    pub async fn restart(&self) {
        let _ = self.tx.send(BridgeCommand::Restart).await;
    }

    /// Send a frame, logging a one-line summary on success.
    ///
    /// Returns false when the bridge is not connected or the send failed;
    /// the cause has already been logged by the task.
    pub async fn send(&self, message: Outbound) -> bool {
        self.send_inner(message, false).await
    }

    /// Send a frame without the human-readable summary log.
    pub async fn send_silent(&self, message: Outbound) -> bool {
        self.send_inner(message, true).await
    }

    async fn send_inner(&self, message: Outbound, silent: bool) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = BridgeCommand::Send {
            message,
            silent,
            reply: reply_tx,
        };
        if self.tx.send(cmd).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Stop reconnecting and close the socket. The task exits.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(BridgeCommand::Shutdown).await;
    }
}

/// Spawn the bridge task and connect per `config`.
pub fn spawn(bus: Arc<EventBus>, config: BridgeConfig) -> BridgeHandle {
    let (tx, rx) = mpsc::channel(32);
    let task = BridgeTask {
        bus,
        config,
        socket: None,
        state: ConnectionState::Disconnected,
        last_published: None,
        backoff: BackoffState::default(),
        reconnect_at: None,
        instance_id: uuid::Uuid::new_v4().to_string(),
        shutting_down: false,
    };
    tokio::spawn(task.run(rx));
    BridgeHandle { tx }
}

struct BridgeTask {
    bus: Arc<EventBus>,
    config: BridgeConfig,
    socket: Option<Socket>,
    state: ConnectionState,
    /// Last (state, message) pair published; identical pairs are not repeated.
    last_published: Option<(ConnectionState, Option<String>)>,
    backoff: BackoffState,
    reconnect_at: Option<Instant>,
    instance_id: String,
    shutting_down: bool,
}

enum Step {
    Command(Option<BridgeCommand>),
    Socket(Option<Result<Message, WsError>>),
    Reconnect,
}

impl BridgeTask {
    async fn run(mut self, mut rx: mpsc::Receiver<BridgeCommand>) {
        self.restart().await;

        while !self.shutting_down {
            let has_socket = self.socket.is_some();
            let deadline = self.reconnect_at;
            let socket = &mut self.socket;

            let step = tokio::select! {
                cmd = rx.recv() => Step::Command(cmd),
                frame = async {
                    match socket.as_mut() {
                        Some(s) => s.next().await,
                        None => None,
                    }
                }, if has_socket => Step::Socket(frame),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    Step::Reconnect
                }
            };

            match step {
                Step::Command(None) => break,
                Step::Command(Some(cmd)) => self.handle_command(cmd).await,
                Step::Socket(event) => self.handle_socket_event(event).await,
                Step::Reconnect => {
                    self.reconnect_at = None;
                    self.connect().await;
                }
            }
        }

        self.close_socket().await;
        tracing::debug!("bridge task stopped");
    }

    async fn handle_command(&mut self, cmd: BridgeCommand) {
        match cmd {
            BridgeCommand::ApplyConfig(config) => {
                self.config = config;
                self.restart().await;
            }
            BridgeCommand::Restart => self.restart().await,
            BridgeCommand::Send {
                message,
                silent,
                reply,
            } => {
                let sent = self.transmit(message, silent).await;
                let _ = reply.send(sent);
            }
            BridgeCommand::Shutdown => {
                self.shutting_down = true;
            }
        }
    }

    /// Tear down whatever exists and start over from the current config.
    /// The previous socket is fully closed before a new connect begins.
    async fn restart(&mut self) {
        self.reconnect_at = None;
        self.close_socket().await;

        if !self.config.enabled {
            self.set_state(
                ConnectionState::Disconnected,
                Some("bridge is disabled in configuration".to_string()),
            );
            return;
        }

        let endpoint_missing = self
            .config
            .endpoint
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty();
        if endpoint_missing {
            self.set_state(
                ConnectionState::Error,
                Some("no agent endpoint configured".to_string()),
            );
            return;
        }

        self.connect().await;
    }

    async fn connect(&mut self) {
        let Some(endpoint) = self.config.endpoint.clone() else {
            return;
        };
        self.set_state(ConnectionState::Connecting, None);

        let request = match self.build_request(&endpoint) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, endpoint = %endpoint, "invalid agent endpoint");
                self.set_state(ConnectionState::Error, Some(format!("invalid endpoint: {e}")));
                self.schedule_reconnect();
                return;
            }
        };

        match connect_async(request).await {
            Ok((socket, _response)) => {
                tracing::info!(endpoint = %endpoint, "agent connection established");
                self.socket = Some(socket);
                self.backoff.record_success();
                self.set_state(ConnectionState::Ready, None);
                metrics::record_connected();

                let hello = Outbound::Hello(HelloPayload {
                    client: "gantry".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    instance_id: self.instance_id.clone(),
                    timestamp: Utc::now().to_rfc3339(),
                });
                self.transmit(hello, true).await;
            }
            Err(e) => {
                tracing::error!(error = %e, endpoint = %endpoint, "agent connection failed");
                self.bus.error(format!("connection to agent failed: {e}"));
                self.set_state(ConnectionState::Error, Some(e.to_string()));
                self.schedule_reconnect();
            }
        }
    }

    fn build_request(&self, endpoint: &str) -> anyhow::Result<ClientRequest> {
        let mut request = endpoint.into_client_request()?;
        if let Some(token) = &self.config.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("auth token is not a valid header value")?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }

    async fn handle_socket_event(&mut self, event: Option<Result<Message, WsError>>) {
        match event {
            Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()),
            Some(Ok(Message::Close(_))) | None => {
                tracing::info!("agent closed the connection");
                self.bus.info("agent connection closed");
                self.socket = None;
                self.set_state(ConnectionState::Disconnected, None);
                self.schedule_reconnect();
            }
            // Ping/pong handled by the protocol layer; binary frames ignored
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "agent socket error");
                self.bus.error(format!("agent connection error: {e}"));
                self.socket = None;
                self.set_state(ConnectionState::Error, Some(e.to_string()));
                self.schedule_reconnect();
            }
        }
    }

    /// Parse one inbound text frame and republish it on the bus. Malformed
    /// frames are dropped with a warning and never change connection state.
    fn handle_frame(&mut self, text: &str) {
        match Inbound::parse(text) {
            Ok(message) => {
                metrics::record_frame_in(message.kind());
                tracing::debug!(kind = message.kind(), "frame received");
                self.bus.publish_traffic(BridgeTraffic::Inbound(message));
            }
            Err(ProtocolError::UnknownType(kind)) => {
                tracing::warn!(kind = %kind, "dropping frame with unknown type");
                self.bus.warn(format!("unrecognized message type `{kind}`"));
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                self.bus.warn(format!("dropped malformed frame: {e}"));
            }
        }
    }

    async fn transmit(&mut self, message: Outbound, silent: bool) -> bool {
        if self.state != ConnectionState::Ready || self.socket.is_none() {
            self.bus.warn(format!(
                "bridge is not connected; dropping `{}` frame",
                message.kind()
            ));
            return false;
        }

        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, kind = message.kind(), "frame serialization failed");
                self.bus
                    .error(format!("failed to serialize `{}` frame: {e}", message.kind()));
                self.set_state(ConnectionState::Error, Some(e.to_string()));
                return false;
            }
        };

        let sent = match self.socket.as_mut() {
            Some(socket) => socket.send(Message::Text(json.into())).await,
            None => return false,
        };
        if let Err(e) = sent {
            tracing::error!(error = %e, kind = message.kind(), "frame transmission failed");
            self.bus
                .error(format!("failed to send `{}` frame: {e}", message.kind()));
            self.set_state(ConnectionState::Error, Some(e.to_string()));
            return false;
        }

        metrics::record_frame_out(message.kind());
        if !silent {
            self.bus.info(message.summary());
        }
        self.bus.publish_traffic(BridgeTraffic::Outbound(message));
        true
    }

    fn schedule_reconnect(&mut self) {
        if self.shutting_down || !self.config.enabled {
            return;
        }
        let delay = self.backoff.record_failure();
        metrics::record_reconnect_scheduled();
        tracing::info!(
            delay_secs = delay.as_secs(),
            attempt = self.backoff.consecutive_failures(),
            "reconnect scheduled"
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn set_state(&mut self, state: ConnectionState, message: Option<String>) {
        self.state = state;
        let pair = (state, message);
        if self.last_published.as_ref() == Some(&pair) {
            return;
        }
        self.bus.publish_bridge_state(BridgeStateEvent {
            state: pair.0,
            message: pair.1.clone(),
        });
        self.last_published = Some(pair);
    }

    async fn close_socket(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
    }
}
