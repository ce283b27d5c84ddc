// ABOUTME: End-to-end tests driving a full App against a local WebSocket agent.
// ABOUTME: Covers hello, invocation round-trips, context replies, and disconnects.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use gantry::app::App;
use gantry::bus::StatusEvent;
use gantry::config::{BridgeConfig, Config};
use gantry::context::{ContextProvider, ContextSnapshot};
use gantry::editor::{ResolvedFileEdit, WorkspaceEditor};
use gantry::orchestrator::HostIntegration;
use gantry::terminal::{TerminalLauncher, TerminalSink};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

// =============================================================================
// Fake agent server
// =============================================================================

struct FakeAgent {
    /// Frames received from the bridge, parsed as JSON.
    from_bridge: mpsc::Receiver<Value>,
    /// Raw frames to push to the bridge. Dropping this closes the socket.
    to_bridge: mpsc::Sender<String>,
    endpoint: String,
}

async fn start_fake_agent() -> FakeAgent {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (in_tx, in_rx) = mpsc::channel::<Value>(64);
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        let (mut sink, mut stream) = ws.split();
        loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let value: Value = serde_json::from_str(text.as_str()).expect("json");
                        if in_tx.send(value).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                },
                frame = out_rx.recv() => match frame {
                    Some(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        break;
                    }
                },
            }
        }
    });

    FakeAgent {
        from_bridge: in_rx,
        to_bridge: out_tx,
        endpoint: format!("ws://{addr}"),
    }
}

impl FakeAgent {
    async fn expect_frame(&mut self, kind: &str) -> Value {
        let frame = timeout(Duration::from_secs(5), self.from_bridge.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("agent connection closed");
        assert_eq!(frame["type"], kind, "unexpected frame: {frame}");
        frame
    }

    async fn send(&self, frame: &str) {
        self.to_bridge.send(frame.to_string()).await.expect("send");
    }
}

// =============================================================================
// Host surface stubs
// =============================================================================

struct FixedContext;

impl ContextProvider for FixedContext {
    fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            workspace_roots: vec!["/w".to_string()],
            active_file: None,
            selection: None,
            captured_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }
}

struct AcceptingEditor;

#[async_trait]
impl WorkspaceEditor for AcceptingEditor {
    async fn apply(&self, _batch: Vec<ResolvedFileEdit>) -> Result<bool> {
        Ok(true)
    }
}

struct SilentTerminal {
    lines: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TerminalSink for SilentTerminal {
    fn name(&self) -> &str {
        "test"
    }

    fn is_alive(&mut self) -> bool {
        true
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

struct SilentLauncher {
    lines: Arc<Mutex<Vec<String>>>,
}

impl TerminalLauncher for SilentLauncher {
    fn launch(&self, _name: &str) -> Result<Box<dyn TerminalSink>> {
        Ok(Box::new(SilentTerminal {
            lines: Arc::clone(&self.lines),
        }))
    }
}

fn start_app(endpoint: &str) -> App {
    let config = Config {
        bridge: BridgeConfig {
            enabled: true,
            endpoint: Some(endpoint.to_string()),
            auth_token: Some("test-token".to_string()),
        },
        ..Default::default()
    };
    let host = HostIntegration {
        context: Arc::new(FixedContext),
        editor: Arc::new(AcceptingEditor),
        terminals: Arc::new(SilentLauncher {
            lines: Arc::new(Mutex::new(Vec::new())),
        }),
        workspace_roots: Vec::new(),
    };
    App::start_with(config, host)
}

async fn recv<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_hello_is_sent_on_connect() {
    let mut agent = start_fake_agent().await;
    let app = start_app(&agent.endpoint);

    let hello = agent.expect_frame("hello").await;
    assert_eq!(hello["payload"]["client"], "gantry");
    assert!(hello["payload"]["instanceId"].is_string());
    assert!(hello["payload"]["timestamp"].is_string());

    app.shutdown().await;
}

#[tokio::test]
async fn test_invocation_round_trip() {
    let mut agent = start_fake_agent().await;
    let app = start_app(&agent.endpoint);
    let mut status_rx = app.bus.subscribe_status();
    let mut actions_rx = app.bus.subscribe_actions();

    agent.expect_frame("hello").await;
    agent
        .send(r#"{"type":"register-actions","payload":{"actions":[{"id":"fmt","label":"Format"}]}}"#)
        .await;

    let actions = recv(&mut actions_rx).await;
    assert_eq!(actions[0].id, "remote:fmt");

    // Invoke through the host entry point; the agent sees the bare remote id
    app.orchestrator.run_remote_action("remote:fmt").await;
    let invoked = agent.expect_frame("action-invoked").await;
    assert_eq!(invoked["payload"]["actionId"], "fmt");
    // Context rides along by default
    assert_eq!(invoked["payload"]["context"]["workspaceRoots"][0], "/w");

    let status = recv(&mut status_rx).await;
    assert_eq!(status, StatusEvent::Processing { active: 1 });

    agent
        .send(r#"{"type":"action-complete","payload":{"actionId":"fmt","status":"success","message":"formatted"}}"#)
        .await;

    let status = recv(&mut status_rx).await;
    assert_eq!(status, StatusEvent::Idle);

    app.shutdown().await;
}

#[tokio::test]
async fn test_unknown_action_sends_nothing() {
    let mut agent = start_fake_agent().await;
    let app = start_app(&agent.endpoint);

    agent.expect_frame("hello").await;
    app.orchestrator.run_remote_action("remote:ghost").await;

    // Chat afterwards acts as a fence: the next frame the agent sees must be
    // the chat, proving no invocation frame was produced.
    app.orchestrator.send_chat("ping", false).await;
    let frame = agent.expect_frame("chat-message").await;
    assert_eq!(frame["payload"]["message"], "ping");

    app.shutdown().await;
}

#[tokio::test]
async fn test_context_request_gets_snapshot_reply() {
    let mut agent = start_fake_agent().await;
    let app = start_app(&agent.endpoint);

    agent.expect_frame("hello").await;
    agent.send(r#"{"type":"context-request"}"#).await;

    let reply = agent.expect_frame("context-snapshot").await;
    assert_eq!(reply["payload"]["workspaceRoots"][0], "/w");

    app.shutdown().await;
}

#[tokio::test]
async fn test_chat_round_trip_sets_processing_then_idle() {
    let mut agent = start_fake_agent().await;
    let app = start_app(&agent.endpoint);
    let mut status_rx = app.bus.subscribe_status();

    agent.expect_frame("hello").await;

    app.orchestrator.send_chat("  summarize this  ", true).await;
    let chat = agent.expect_frame("chat-message").await;
    // Input is trimmed before sending
    assert_eq!(chat["payload"]["message"], "summarize this");
    assert_eq!(chat["payload"]["context"]["workspaceRoots"][0], "/w");

    let status = recv(&mut status_rx).await;
    assert!(matches!(status, StatusEvent::Processing { .. }));

    agent
        .send(r#"{"type":"chat-response","payload":{"message":"summary","role":"assistant"}}"#)
        .await;
    let status = recv(&mut status_rx).await;
    assert_eq!(status, StatusEvent::Idle);

    app.shutdown().await;
}

#[tokio::test]
async fn test_empty_chat_is_not_sent() {
    let mut agent = start_fake_agent().await;
    let app = start_app(&agent.endpoint);

    agent.expect_frame("hello").await;
    app.orchestrator.send_chat("   ", true).await;

    app.orchestrator.send_chat("real message", false).await;
    let frame = agent.expect_frame("chat-message").await;
    assert_eq!(frame["payload"]["message"], "real message");

    app.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_evicts_remote_actions_but_not_in_flight() {
    let mut agent = start_fake_agent().await;
    let app = start_app(&agent.endpoint);
    let mut actions_rx = app.bus.subscribe_actions();
    let mut status_rx = app.bus.subscribe_status();

    agent.expect_frame("hello").await;
    agent
        .send(r#"{"type":"register-actions","payload":{"actions":[{"id":"a","label":"A"},{"id":"b","label":"B"}]}}"#)
        .await;
    let registered = recv(&mut actions_rx).await;
    assert_eq!(registered.len(), 2);

    // Put two actions in flight
    app.orchestrator.run_remote_action("a").await;
    agent.expect_frame("action-invoked").await;
    app.orchestrator.run_remote_action("b").await;
    agent.expect_frame("action-invoked").await;

    assert_eq!(recv(&mut status_rx).await, StatusEvent::Processing { active: 1 });
    assert_eq!(recv(&mut status_rx).await, StatusEvent::Processing { active: 2 });

    // Drop the agent: the socket closes, the bridge reports the transition,
    // and the registry's remote bucket empties
    drop(agent);
    let cleared = recv(&mut actions_rx).await;
    assert!(cleared.is_empty());

    // The in-flight set is untouched by eviction: no status was republished
    assert!(status_rx.try_recv().is_err());

    app.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frames_are_dropped_without_disconnecting() {
    let mut agent = start_fake_agent().await;
    let app = start_app(&agent.endpoint);

    agent.expect_frame("hello").await;
    agent.send("this is not json").await;
    agent.send(r#"{"type":"wormhole","payload":{}}"#).await;

    // The connection survives both bad frames
    agent.send(r#"{"type":"context-request"}"#).await;
    agent.expect_frame("context-snapshot").await;

    app.shutdown().await;
}
