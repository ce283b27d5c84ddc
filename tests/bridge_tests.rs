// ABOUTME: Tests for bridge state transitions and send behavior without a live agent.
// ABOUTME: Connection round-trips against a real socket live in app_tests.

use std::time::Duration;

use gantry::bus::{ConnectionState, EventBus, LogLevel};
use gantry::config::BridgeConfig;
use gantry::protocol::{ChatMessagePayload, Outbound};
use gantry::{bridge, BridgeStateEvent};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::timeout;

async fn recv<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

fn chat_frame() -> Outbound {
    Outbound::ChatMessage(ChatMessagePayload {
        message: "hello".to_string(),
        context: None,
    })
}

#[tokio::test]
async fn test_disabled_bridge_reports_disconnected_with_reason() {
    let bus = Arc::new(EventBus::new());
    let mut states = bus.subscribe_bridge_state();

    let _handle = bridge::spawn(
        Arc::clone(&bus),
        BridgeConfig {
            enabled: false,
            endpoint: Some("ws://127.0.0.1:1".to_string()),
            auth_token: None,
        },
    );

    let event: BridgeStateEvent = recv(&mut states).await;
    assert_eq!(event.state, ConnectionState::Disconnected);
    assert!(event.message.unwrap().contains("disabled"));
}

#[tokio::test]
async fn test_enabled_without_endpoint_reports_error() {
    let bus = Arc::new(EventBus::new());
    let mut states = bus.subscribe_bridge_state();

    let _handle = bridge::spawn(
        Arc::clone(&bus),
        BridgeConfig {
            enabled: true,
            endpoint: None,
            auth_token: None,
        },
    );

    let event = recv(&mut states).await;
    assert_eq!(event.state, ConnectionState::Error);
    assert!(event.message.unwrap().contains("endpoint"));
}

#[tokio::test]
async fn test_blank_endpoint_counts_as_missing() {
    let bus = Arc::new(EventBus::new());
    let mut states = bus.subscribe_bridge_state();

    let _handle = bridge::spawn(
        Arc::clone(&bus),
        BridgeConfig {
            enabled: true,
            endpoint: Some("   ".to_string()),
            auth_token: None,
        },
    );

    let event = recv(&mut states).await;
    assert_eq!(event.state, ConnectionState::Error);
}

#[tokio::test]
async fn test_send_while_disconnected_returns_false() {
    let bus = Arc::new(EventBus::new());
    let mut traffic = bus.subscribe_traffic();
    let mut logs = bus.subscribe_logs();

    let handle = bridge::spawn(
        Arc::clone(&bus),
        BridgeConfig {
            enabled: false,
            endpoint: None,
            auth_token: None,
        },
    );

    assert!(!handle.send(chat_frame()).await);

    // No outbound traffic event was published
    assert!(traffic.try_recv().is_err());

    // A warning explains the drop
    let warning = loop {
        let entry = recv(&mut logs).await;
        if entry.level == LogLevel::Warning {
            break entry;
        }
    };
    assert!(warning.message.contains("not connected"));
}

#[tokio::test]
async fn test_identical_state_is_not_republished() {
    let bus = Arc::new(EventBus::new());
    let mut states = bus.subscribe_bridge_state();

    let handle = bridge::spawn(
        Arc::clone(&bus),
        BridgeConfig {
            enabled: false,
            endpoint: None,
            auth_token: None,
        },
    );

    let first = recv(&mut states).await;
    assert_eq!(first.state, ConnectionState::Disconnected);

    // Restarting lands on the identical (state, message) pair; the send
    // round-trip afterwards guarantees the restart was processed.
    handle.restart().await;
    let _ = handle.send(chat_frame()).await;

    assert!(states.try_recv().is_err());
}

#[tokio::test]
async fn test_apply_config_triggers_restart() {
    let bus = Arc::new(EventBus::new());
    let mut states = bus.subscribe_bridge_state();

    let handle = bridge::spawn(
        Arc::clone(&bus),
        BridgeConfig {
            enabled: false,
            endpoint: None,
            auth_token: None,
        },
    );

    let first = recv(&mut states).await;
    assert_eq!(first.state, ConnectionState::Disconnected);

    // Enabling without an endpoint is a different failure state
    handle
        .apply_config(BridgeConfig {
            enabled: true,
            endpoint: None,
            auth_token: None,
        })
        .await;

    let second = recv(&mut states).await;
    assert_eq!(second.state, ConnectionState::Error);
}
