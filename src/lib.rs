// ABOUTME: Root library module exposing all public modules
// ABOUTME: Bridge between a host application and an external tool-calling agent

pub mod actions;
pub mod app;
pub mod bridge;
pub mod bus;
pub mod config;
pub mod context;
pub mod editor;
pub mod metrics;
pub mod orchestrator;
pub mod paths;
pub mod protocol;
pub mod terminal;

// Re-export the types most hosts need
pub use actions::{Action, ActionRegistry};
pub use app::App;
pub use bridge::BridgeHandle;
pub use bus::{BridgeStateEvent, BridgeTraffic, ConnectionState, EventBus, LogEntry, LogLevel, StatusEvent};
pub use config::{BridgeConfig, Config};
pub use context::{ContextProvider, ContextSnapshot};
pub use orchestrator::OrchestratorHandle;
pub use protocol::{Inbound, Outbound};
