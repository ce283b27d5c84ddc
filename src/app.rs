// ABOUTME: Composition root wiring bus, registry, bridge, and orchestrator together.
// ABOUTME: One explicit instance per process; tests build as many as they need.

use std::sync::Arc;

use crate::actions::ActionRegistry;
use crate::bridge::{self, BridgeHandle};
use crate::bus::EventBus;
use crate::config::Config;
use crate::context::WorkspaceContextProvider;
use crate::editor::FsEditor;
use crate::orchestrator::{self, HostIntegration, OrchestratorHandle};
use crate::terminal::ShellLauncher;

/// Everything a running bridge process consists of.
///
/// Construct once at startup and pass the handles around; nothing in the
/// crate is a global, so independent instances can coexist (tests rely on
/// this).
pub struct App {
    pub bus: Arc<EventBus>,
    pub registry: Arc<ActionRegistry>,
    pub bridge: BridgeHandle,
    pub orchestrator: OrchestratorHandle,
}

impl App {
    /// Start with the default host surfaces: filesystem editor, shell
    /// terminal, workspace-root context.
    pub fn start(config: Config) -> App {
        let host = HostIntegration {
            context: Arc::new(WorkspaceContextProvider::new(
                config.workspace.roots.clone(),
            )),
            editor: Arc::new(FsEditor),
            terminals: Arc::new(ShellLauncher::new(config.terminal.shell.clone())),
            workspace_roots: config.workspace.roots.clone(),
        };
        Self::start_with(config, host)
    }

    /// Start with custom host surfaces (editor integrations, tests).
    pub fn start_with(config: Config, host: HostIntegration) -> App {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(ActionRegistry::new(Arc::clone(&bus)));
        let bridge = bridge::spawn(Arc::clone(&bus), config.bridge.clone());
        let orchestrator = orchestrator::spawn(
            Arc::clone(&bus),
            Arc::clone(&registry),
            bridge.clone(),
            host,
        );

        App {
            bus,
            registry,
            bridge,
            orchestrator,
        }
    }

    /// Stop both tasks and silence the bus. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.orchestrator.shutdown().await;
        self.bridge.shutdown().await;
        self.bus.dispose();
    }
}
