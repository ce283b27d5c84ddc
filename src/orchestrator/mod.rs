// ABOUTME: Turns inbound agent frames into side effects: actions, edits, tasks, status.
// ABOUTME: Single task owning the remote-action map and the in-flight set.

pub mod edits;
pub mod tasks;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};

use crate::actions::{Action, ActionRegistry};
use crate::bridge::BridgeHandle;
use crate::bus::{
    BridgeStateEvent, BridgeTraffic, ConnectionState, EventBus, StatusEvent,
};
use crate::context::ContextProvider;
use crate::editor::WorkspaceEditor;
use crate::metrics;
use crate::protocol::{
    self, ActionInvokedPayload, ActionStatePayload, ApplyEditsPayload, ChatMessagePayload,
    ChatRole, CompletionStatus, Inbound, Outbound, RegisterActionsPayload,
    RemoteActionDescriptor, TaskMode, TaskRequestPayload, TaskStep,
};
use crate::terminal::{TerminalLauncher, TerminalSink};

/// Host operation invoked by actions the agent registered.
pub const RUN_REMOTE_ACTION_COMMAND: &str = "gantry.run-remote-action";

/// Registry source owning all agent-registered actions.
pub const REMOTE_SOURCE: &str = "remote";

const DEFAULT_TERMINAL_NAME: &str = "agent tasks";

/// Host-side surfaces the orchestrator drives. Default implementations work
/// against the filesystem and a shell; editors plug in richer ones.
pub struct HostIntegration {
    pub context: Arc<dyn ContextProvider>,
    pub editor: Arc<dyn WorkspaceEditor>,
    pub terminals: Arc<dyn TerminalLauncher>,
    pub workspace_roots: Vec<PathBuf>,
}

#[derive(Debug)]
enum OrchestratorCommand {
    RunRemoteAction { id: String },
    SendChat { text: String, include_context: bool },
    Shutdown,
}

/// Cloneable handle exposing the two host-invocable operations.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<OrchestratorCommand>,
}

impl OrchestratorHandle {
    /// Invoke a remote action by id. Accepts either the local registry id
    /// or the bare remote id.
    pub async fn run_remote_action(&self, id: impl Into<String>) {
        let _ = self
            .tx
            .send(OrchestratorCommand::RunRemoteAction { id: id.into() })
            .await;
    }

    /// Send a chat message to the agent, optionally with a context snapshot.
    pub async fn send_chat(&self, text: impl Into<String>, include_context: bool) {
        let _ = self
            .tx
            .send(OrchestratorCommand::SendChat {
                text: text.into(),
                include_context,
            })
            .await;
    }

    /// Detach from the bus and stop. Subprocesses already spawned by a task
    /// request are not cancelled.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(OrchestratorCommand::Shutdown).await;
    }
}

/// Spawn the orchestrator task. Bus subscriptions are taken synchronously so
/// no frame published after this call can be missed.
pub fn spawn(
    bus: Arc<EventBus>,
    registry: Arc<ActionRegistry>,
    bridge: BridgeHandle,
    host: HostIntegration,
) -> OrchestratorHandle {
    let (tx, rx) = mpsc::channel(64);
    let traffic_rx = bus.subscribe_traffic();
    let state_rx = bus.subscribe_bridge_state();
    let task = Orchestrator {
        bus,
        registry,
        bridge,
        host,
        remote_actions: HashMap::new(),
        in_flight: HashSet::new(),
        terminal: None,
    };
    tokio::spawn(task.run(rx, traffic_rx, state_rx));
    OrchestratorHandle { tx }
}

struct Orchestrator {
    bus: Arc<EventBus>,
    registry: Arc<ActionRegistry>,
    bridge: BridgeHandle,
    host: HostIntegration,
    /// Agent-advertised descriptors, keyed by remote id.
    remote_actions: HashMap<String, RemoteActionDescriptor>,
    /// Remote ids awaiting a completion frame. No timeout exists; an id
    /// stays here until the agent completes it or the process restarts.
    in_flight: HashSet<String>,
    /// Shared terminal for injection mode, reused while still alive.
    terminal: Option<Box<dyn TerminalSink>>,
}

impl Orchestrator {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<OrchestratorCommand>,
        mut traffic_rx: broadcast::Receiver<BridgeTraffic>,
        mut state_rx: broadcast::Receiver<BridgeStateEvent>,
    ) {
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    None | Some(OrchestratorCommand::Shutdown) => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                traffic = traffic_rx.recv() => match traffic {
                    Ok(BridgeTraffic::Inbound(message)) => self.handle_inbound(message).await,
                    // Frames we sent ourselves need no handling
                    Ok(BridgeTraffic::Outbound(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "orchestrator lagged behind bridge traffic");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                state = state_rx.recv() => match state {
                    Ok(event) => self.handle_bridge_state(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "orchestrator lagged behind bridge state");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("orchestrator stopped");
    }

    async fn handle_command(&mut self, cmd: OrchestratorCommand) {
        match cmd {
            OrchestratorCommand::RunRemoteAction { id } => self.run_remote_action(&id).await,
            OrchestratorCommand::SendChat {
                text,
                include_context,
            } => self.send_chat(&text, include_context).await,
            OrchestratorCommand::Shutdown => {}
        }
    }

    async fn handle_inbound(&mut self, message: Inbound) {
        match message {
            Inbound::RegisterActions(payload) => self.handle_register_actions(payload),
            Inbound::ContextRequest => self.handle_context_request().await,
            Inbound::ActionStateUpdate(payload) => self.handle_action_state_update(payload),
            Inbound::ApplyEdits(payload) => self.handle_apply_edits(payload).await,
            Inbound::TaskRequest(payload) => self.handle_task_request(payload).await,
            Inbound::Log(payload) => {
                self.bus.log(payload.level, payload.message);
            }
            Inbound::ChatResponse(payload) => {
                let prefix = match payload.role {
                    ChatRole::Assistant => "assistant",
                    ChatRole::System => "system",
                };
                self.bus.info(format!("{prefix}: {}", payload.message));
                self.bus.publish_status(StatusEvent::Idle);
            }
            Inbound::ActionComplete(payload) => {
                self.complete_action(&payload.action_id, payload.status, payload.message);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Host-invocable operations
    // -------------------------------------------------------------------------

    async fn run_remote_action(&mut self, id: &str) {
        let remote_id = protocol::remote_action_id(id).to_string();
        let (label, include_context) = match self.remote_actions.get(&remote_id) {
            Some(desc) => (desc.label.clone(), desc.include_context),
            None => {
                tracing::warn!(id = %id, "remote action is not registered");
                self.bus.warn(format!("unknown remote action `{id}`"));
                return;
            }
        };

        let context = include_context.then(|| self.host.context.snapshot());
        let frame = Outbound::ActionInvoked(ActionInvokedPayload {
            action_id: remote_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            context,
        });

        // A failed send was already logged by the bridge
        if !self.bridge.send_silent(frame).await {
            return;
        }

        metrics::record_action_invoked();
        self.bus.info(format!("invoked `{label}`"));
        self.in_flight.insert(remote_id);
        self.publish_processing_or_idle();
    }

    async fn send_chat(&mut self, text: &str, include_context: bool) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let context = include_context.then(|| self.host.context.snapshot());
        let frame = Outbound::ChatMessage(ChatMessagePayload {
            message: text.to_string(),
            context,
        });

        if self.bridge.send_silent(frame).await {
            self.bus.info(format!("user: {text}"));
            self.bus.publish_status(StatusEvent::Processing {
                active: self.in_flight.len(),
            });
        }
    }

    // -------------------------------------------------------------------------
    // Inbound frame handlers
    // -------------------------------------------------------------------------

    fn handle_register_actions(&mut self, payload: RegisterActionsPayload) {
        self.remote_actions.clear();

        let mut mapped = Vec::with_capacity(payload.actions.len());
        for desc in payload.actions {
            mapped.push(Action {
                id: protocol::local_action_id(&desc.id),
                label: desc.label.clone(),
                description: desc.description.clone(),
                command: RUN_REMOTE_ACTION_COMMAND.to_string(),
                args: vec![desc.id.clone()],
                emphasis: desc.emphasis.unwrap_or(false),
                disabled: desc.disabled.unwrap_or(false),
                source: REMOTE_SOURCE.to_string(),
            });
            self.remote_actions.insert(desc.id.clone(), desc);
        }

        let count = mapped.len();
        self.registry.set_actions_for_source(REMOTE_SOURCE, mapped);
        self.bus.info(format!("agent registered {count} action(s)"));
    }

    async fn handle_context_request(&mut self) {
        let snapshot = self.host.context.snapshot();
        self.bus.publish_context(snapshot.clone());
        self.bridge.send(Outbound::ContextSnapshot(snapshot)).await;
    }

    fn handle_action_state_update(&mut self, payload: ActionStatePayload) {
        // Unknown ids are tolerated: the agent may update actions it already
        // withdrew
        let Some(desc) = self.remote_actions.get(&payload.action_id) else {
            tracing::debug!(id = %payload.action_id, "state update for unknown remote action");
            return;
        };

        let label = payload.label.clone().unwrap_or_else(|| desc.label.clone());
        let description = payload
            .description
            .clone()
            .or_else(|| desc.description.clone());
        let emphasis = payload.emphasis.or(desc.emphasis).unwrap_or(false);
        let disabled = payload.disabled.or(desc.disabled).unwrap_or(false);

        let local_id = protocol::local_action_id(&payload.action_id);
        self.registry.update_action(&local_id, |action| {
            action.label = label;
            action.description = description;
            action.emphasis = emphasis;
            action.disabled = disabled;
        });
    }

    async fn handle_apply_edits(&mut self, payload: ApplyEditsPayload) {
        if payload.edits.is_empty() {
            self.bus.warn("apply-edits frame carried no edits");
            return;
        }

        let batch = edits::resolve_batch(&payload.edits, &self.host.workspace_roots, &self.bus);
        let files = batch.len();

        match self.host.editor.apply(batch).await {
            Ok(true) => {
                metrics::record_edits_applied(files);
                let description = payload
                    .description
                    .unwrap_or_else(|| "applied agent edits".to_string());
                self.bus.info(description);
                if let Some(id) = payload.action_id {
                    self.complete_action(&id, CompletionStatus::Success, None);
                }
            }
            Ok(false) => {
                self.complete_or_log_error(payload.action_id, "the edit batch was rejected".into());
            }
            Err(e) => {
                self.complete_or_log_error(
                    payload.action_id,
                    format!("edit application failed: {e}"),
                );
            }
        }
    }

    async fn handle_task_request(&mut self, payload: TaskRequestPayload) {
        let steps = tasks::normalize(&payload);
        if steps.is_empty() {
            self.bus.warn("task-request frame carried no commands");
            return;
        }

        match payload.mode.unwrap_or(TaskMode::Terminal) {
            TaskMode::Terminal => self.run_in_terminal(payload, &steps).await,
            TaskMode::Process => self.run_as_processes(payload, &steps).await,
        }
    }

    /// Fire-and-forget injection: write each line into the shared terminal
    /// and report success as soon as everything is dispatched. No exit-code
    /// feedback exists in this mode.
    async fn run_in_terminal(&mut self, payload: TaskRequestPayload, steps: &[TaskStep]) {
        let name = payload
            .terminal_name
            .clone()
            .unwrap_or_else(|| DEFAULT_TERMINAL_NAME.to_string());

        let reusable = match self.terminal.take() {
            Some(mut existing) => existing.is_alive().then_some(existing),
            None => None,
        };
        let mut terminal = match reusable {
            Some(existing) => existing,
            None => match self.host.terminals.launch(&name) {
                Ok(created) => created,
                Err(e) => {
                    self.complete_or_log_error(
                        payload.action_id,
                        format!("failed to open terminal: {e}"),
                    );
                    return;
                }
            },
        };

        let mut lines = Vec::with_capacity(steps.len() + 1);
        if let Some(cwd) = &payload.cwd {
            lines.push(tasks::cd_command(cwd));
        }
        lines.extend(steps.iter().map(tasks::command_line));

        for line in lines {
            if let Err(e) = terminal.send_line(&line).await {
                // The dead terminal is dropped; the next request opens a new one
                self.complete_or_log_error(
                    payload.action_id,
                    format!("terminal write failed: {e}"),
                );
                return;
            }
            self.bus.info(format!("terminal> {line}"));
            metrics::record_task_step("terminal");
        }
        self.terminal = Some(terminal);

        if let Some(id) = payload.action_id {
            self.complete_action(
                &id,
                CompletionStatus::Success,
                Some(format!(
                    "dispatched {} command(s) to `{name}`",
                    steps.len()
                )),
            );
        }
    }

    /// Streamed execution: run every step to completion in order, aborting
    /// the remainder on the first failure.
    async fn run_as_processes(&mut self, payload: TaskRequestPayload, steps: &[TaskStep]) {
        let cwd = payload.cwd.as_ref().map(PathBuf::from);
        self.bus.info(format!("running {} command(s)", steps.len()));

        match tasks::run_sequence(steps, cwd.as_deref(), &self.bus).await {
            Ok(count) => {
                if let Some(id) = payload.action_id {
                    self.complete_action(
                        &id,
                        CompletionStatus::Success,
                        Some(format!("{count} command(s) completed")),
                    );
                }
            }
            Err(e) => self.complete_or_log_error(payload.action_id, e.to_string()),
        }
    }

    // -------------------------------------------------------------------------
    // Completion and status
    // -------------------------------------------------------------------------

    /// Shared completion path. Removing from the in-flight set is idempotent;
    /// the status is recomputed from what remains.
    fn complete_action(&mut self, id: &str, status: CompletionStatus, message: Option<String>) {
        self.in_flight.remove(protocol::remote_action_id(id));

        match status {
            CompletionStatus::Error => {
                metrics::record_action_completed("error");
                if let Some(message) = &message {
                    self.bus.error(message.clone());
                }
                let message = message.unwrap_or_else(|| format!("action `{id}` failed"));
                self.bus.publish_status(StatusEvent::Error { message });
            }
            CompletionStatus::Success => {
                metrics::record_action_completed("success");
                if let Some(message) = message {
                    self.bus.info(message);
                }
                self.publish_processing_or_idle();
            }
        }
    }

    fn complete_or_log_error(&mut self, action_id: Option<String>, message: String) {
        match action_id {
            Some(id) => self.complete_action(&id, CompletionStatus::Error, Some(message)),
            None => {
                self.bus.error(message);
            }
        }
    }

    fn publish_processing_or_idle(&self) {
        let status = if self.in_flight.is_empty() {
            StatusEvent::Idle
        } else {
            StatusEvent::Processing {
                active: self.in_flight.len(),
            }
        };
        self.bus.publish_status(status);
    }

    /// Remote actions only exist while the connection is up: leaving Ready
    /// wipes the descriptor map and the registry's remote bucket.
    fn handle_bridge_state(&mut self, event: BridgeStateEvent) {
        if !matches!(
            event.state,
            ConnectionState::Disconnected | ConnectionState::Error
        ) {
            return;
        }
        if self.remote_actions.is_empty() {
            return;
        }

        let count = self.remote_actions.len();
        self.remote_actions.clear();
        self.registry.set_actions_for_source(REMOTE_SOURCE, Vec::new());
        self.bus
            .info(format!("connection lost; cleared {count} remote action(s)"));
    }
}
