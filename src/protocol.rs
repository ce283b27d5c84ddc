// ABOUTME: Wire protocol for the agent connection: typed frames over JSON text.
// ABOUTME: Two-phase parse keeps bad JSON, unknown types, and bad payloads distinct.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::bus::LogLevel;
use crate::context::ContextSnapshot;

/// Prefix distinguishing agent-owned action ids from host-local ones.
pub const REMOTE_ID_PREFIX: &str = "remote:";

/// Map a remote action id to its local registry id. Deterministic and
/// reversible; ids the agent already prefixed are left alone.
pub fn local_action_id(remote_id: &str) -> String {
    if remote_id.starts_with(REMOTE_ID_PREFIX) {
        remote_id.to_string()
    } else {
        format!("{REMOTE_ID_PREFIX}{remote_id}")
    }
}

/// Inverse of [`local_action_id`]. Accepts either form.
pub fn remote_action_id(local_id: &str) -> &str {
    local_id.strip_prefix(REMOTE_ID_PREFIX).unwrap_or(local_id)
}

/// Why an inbound frame was rejected at the protocol boundary.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("bad `{kind}` payload: {source}")]
    Payload {
        kind: String,
        source: serde_json::Error,
    },
}

/// Raw frame shape shared by both directions: `{type, payload?}`.
#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

// =============================================================================
// Inbound frames (agent → host)
// =============================================================================

/// Action metadata advertised by the agent in a `register-actions` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteActionDescriptor {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emphasis: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    /// When false, invocations omit the workspace context snapshot.
    #[serde(default = "default_true")]
    pub include_context: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterActionsPayload {
    pub actions: Vec<RemoteActionDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStatePayload {
    pub action_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emphasis: Option<bool>,
}

/// Zero-based position within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

/// All replacements targeting a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEdit {
    pub uri: String,
    #[serde(default)]
    pub edits: Vec<TextEdit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEditsPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub edits: Vec<FileEdit>,
    #[serde(default)]
    pub preview: bool,
}

/// One shell command in a task sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStep {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// How a task sequence is executed. Terminal injection is best-effort with
/// no completion signal; process mode reports success or failure per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    Terminal,
    Process,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequestPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    /// Legacy single-command form; ignored when `sequence` is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Vec<TaskStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TaskMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPayload {
    pub message: String,
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    #[default]
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponsePayload {
    pub message: String,
    #[serde(default)]
    pub role: ChatRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    #[default]
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCompletePayload {
    pub action_id: String,
    #[serde(default)]
    pub status: CompletionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Every frame the agent may send. Validated once, here; handlers downstream
/// receive typed payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Inbound {
    RegisterActions(RegisterActionsPayload),
    ContextRequest,
    ActionStateUpdate(ActionStatePayload),
    ApplyEdits(ApplyEditsPayload),
    TaskRequest(TaskRequestPayload),
    Log(LogPayload),
    ChatResponse(ChatResponsePayload),
    ActionComplete(ActionCompletePayload),
}

impl Inbound {
    /// Parse one text frame. The error variant tells the caller whether the
    /// frame was not JSON at all, carried an unknown type, or carried a
    /// payload that does not match its type.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let Frame { kind, payload } = serde_json::from_str(text)?;
        match kind.as_str() {
            "register-actions" => Ok(Inbound::RegisterActions(decode(&kind, payload)?)),
            "context-request" => Ok(Inbound::ContextRequest),
            "action-state-update" => Ok(Inbound::ActionStateUpdate(decode(&kind, payload)?)),
            "apply-edits" => Ok(Inbound::ApplyEdits(decode(&kind, payload)?)),
            "task-request" => Ok(Inbound::TaskRequest(decode(&kind, payload)?)),
            "log" => Ok(Inbound::Log(decode(&kind, payload)?)),
            "chat-response" => Ok(Inbound::ChatResponse(decode(&kind, payload)?)),
            "action-complete" => Ok(Inbound::ActionComplete(decode(&kind, payload)?)),
            _ => Err(ProtocolError::UnknownType(kind)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Inbound::RegisterActions(_) => "register-actions",
            Inbound::ContextRequest => "context-request",
            Inbound::ActionStateUpdate(_) => "action-state-update",
            Inbound::ApplyEdits(_) => "apply-edits",
            Inbound::TaskRequest(_) => "task-request",
            Inbound::Log(_) => "log",
            Inbound::ChatResponse(_) => "chat-response",
            Inbound::ActionComplete(_) => "action-complete",
        }
    }
}

fn decode<T: DeserializeOwned>(kind: &str, payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::Payload {
        kind: kind.to_string(),
        source,
    })
}

// =============================================================================
// Outbound frames (host → agent)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub client: String,
    pub version: String,
    pub instance_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionInvokedPayload {
    pub action_id: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextSnapshot>,
}

/// Every frame the host may send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Outbound {
    Hello(HelloPayload),
    ActionInvoked(ActionInvokedPayload),
    ChatMessage(ChatMessagePayload),
    ContextSnapshot(ContextSnapshot),
}

impl Outbound {
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Hello(_) => "hello",
            Outbound::ActionInvoked(_) => "action-invoked",
            Outbound::ChatMessage(_) => "chat-message",
            Outbound::ContextSnapshot(_) => "context-snapshot",
        }
    }

    /// One-line human summary for the log feed.
    pub fn summary(&self) -> String {
        match self {
            Outbound::Hello(p) => format!("hello from {} {}", p.client, p.version),
            Outbound::ActionInvoked(p) => format!("invoked action `{}`", p.action_id),
            Outbound::ChatMessage(p) => {
                let preview: String = p.message.chars().take(80).collect();
                format!("chat: {preview}")
            }
            Outbound::ContextSnapshot(_) => "sent context snapshot".to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
