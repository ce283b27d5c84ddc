// ABOUTME: Workspace context snapshots sent to the agent on request or invocation.
// ABOUTME: Hosts with richer editor state plug in behind the ContextProvider trait.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Structured summary of the current workspace state.
///
/// The host editor fills in whatever it knows; every field beyond the roots
/// is optional so a bare filesystem host still produces a useful snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub workspace_roots: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
    pub captured_at: String,
}

/// Source of context snapshots. Implemented by the host editor integration;
/// the default implementation below knows only the configured roots.
pub trait ContextProvider: Send + Sync {
    fn snapshot(&self) -> ContextSnapshot;
}

/// Provider backed by the configured workspace roots alone.
pub struct WorkspaceContextProvider {
    roots: Vec<PathBuf>,
}

impl WorkspaceContextProvider {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl ContextProvider for WorkspaceContextProvider {
    fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            workspace_roots: self
                .roots
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect(),
            active_file: None,
            selection: None,
            captured_at: Utc::now().to_rfc3339(),
        }
    }
}
