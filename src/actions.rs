// ABOUTME: Authoritative registry of user-invocable actions, partitioned by source.
// ABOUTME: Every mutation republishes the merged list on the event bus.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::bus::EventBus;

/// A user-invocable operation exposed through the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Globally unique across sources.
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Host operation invoked when the action is triggered.
    pub command: String,
    pub args: Vec<String>,
    pub emphasis: bool,
    pub disabled: bool,
    /// Owning source (e.g. "local", "remote").
    pub source: String,
}

/// Registry of actions keyed by id, insertion order preserved.
///
/// An id belongs to exactly one source at a time: registering an existing id
/// under a different source evicts the old entry first, so the merged list
/// never contains duplicates or ghosts.
pub struct ActionRegistry {
    bus: Arc<EventBus>,
    inner: Mutex<Vec<Action>>,
}

impl ActionRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Replace every action owned by `source` with `actions`.
    ///
    /// Actions in the new list are stamped with `source` regardless of what
    /// they carried; ids colliding with entries from other sources evict
    /// those entries.
    pub fn set_actions_for_source(&self, source: &str, actions: Vec<Action>) {
        let merged = {
            let mut list = self.lock();
            list.retain(|a| a.source != source);
            for mut action in actions {
                action.source = source.to_string();
                list.retain(|a| a.id != action.id);
                list.push(action);
            }
            list.clone()
        };
        self.bus.publish_actions(merged);
    }

    /// Add or replace a single action under the source it carries.
    pub fn register_action(&self, action: Action) {
        let merged = {
            let mut list = self.lock();
            list.retain(|a| a.id != action.id);
            list.push(action);
            list.clone()
        };
        self.bus.publish_actions(merged);
    }

    /// Shallow-patch an action in place. Unknown ids are a no-op (nothing is
    /// republished).
    pub fn update_action(&self, id: &str, patch: impl FnOnce(&mut Action)) {
        let merged = {
            let mut list = self.lock();
            match list.iter_mut().find(|a| a.id == id) {
                Some(action) => patch(action),
                None => return,
            }
            list.clone()
        };
        self.bus.publish_actions(merged);
    }

    /// Current actions in insertion order.
    pub fn actions(&self) -> Vec<Action> {
        self.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<Action> {
        self.lock().iter().find(|a| a.id == id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Action>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// Tests
// =============================================================================
